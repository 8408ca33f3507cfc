/// Render command queue: requests from a producer thread applied between frames

use std::path::PathBuf;
use glam::{Mat4, Vec3};
use crate::error::{Error, Result};

/// One triangle, counter-clockwise
pub type Face = [Vec3; 3];

/// Identifier of a scene object, assigned by the collaborator that owns the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Camera,
    StaticModel,
}

/// Request handed to the frame collaborator after a frame is presented
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Load a model file and register it under `name`
    LoadModel { name: String, source: PathBuf },
    /// Append raw triangles to the scene geometry
    AddGeometry { faces: Vec<Face> },
    /// Instantiate an object of `kind` from the model or preset called `name`
    AddObject { kind: ObjectKind, name: String },
    SetActiveCamera(ObjectId),
    /// New world transforms, by object index
    UpdateObjectTransforms(Vec<(u32, Mat4)>),
}

/// Create a single-producer / single-consumer command queue
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (sender, receiver) = flume::unbounded();
    (CommandSender(sender), CommandReceiver(receiver))
}

/// Producer side
pub struct CommandSender(flume::Sender<RenderCommand>);

impl CommandSender {
    /// Queue a command
    ///
    /// # Errors
    ///
    /// `BackendError` once the receiving frame loop is gone.
    pub fn send(&self, command: RenderCommand) -> Result<()> {
        self.0.send(command).map_err(|flume::SendError(command)| {
            crate::engine_warn!("rendergraph::FrameLoop", "Command dropped, frame loop has stopped: {:?}", command);
            Error::BackendError("frame loop has stopped".to_string())
        })
    }

    pub fn is_disconnected(&self) -> bool {
        self.0.is_disconnected()
    }
}

/// Consumer side, owned by the frame loop
pub struct CommandReceiver(flume::Receiver<RenderCommand>);

impl CommandReceiver {
    /// Next queued command, without blocking
    pub fn try_recv(&self) -> Option<RenderCommand> {
        self.0.try_recv().ok()
    }

    /// Every command queued so far, in send order
    pub fn drain(&self) -> Vec<RenderCommand> {
        self.0.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[path = "command_queue_tests.rs"]
mod tests;
