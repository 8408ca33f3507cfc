//! Frame execution module
//!
//! Frame pacing over a fixed number of frame slots, deferred release of
//! retired GPU objects, and the command queue drained between frames.

mod command_queue;
mod deferred_deletion;
mod frame_loop;

pub use command_queue::{command_queue, CommandReceiver, CommandSender, Face, ObjectId, ObjectKind, RenderCommand};
pub use deferred_deletion::DeferredDeletionQueue;
pub use frame_loop::{FrameCollaborator, FrameContext, FrameLoop, FrameOutcome};
