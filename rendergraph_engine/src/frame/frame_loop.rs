/// Frame loop: frame pacing, graph replay, presentation and swapchain rebuilds
///
/// One `draw_frame` call waits on the next frame slot's fence, releases what
/// that slot retired, acquires an image, asks the collaborator for the frame's
/// render models, records them through the `RenderGraphHandler`, submits,
/// presents and finally applies queued `RenderCommand`s.
///
/// An out-of-date swapchain (at acquire or present) triggers a rebuild: wait
/// idle, recreate the swapchain, rematerialize the graph resources and notify
/// the collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::error::Result;
use crate::render_graph::{FrameStats, RenderGraph, RenderGraphHandler, RenderModel, SwapchainFramebuffer};
use crate::renderer::{
    AcquireOutcome, Buffer, CommandList, Config, DescriptorAllocator, DescriptorSetHolder, Extent2D,
    Extents, PresentOutcome, Renderer, Swapchain,
};
use super::command_queue::{CommandReceiver, RenderCommand};
use super::deferred_deletion::DeferredDeletionQueue;

const SOURCE: &str = "rendergraph::FrameLoop";

/// Scene/UI side of the frame loop
pub trait FrameCollaborator {
    /// Models to draw this frame
    fn render_models(&mut self, frame: &mut FrameContext) -> Result<Vec<RenderModel>>;

    /// Sets shared by every node (camera, lights)
    fn scene_descriptor_sets(&self) -> &DescriptorSetHolder;

    /// Apply one queued command, after the frame that dequeued it was presented
    fn apply_command(&mut self, command: RenderCommand, frame: &mut FrameContext) -> Result<()>;

    /// The swapchain and every graph resource were recreated; rebuild pipelines sized on them
    fn on_swapchain_rebuilt(&mut self, renderer: &dyn Renderer, graph: &RenderGraph, extents: &Extents) -> Result<()>;
}

/// Per-frame state handed to the collaborator
pub struct FrameContext {
    /// Frame slot being recorded
    pub frame_index: usize,
    pub image_index: u32,
    /// Frames presented so far
    pub frame_number: u64,
    pub extents: Extents,
    retired_buffers: Vec<Arc<dyn Buffer>>,
}

impl FrameContext {
    /// Keep `buffer` alive until this frame slot is reused
    pub fn retire_buffer(&mut self, buffer: Arc<dyn Buffer>) {
        self.retired_buffers.push(buffer);
    }
}

/// Result of one `draw_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(FrameStats),
    /// Nothing was presented; resources follow the new swapchain
    SwapchainRebuilt,
    /// Window has no area; nothing was recorded
    Skipped,
    Closed,
}

/// Frame loop over a built render graph
pub struct FrameLoop {
    renderer: Arc<dyn Renderer>,
    descriptor_allocator: Arc<dyn DescriptorAllocator>,
    graph: RenderGraph,
    swapchain: Box<dyn Swapchain>,
    handler: RenderGraphHandler,
    swapchain_framebuffers: Vec<SwapchainFramebuffer>,
    command_lists: Vec<Box<dyn CommandList>>,
    extents: Extents,
    window_extent: Extent2D,
    rebuild_pending: bool,
    frame_index: usize,
    frame_number: u64,
    retired_buffers: DeferredDeletionQueue<Arc<dyn Buffer>>,
    commands: Option<CommandReceiver>,
    close_requested: Arc<AtomicBool>,
}

impl FrameLoop {
    /// Materialize `graph` against `swapchain` and allocate one command list per frame slot
    pub fn new(
        renderer: Arc<dyn Renderer>,
        descriptor_allocator: Arc<dyn DescriptorAllocator>,
        graph: RenderGraph,
        swapchain: Box<dyn Swapchain>,
        config: &Config,
    ) -> Result<Self> {
        let frames_in_flight = renderer.frames_in_flight().max(1);
        let extents = Extents::new(swapchain.extent(), config);
        let handler = RenderGraphHandler::new(renderer.as_ref(), &graph, &extents, descriptor_allocator.as_ref())?;
        let swapchain_framebuffers = handler.create_swapchain_framebuffers(renderer.as_ref(), &graph, swapchain.images())?;
        let command_lists = (0..frames_in_flight)
            .map(|_| renderer.create_command_list())
            .collect::<Result<Vec<_>>>()?;

        crate::engine_info!(
            SOURCE,
            "Frame loop ready: {} frames in flight, {} swapchain images, {}x{}",
            frames_in_flight,
            swapchain.images().len(),
            extents.presentation.width,
            extents.presentation.height
        );

        Ok(Self {
            window_extent: swapchain.extent(),
            renderer,
            descriptor_allocator,
            graph,
            swapchain,
            handler,
            swapchain_framebuffers,
            command_lists,
            extents,
            rebuild_pending: false,
            frame_index: 0,
            frame_number: 0,
            retired_buffers: DeferredDeletionQueue::new(frames_in_flight),
            commands: None,
            close_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Drain `receiver` after every presented frame
    pub fn with_command_queue(mut self, receiver: CommandReceiver) -> Self {
        self.commands = Some(receiver);
        self
    }

    /// Record, submit and present one frame
    pub fn draw_frame(&mut self, collaborator: &mut dyn FrameCollaborator) -> Result<FrameOutcome> {
        if self.is_close_requested() {
            return Ok(FrameOutcome::Closed);
        }
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }
        if self.rebuild_pending {
            self.rebuild(collaborator)?;
            return Ok(FrameOutcome::SwapchainRebuilt);
        }

        let slot = self.frame_index;
        self.renderer.wait_for_frame(slot)?;
        let released = self.retired_buffers.release_frame(slot);
        if released > 0 {
            crate::engine_trace!(SOURCE, "Released {} buffers retired by frame slot {}", released, slot);
        }

        let image_index = match self.swapchain.acquire_next_image(slot)? {
            AcquireOutcome::Image(index) => index,
            AcquireOutcome::OutOfDate => {
                crate::engine_debug!(SOURCE, "Swapchain out of date at acquire");
                self.rebuild(collaborator)?;
                return Ok(FrameOutcome::SwapchainRebuilt);
            }
        };

        let mut frame = FrameContext {
            frame_index: slot,
            image_index,
            frame_number: self.frame_number,
            extents: self.extents,
            retired_buffers: Vec::new(),
        };
        let models = collaborator.render_models(&mut frame)?;

        let target = self.swapchain_framebuffers.get(image_index as usize).ok_or_else(|| {
            crate::engine_err!(SOURCE, "Swapchain returned image {} of {}", image_index, self.swapchain_framebuffers.len())
        })?;
        let commands = self.command_lists[slot].as_mut();
        let stats = self.handler.fill_command_buffer(
            commands,
            &self.graph,
            target,
            collaborator.scene_descriptor_sets(),
            &models,
        )?;
        self.renderer.submit(commands, slot, self.swapchain.as_ref(), image_index)?;

        // The submitted frame may read what was retired while recording it
        self.frame_index = (slot + 1) % self.command_lists.len();
        self.frame_number += 1;
        self.retire_frame_buffers(slot, &mut frame)?;

        let presented = self.swapchain.present(slot, image_index)?;

        // Buffers retired by a command applied before a failing one still wait for this slot
        let applied = self.apply_queued_commands(collaborator, &mut frame);
        self.retire_frame_buffers(slot, &mut frame)?;
        applied?;

        match presented {
            PresentOutcome::Presented => Ok(FrameOutcome::Presented(stats)),
            PresentOutcome::OutOfDate => {
                crate::engine_debug!(SOURCE, "Swapchain out of date at present");
                self.rebuild(collaborator)?;
                Ok(FrameOutcome::SwapchainRebuilt)
            }
        }
    }

    fn apply_queued_commands(&self, collaborator: &mut dyn FrameCollaborator, frame: &mut FrameContext) -> Result<()> {
        if let Some(receiver) = &self.commands {
            for command in receiver.drain() {
                collaborator.apply_command(command, frame)?;
            }
        }
        Ok(())
    }

    fn retire_frame_buffers(&mut self, slot: usize, frame: &mut FrameContext) -> Result<()> {
        for buffer in frame.retired_buffers.drain(..) {
            self.retired_buffers.push(slot, buffer)?;
        }
        Ok(())
    }

    /// New window size; the swapchain is rebuilt on the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        let extent = Extent2D { width, height };
        if extent != self.window_extent {
            self.window_extent = extent;
            self.rebuild_pending = true;
        }
    }

    fn rebuild(&mut self, collaborator: &mut dyn FrameCollaborator) -> Result<()> {
        self.renderer.wait_idle()?;
        self.retired_buffers.release_all();
        self.swapchain_framebuffers.clear();
        let released_sets = self.handler.release();
        crate::engine_debug!(SOURCE, "Released {} graph descriptor sets before rebuild", released_sets);

        self.swapchain.recreate(self.window_extent.width, self.window_extent.height)?;
        self.extents = self.extents.with_presentation(self.swapchain.extent());
        self.handler = RenderGraphHandler::new(
            self.renderer.as_ref(),
            &self.graph,
            &self.extents,
            self.descriptor_allocator.as_ref(),
        )?;
        self.swapchain_framebuffers =
            self.handler.create_swapchain_framebuffers(self.renderer.as_ref(), &self.graph, self.swapchain.images())?;
        self.rebuild_pending = false;

        collaborator.on_swapchain_rebuilt(self.renderer.as_ref(), &self.graph, &self.extents)?;
        crate::engine_info!(
            SOURCE,
            "Swapchain rebuilt at {}x{}",
            self.extents.presentation.width,
            self.extents.presentation.height
        );
        Ok(())
    }

    /// Stop at the next `draw_frame` call
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    /// Flag shared with other threads; setting it has the effect of `request_close`
    pub fn close_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.close_requested)
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    /// Wait for the GPU and release everything retired
    pub fn shutdown(&mut self) -> Result<()> {
        self.renderer.wait_idle()?;
        let released = self.retired_buffers.release_all();
        crate::engine_info!(SOURCE, "Frame loop stopped after {} frames ({} buffers released)", self.frame_number, released);
        Ok(())
    }

    // ===== ACCESSORS =====

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn handler(&self) -> &RenderGraphHandler {
        &self.handler
    }

    pub fn extents(&self) -> Extents {
        self.extents
    }

    /// Slot the next frame records into
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn pending_releases(&self) -> usize {
        self.retired_buffers.len()
    }
}

#[cfg(test)]
#[path = "frame_loop_tests.rs"]
mod tests;
