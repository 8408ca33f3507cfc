/// CommandList trait - records one frame's rendering commands

use std::sync::Arc;
use bitflags::bitflags;
use crate::error::Result;
use crate::renderer::{
    Buffer, DescriptorSet, Framebuffer, ImageLayout, IndexType, Pipeline, RenderPass, Texture,
};

/// Command list recorded by `RenderGraphHandler::fill_command_buffer` and submitted
/// through `Renderer::submit`
pub trait CommandList: Send + Sync {
    /// Begin recording (simultaneous-use: the buffer may be pending on another frame)
    fn begin(&mut self) -> Result<()>;

    fn end(&mut self) -> Result<()>;

    /// Begin a render pass
    ///
    /// # Arguments
    ///
    /// * `render_pass` - the node's render pass
    /// * `framebuffer` - framebuffer built for that pass
    /// * `clear_values` - one per framebuffer attachment
    fn begin_render_pass(
        &mut self,
        render_pass: &Arc<dyn RenderPass>,
        framebuffer: &Arc<dyn Framebuffer>,
        clear_values: &[ClearValue],
    ) -> Result<()>;

    fn end_render_pass(&mut self) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Bind `sets` at consecutive indices starting at `first_set`
    fn bind_descriptor_sets(
        &mut self,
        pipeline: &Arc<dyn Pipeline>,
        first_set: u32,
        sets: &[&Arc<dyn DescriptorSet>],
    ) -> Result<()>;

    /// Bind `buffers` at consecutive bindings starting at `first_binding`
    fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[Arc<dyn Buffer>],
        offsets: &[u64],
    ) -> Result<()>;

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()>;

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32) -> Result<()>;

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()>;

    /// Record one pipeline barrier carrying every image barrier in `barriers`
    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) -> Result<()>;
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Clear value for an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const COLOR_ATTACHMENT_OUTPUT = 1 << 0;
        const EARLY_FRAGMENT_TESTS = 1 << 1;
        const LATE_FRAGMENT_TESTS = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const COLOR_ATTACHMENT_WRITE = 1 << 0;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 1;
        const SHADER_READ = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    Color,
    Depth,
}

/// Layout transition / memory dependency on one image (mip 0, layer 0)
#[derive(Clone)]
pub struct ImageBarrier {
    pub texture: Arc<dyn Texture>,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub aspect: ImageAspect,
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
    /// Framebuffer-local dependency
    pub by_region: bool,
}

impl std::fmt::Debug for ImageBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBarrier")
            .field("format", &self.texture.info().format)
            .field("old_layout", &self.old_layout)
            .field("new_layout", &self.new_layout)
            .field("aspect", &self.aspect)
            .finish()
    }
}
