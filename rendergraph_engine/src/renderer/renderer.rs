/// Renderer trait - device/queue context used by the graph and the frame loop

use std::sync::Arc;
use winit::window::Window;
use crate::error::Result;
use crate::renderer::{
    Buffer, BufferDesc, CommandList, DescriptorSet, DescriptorSetLayoutDesc, DeviceInfo,
    Framebuffer, FramebufferDesc, GraphicsPipelineDesc, Pipeline, RenderPass, RenderPassDesc,
    SampledImageWrite, Shader, ShaderDesc, Swapchain, Texture, TextureDesc,
};

/// Renderer trait
///
/// Factory for every GPU object the graph needs, plus per-frame fence pacing and
/// submission. Implemented by backend renderers (e.g. `VulkanRenderer`).
/// All methods take `&self`; backends keep mutable pools behind locks.
pub trait Renderer: Send + Sync {
    fn device_info(&self) -> &DeviceInfo;

    /// Number of frame slots (fences, command lists) the renderer was built with
    fn frames_in_flight(&self) -> usize;

    /// Register the layout used for every set of `desc.set_type`
    ///
    /// Must happen before shaders referencing the type are created.
    fn register_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<()>;

    /// Create an attachment image and its view
    fn create_attachment_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>>;

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Arc<dyn Framebuffer>>;

    /// Write combined image+samplers into `set` (nearest filtering, repeat addressing)
    fn write_sampled_images(&self, set: &Arc<dyn DescriptorSet>, writes: &[SampledImageWrite]) -> Result<()>;

    /// Create a shader module and reflect its interface
    fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<dyn Shader>>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn Pipeline>>;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>>;

    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    fn create_swapchain(&self, window: &Window) -> Result<Box<dyn Swapchain>>;

    /// Block until the last submission of frame slot `frame_index` has completed
    fn wait_for_frame(&self, frame_index: usize) -> Result<()>;

    /// Submit `commands` for frame slot `frame_index`
    ///
    /// Resets the slot's fence, waits on the swapchain's acquire semaphore for
    /// the slot and signals its render-finished semaphore.
    fn submit(
        &self,
        commands: &dyn CommandList,
        frame_index: usize,
        swapchain: &dyn Swapchain,
        image_index: u32,
    ) -> Result<()>;

    /// Wait for all GPU operations to complete
    fn wait_idle(&self) -> Result<()>;
}
