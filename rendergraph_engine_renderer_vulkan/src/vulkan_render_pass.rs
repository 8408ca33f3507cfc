/// RenderPass - Vulkan implementation of the RenderPass trait

use rendergraph_engine::rendergraph::render::RenderPass as RendererRenderPass;
use ash::vk;

/// Single-subpass render pass built for one graph node
pub struct RenderPass {
    pub(crate) render_pass: vk::RenderPass,
    /// Number of color attachments; the depth attachment, if any, follows them
    pub(crate) color_attachment_count: u32,
    pub(crate) device: ash::Device,
}

impl RendererRenderPass for RenderPass {}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
