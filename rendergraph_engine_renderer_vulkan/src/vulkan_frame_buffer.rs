/// Framebuffer - Vulkan implementation of the Framebuffer trait
///
/// Created once per node (or per node and swapchain image) when the graph
/// resources are materialized, reused every frame.

use rendergraph_engine::rendergraph::render::{Framebuffer as RendererFramebuffer, Texture, TextureFormat};
use ash::vk;
use std::sync::Arc;

pub struct Framebuffer {
    pub(crate) framebuffer: vk::Framebuffer,
    width: u32,
    height: u32,
    formats: Vec<TextureFormat>,
    /// Views referenced by the framebuffer must outlive it
    _attachments: Vec<Arc<dyn Texture>>,
    device: ash::Device,
}

impl Framebuffer {
    pub(crate) fn new(
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        attachments: Vec<Arc<dyn Texture>>,
        device: ash::Device,
    ) -> Self {
        let formats = attachments.iter().map(|texture| texture.info().format).collect();
        Self { framebuffer, width, height, formats, _attachments: attachments, device }
    }
}

impl RendererFramebuffer for Framebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn formats(&self) -> &[TextureFormat] {
        &self.formats
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
