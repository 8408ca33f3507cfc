/// Texture - Vulkan implementation of the Texture trait
///
/// Attachment images own their memory; swapchain images only own their view.

use rendergraph_engine::rendergraph::render::{Texture as RendererTexture, TextureInfo};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

pub struct Texture {
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    /// `None` for swapchain images (owned by the swapchain)
    pub(crate) allocation: Option<Allocation>,
    ctx: Arc<GpuContext>,
    info: TextureInfo,
}

impl Texture {
    /// Image created and bound by the renderer
    pub(crate) fn owned(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        view: vk::ImageView,
        allocation: Allocation,
        info: TextureInfo,
    ) -> Self {
        Self { image, view, allocation: Some(allocation), ctx, info }
    }

    /// Swapchain image: only the view is destroyed on drop
    pub(crate) fn borrowed(ctx: Arc<GpuContext>, image: vk::Image, view: vk::ImageView, info: TextureInfo) -> Self {
        Self { image, view, allocation: None, ctx, info }
    }
}

impl RendererTexture for Texture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_image_view(self.view, None);

            if let Some(allocation) = self.allocation.take() {
                self.ctx.free_allocation(allocation);
                self.ctx.device.destroy_image(self.image, None);
            }
        }
    }
}
