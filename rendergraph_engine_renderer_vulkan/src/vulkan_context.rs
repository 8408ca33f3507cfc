/// GpuContext - device, allocator and queue shared by every Vulkan object
///
/// Shared through `Arc` by textures, buffers and the sampler cache so each
/// resource can free itself on drop.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

/// Shared GPU context
///
/// Device and instance destruction is done by `VulkanRenderer::drop`, after the
/// allocator has been released.
pub struct GpuContext {
    pub device: ash::Device,

    /// Wrapped in ManuallyDrop so it is released BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    pub graphics_queue: vk::Queue,

    pub graphics_queue_family: u32,

    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    pub fn new(
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            graphics_queue_family,
            debug_utils_loader,
            debug_messenger,
        }
    }

    /// Free `allocation`, tolerating a poisoned allocator lock
    pub(crate) fn free_allocation(&self, allocation: gpu_allocator::vulkan::Allocation) {
        if let Ok(mut allocator) = self.allocator.lock() {
            allocator.free(allocation).ok();
        }
    }
}
