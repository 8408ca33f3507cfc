/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// Owns the surface, the swapchain images (exposed as textures so the graph can
/// build framebuffers on them) and the acquire/present semaphores.

use rendergraph_engine::rendergraph::{Result, Error};
use rendergraph_engine::rendergraph::render::{
    AcquireOutcome, Extent2D, PresentOutcome, Swapchain as RendererSwapchain,
    Texture as RendererTexture, TextureFormat, TextureInfo, TextureUsage,
};
use rendergraph_engine::{engine_debug, engine_err, engine_error, engine_info};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{texture_format_to_vk, vk_to_texture_format};
use crate::vulkan_texture::Texture;

/// Surface formats accepted for presentation, in order of preference
const PREFERRED_FORMATS: [TextureFormat; 4] = [
    TextureFormat::B8G8R8A8_SRGB,
    TextureFormat::R8G8B8A8_SRGB,
    TextureFormat::B8G8R8A8_UNORM,
    TextureFormat::R8G8B8A8_UNORM,
];

/// Pick the presentation format among `surface_formats`
///
/// Preferred formats first, then any surface format the engine can name.
pub(crate) fn choose_surface_format(surface_formats: &[vk::SurfaceFormatKHR]) -> Option<(TextureFormat, vk::ColorSpaceKHR)> {
    PREFERRED_FORMATS
        .iter()
        .find_map(|&format| {
            surface_formats
                .iter()
                .find(|sf| sf.format == texture_format_to_vk(format))
                .map(|sf| (format, sf.color_space))
        })
        .or_else(|| {
            surface_formats
                .iter()
                .find_map(|sf| vk_to_texture_format(sf.format).map(|format| (format, sf.color_space)))
        })
}

pub struct Swapchain {
    ctx: Arc<GpuContext>,
    physical_device: vk::PhysicalDevice,
    present_queue: vk::Queue,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    images: Vec<Arc<dyn RendererTexture>>,
    format: TextureFormat,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,

    /// One per frame slot, signaled by acquire
    image_available_semaphores: Vec<vk::Semaphore>,
    /// One per swapchain image, signaled by submit and waited by present
    render_finished_semaphores: Vec<vk::Semaphore>,
}

impl Swapchain {
    /// Create a swapchain on `surface`
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `physical_device` - Device the surface support was queried on
    /// * `instance` - Instance used to load the swapchain functions
    /// * `surface` / `surface_loader` - Window surface, destroyed with the swapchain
    /// * `present_queue` - Queue for presenting
    /// * `frames_in_flight` - Number of acquire semaphores
    /// * `window_extent` - Used when the surface does not dictate its size
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<GpuContext>,
        physical_device: vk::PhysicalDevice,
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        present_queue: vk::Queue,
        frames_in_flight: usize,
        window_extent: Extent2D,
    ) -> Result<Self> {
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| {
                    engine_error!("rendergraph::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?
        };

        let (format, color_space) = choose_surface_format(&surface_formats).ok_or_else(|| {
            engine_error!("rendergraph::vulkan", "No supported surface format among {:?}", surface_formats);
            Error::InitializationFailed("No supported surface format".to_string())
        })?;

        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &ctx.device);

        let mut image_available_semaphores = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            image_available_semaphores.push(create_semaphore(&ctx.device)?);
        }

        let mut swapchain = Self {
            ctx,
            physical_device,
            present_queue,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            format,
            color_space,
            extent: vk::Extent2D::default(),
            image_available_semaphores,
            render_finished_semaphores: Vec::new(),
        };
        swapchain.build(window_extent)?;

        engine_info!("rendergraph::vulkan", "Swapchain created: {} images, {:?}, {}x{}",
            swapchain.images.len(), format, swapchain.extent.width, swapchain.extent.height);

        Ok(swapchain)
    }

    /// (wait, signal) semaphores for submitting frame slot `frame_index` rendering into `image_index`
    pub(crate) fn sync_info(&self, frame_index: usize, image_index: u32) -> Result<(vk::Semaphore, vk::Semaphore)> {
        let wait = self.image_available_semaphores.get(frame_index).copied().ok_or_else(|| {
            engine_err!("rendergraph::vulkan", "Frame slot {} out of range ({} slots)",
                frame_index, self.image_available_semaphores.len())
        })?;
        let signal = self.render_finished_semaphores.get(image_index as usize).copied().ok_or_else(|| {
            engine_err!("rendergraph::vulkan", "Swapchain image {} out of range ({} images)",
                image_index, self.render_finished_semaphores.len())
        })?;
        Ok((wait, signal))
    }

    /// Create the swapchain (retiring the current one), its image views and
    /// one render-finished semaphore per image
    fn build(&mut self, window_extent: Extent2D) -> Result<()> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| {
                    engine_error!("rendergraph::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?
        };

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: window_extent.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let vk_format = texture_format_to_vk(self.format);
        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(vk_format)
            .image_color_space(self.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // Views of the old images go first
        self.images.clear();

        unsafe {
            let swapchain = self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| {
                    engine_error!("rendergraph::vulkan", "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;

            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            let vk_images = self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| {
                    engine_error!("rendergraph::vulkan", "Failed to get swapchain images: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
                })?;

            for image in vk_images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(vk_format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                let view = self.ctx.device.create_image_view(&view_info, None)
                    .map_err(|e| {
                        engine_error!("rendergraph::vulkan", "Failed to create swapchain image view: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create image view: {:?}", e))
                    })?;

                let info = TextureInfo {
                    width: extent.width,
                    height: extent.height,
                    format: self.format,
                    usage: TextureUsage::COLOR_ATTACHMENT,
                };
                self.images.push(Arc::new(Texture::borrowed(Arc::clone(&self.ctx), image, view, info)));
            }
        }

        while self.render_finished_semaphores.len() < self.images.len() {
            self.render_finished_semaphores.push(create_semaphore(&self.ctx.device)?);
        }

        Ok(())
    }
}

fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    unsafe {
        device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            .map_err(|e| {
                engine_error!("rendergraph::vulkan", "Failed to create semaphore: {:?}", e);
                Error::InitializationFailed(format!("Failed to create semaphore: {:?}", e))
            })
    }
}

impl RendererSwapchain for Swapchain {
    fn acquire_next_image(&mut self, frame_index: usize) -> Result<AcquireOutcome> {
        let semaphore = self.image_available_semaphores.get(frame_index).copied().ok_or_else(|| {
            engine_err!("rendergraph::vulkan", "acquire_next_image: frame slot {} out of range", frame_index)
        })?;

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            // Suboptimal images are still rendered; present reports the rebuild
            Ok((image_index, _suboptimal)) => Ok(AcquireOutcome::Image(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("rendergraph::vulkan", "Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(engine_err!("rendergraph::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn present(&mut self, _frame_index: usize, image_index: u32) -> Result<PresentOutcome> {
        let wait_semaphore = self.render_finished_semaphores.get(image_index as usize).copied().ok_or_else(|| {
            engine_err!("rendergraph::vulkan", "present: image {} out of range", image_index)
        })?;

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("rendergraph::vulkan", "Swapchain suboptimal or out of date during present");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(engine_err!("rendergraph::vulkan", "Failed to present swapchain image: {:?}", e)),
        }
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        self.build(Extent2D { width, height })?;
        engine_info!("rendergraph::vulkan", "Swapchain recreated: {} images, {}x{}",
            self.images.len(), self.extent.width, self.extent.height);
        Ok(())
    }

    fn extent(&self) -> Extent2D {
        Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn images(&self) -> &[Arc<dyn RendererTexture>] {
        &self.images
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            for &semaphore in &self.image_available_semaphores {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for &semaphore in &self.render_finished_semaphores {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }

            // Image views before the swapchain that owns the images
            self.images.clear();

            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
