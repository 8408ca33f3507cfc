/// VulkanRenderer - Vulkan implementation of the Renderer trait

use rendergraph_engine::rendergraph::{Renderer, Result, Error};
use rendergraph_engine::rendergraph::render::{
    AttachmentDesc, Buffer as RendererBuffer, BufferDesc, BufferUsage, CommandList as RendererCommandList, Config,
    DescriptorAllocator, DescriptorSet as RendererDescriptorSet, DescriptorSetLayoutDesc,
    DescriptorSetType, DeviceInfo, DeviceType, Extent2D, Framebuffer as RendererFramebuffer, FramebufferDesc,
    GraphicsPipelineDesc, ImageLayout, Pipeline as RendererPipeline, PipelineParams,
    RenderPass as RendererRenderPass, RenderPassDesc, SampledImageWrite, Shader as RendererShader,
    ShaderDesc, Swapchain as RendererSwapchain, Texture as RendererTexture, TextureDesc,
    TextureFormat, TextureInfo, TextureUsage, VertexInputRate,
};
use rendergraph_engine::{engine_bail, engine_bail_warn, engine_debug, engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};
use winit::window::Window;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_command_list::CommandList;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_set::{DescriptorPool, DescriptorSet, POOL_MAX_SETS};
use crate::vulkan_format::{
    aspect_for_format, descriptor_type_to_vk, image_layout_to_vk, load_op_to_vk, shader_stage_flags_to_vk,
    shader_stage_to_vk, store_op_to_vk, texture_format_to_vk,
};
use crate::vulkan_frame_buffer::Framebuffer;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_render_pass::RenderPass;
use crate::vulkan_sampler::{SamplerCache, SamplerKey};
use crate::vulkan_shader::{reflect_stage_layout, Shader};
use crate::vulkan_swapchain::{choose_surface_format, Swapchain};
use crate::vulkan_texture::Texture;

const SOURCE: &str = "rendergraph::vulkan";

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

/// Depth formats tried when the configured one is not renderable
const DEPTH_FALLBACKS: [TextureFormat; 3] = [
    TextureFormat::D32_FLOAT,
    TextureFormat::D24_UNORM_S8_UINT,
    TextureFormat::D16_UNORM,
];

/// Line width used for `PipelineParams::POINT_TOPOLOGY` pipelines
const POINT_LINE_WIDTH: f32 = 10.0;

/// Vulkan renderer
///
/// Owns the instance, the logical device, the per-frame fences, the descriptor
/// pools and the registry of descriptor set layouts. Swapchains are created on
/// demand per window.
pub struct VulkanRenderer {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,

    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    /// May be the graphics queue
    present_queue: vk::Queue,

    /// Allocator reference (also stored in GpuContext)
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    /// One per frame slot, created signaled
    frame_fences: Vec<vk::Fence>,

    /// Grows when the current pool is exhausted
    descriptor_pools: Mutex<Vec<Arc<DescriptorPool>>>,
    set_layouts: Mutex<FxHashMap<DescriptorSetType, vk::DescriptorSetLayout>>,
    /// Fills pipeline layout slots no stage uses
    empty_set_layout: vk::DescriptorSetLayout,
    sampler_cache: Mutex<SamplerCache>,

    /// Shared with every texture, buffer and swapchain
    gpu_context: Arc<GpuContext>,

    device_info: DeviceInfo,
    supports_geometry_shader: bool,
    supports_wide_lines: bool,
}

/// Physical device chosen for rendering and its queue families
struct DeviceCandidate {
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    graphics_family: u32,
    present_family: u32,
    transfer_family: u32,
}

fn init_failed(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!(SOURCE, "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

unsafe fn downcast_shader(shader: &Arc<dyn RendererShader>) -> &Shader {
    &*(shader.as_ref() as *const dyn RendererShader as *const Shader)
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| engine_err!(SOURCE, "{} lock poisoned", what))
}

fn device_type_from_vk(device_type: vk::PhysicalDeviceType) -> DeviceType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceType::DiscreteGpu,
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceType::IntegratedGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceType::VirtualGpu,
        vk::PhysicalDeviceType::CPU => DeviceType::Cpu,
        _ => DeviceType::Other,
    }
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

impl VulkanRenderer {
    /// Create the instance, pick a device able to present to `window` and
    /// create the logical device with synchronization2 enabled
    ///
    /// Validation layers are only requested when `config.enable_validation` is
    /// set and the crate was built with the `vulkan-validation` feature.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_failed("Failed to load Vulkan library", e))?;

            let validation = Self::validation_available(&entry, &config);

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_failed("Invalid application name", e))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"RenderGraphEngine")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle()
                .map_err(|e| init_failed("Failed to get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_failed("Failed to get required extensions", e))?
                .to_vec();
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if validation { vec![VALIDATION_LAYER.as_ptr()] } else { vec![] };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| init_failed("Failed to create Vulkan instance", e))?;

            let (debug_utils_loader, debug_messenger) = if validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);

                crate::debug::init_debug_config(crate::debug::Config {
                    severity: config.debug_severity,
                    message_filter: config.debug_message_filter,
                    enable_stats: config.enable_validation_stats,
                });

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::severity_flags(config.debug_severity))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| init_failed("Failed to create debug messenger", e))?;

                (Some(debug_utils), Some(messenger))
            } else {
                (None, None)
            };

            // Temporary surface for queue selection and the presentation format
            let window_handle = window.window_handle()
                .map_err(|e| init_failed("Failed to get window handle", e))?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_failed("Failed to create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let candidate = Self::pick_device(&instance, &surface_loader, surface);
            let presentation_format = candidate.as_ref().ok().and_then(|candidate| {
                surface_loader
                    .get_physical_device_surface_formats(candidate.physical_device, surface)
                    .ok()
                    .and_then(|formats| choose_surface_format(&formats))
                    .map(|(format, _)| format)
            });
            surface_loader.destroy_surface(surface, None);
            let candidate = candidate?;

            let features = instance.get_physical_device_features(candidate.physical_device);
            let supports_geometry_shader = features.geometry_shader == vk::TRUE;
            let supports_wide_lines = features.wide_lines == vk::TRUE;

            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(candidate.graphics_family)
                    .queue_priorities(&queue_priorities),
            ];
            if candidate.present_family != candidate.graphics_family {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(candidate.present_family)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default()
                .geometry_shader(supports_geometry_shader)
                .wide_lines(supports_wide_lines);
            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
                .synchronization2(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features)
                .push_next(&mut vulkan13_features);

            let device = instance.create_device(candidate.physical_device, &device_create_info, None)
                .map_err(|e| init_failed("Failed to create logical device", e))?;

            let graphics_queue = device.get_device_queue(candidate.graphics_family, 0);
            let present_queue = device.get_device_queue(candidate.present_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device: candidate.physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_failed("Failed to create GPU allocator", e))?;

            let frames_in_flight = config.frames_in_flight.max(1);
            let fence_create_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let mut frame_fences = Vec::with_capacity(frames_in_flight);
            for _ in 0..frames_in_flight {
                frame_fences.push(
                    device.create_fence(&fence_create_info, None)
                        .map_err(|e| init_failed("Failed to create frame fence", e))?,
                );
            }

            let descriptor_pool = DescriptorPool::new(&device)?;
            let empty_set_layout = device
                .create_descriptor_set_layout(&vk::DescriptorSetLayoutCreateInfo::default(), None)
                .map_err(|e| init_failed("Failed to create empty descriptor set layout", e))?;

            let depth_format = Self::pick_depth_format(&instance, candidate.physical_device, config.depth_format)?;

            let api = candidate.properties.api_version;
            let device_info = DeviceInfo {
                name: candidate.properties
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "Unknown device".to_string()),
                device_type: device_type_from_vk(candidate.properties.device_type),
                api_version: (
                    vk::api_version_major(api),
                    vk::api_version_minor(api),
                    vk::api_version_patch(api),
                ),
                depth_format,
                presentation_format: presentation_format.unwrap_or(TextureFormat::B8G8R8A8_SRGB),
                graphics_queue_family: candidate.graphics_family,
                transfer_queue_family: candidate.transfer_family,
                timestamp_period: candidate.properties.limits.timestamp_period,
            };

            engine_info!(SOURCE, "Device: {} ({:?}), Vulkan {}.{}.{}, {} frames in flight, validation {}",
                device_info.name, device_info.device_type,
                device_info.api_version.0, device_info.api_version.1, device_info.api_version.2,
                frames_in_flight, if validation { "on" } else { "off" });

            let allocator_arc = Arc::new(Mutex::new(allocator));
            let gpu_context = Arc::new(GpuContext::new(
                device.clone(),
                Arc::clone(&allocator_arc),
                graphics_queue,
                candidate.graphics_family,
                debug_utils_loader,
                debug_messenger,
            ));

            Ok(Self {
                entry,
                instance,
                physical_device: candidate.physical_device,
                device,
                graphics_queue,
                graphics_queue_family: candidate.graphics_family,
                present_queue,
                allocator: ManuallyDrop::new(allocator_arc),
                frame_fences,
                descriptor_pools: Mutex::new(vec![descriptor_pool]),
                set_layouts: Mutex::new(FxHashMap::default()),
                empty_set_layout,
                sampler_cache: Mutex::new(SamplerCache::new(Arc::clone(&gpu_context))),
                gpu_context,
                device_info,
                supports_geometry_shader,
                supports_wide_lines,
            })
        }
    }

    fn validation_available(entry: &ash::Entry, config: &Config) -> bool {
        if !config.enable_validation {
            return false;
        }
        if !cfg!(feature = "vulkan-validation") {
            engine_warn!(SOURCE, "Validation requested but the vulkan-validation feature is disabled");
            return false;
        }

        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found = layers.iter().any(|layer| {
            layer.layer_name_as_c_str().map(|name| name == VALIDATION_LAYER).unwrap_or(false)
        });
        if !found {
            engine_warn!(SOURCE, "{:?} not installed, running without validation", VALIDATION_LAYER);
        }
        found
    }

    /// Rank devices able to render and present to `surface`
    ///
    /// Requires Vulkan 1.3; prefers discrete, then integrated GPUs.
    unsafe fn pick_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<DeviceCandidate> {
        let physical_devices = instance.enumerate_physical_devices()
            .map_err(|e| init_failed("Failed to enumerate physical devices", e))?;

        let mut best: Option<DeviceCandidate> = None;
        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            if properties.api_version < vk::API_VERSION_1_3 {
                engine_debug!(SOURCE, "Skipping {:?}: Vulkan 1.3 required", properties.device_name_as_c_str());
                continue;
            }

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let Some(graphics_family) = queue_families
                .iter()
                .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|i| i as u32)
            else {
                continue;
            };

            let supports_present = |family: u32| {
                surface_loader
                    .get_physical_device_surface_support(physical_device, family, surface)
                    .unwrap_or(false)
            };
            let present_family = if supports_present(graphics_family) {
                Some(graphics_family)
            } else {
                (0..queue_families.len() as u32).find(|&family| supports_present(family))
            };
            let Some(present_family) = present_family else {
                continue;
            };

            let transfer_family = queue_families
                .iter()
                .position(|qf| {
                    qf.queue_flags.contains(vk::QueueFlags::TRANSFER)
                        && !qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                })
                .map_or(graphics_family, |i| i as u32);

            let better = best.as_ref().map_or(true, |current| {
                device_type_rank(properties.device_type) > device_type_rank(current.properties.device_type)
            });
            if better {
                best = Some(DeviceCandidate {
                    physical_device,
                    properties,
                    graphics_family,
                    present_family,
                    transfer_family,
                });
            }
        }

        best.ok_or_else(|| {
            engine_error!(SOURCE, "No Vulkan 1.3 GPU able to present to the window");
            Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
        })
    }

    /// `requested` when it can be a depth attachment, else the first renderable fallback
    unsafe fn pick_depth_format(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        requested: TextureFormat,
    ) -> Result<TextureFormat> {
        let renderable = |format: TextureFormat| {
            format.is_depth()
                && instance
                    .get_physical_device_format_properties(physical_device, texture_format_to_vk(format))
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        };

        if renderable(requested) {
            return Ok(requested);
        }
        let fallback = DEPTH_FALLBACKS.into_iter().find(|&format| renderable(format)).ok_or_else(|| {
            engine_error!(SOURCE, "No renderable depth format");
            Error::InitializationFailed("No renderable depth format".to_string())
        })?;
        engine_warn!(SOURCE, "Depth format {:?} not renderable, using {:?}", requested, fallback);
        Ok(fallback)
    }

    fn registered_layout(&self, set_type: DescriptorSetType) -> Result<vk::DescriptorSetLayout> {
        lock(&self.set_layouts, "descriptor set layout registry")?
            .get(&set_type)
            .copied()
            .ok_or_else(|| {
                let message = format!("descriptor set type {} has no registered layout", set_type);
                engine_error!(SOURCE, "{}", message);
                Error::InvalidResource(message)
            })
    }

    fn frame_fence(&self, frame_index: usize) -> Result<vk::Fence> {
        self.frame_fences.get(frame_index).copied().ok_or_else(|| {
            engine_err!(SOURCE, "Frame slot {} out of range ({} slots)", frame_index, self.frame_fences.len())
        })
    }

    /// Window extent clamped to at least one pixel
    fn window_extent(window: &Window) -> vk::Extent2D {
        let size = window.inner_size();
        vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        }
    }
}

impl Renderer for VulkanRenderer {
    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn frames_in_flight(&self) -> usize {
        self.frame_fences.len()
    }

    fn register_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<()> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc.bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type_to_vk(binding.descriptor_type))
                    .descriptor_count(binding.count)
                    .stage_flags(shader_stage_flags_to_vk(binding.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            self.device.create_descriptor_set_layout(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor set layout for {}: {:?}", desc.set_type, e))?
        };

        let previous = lock(&self.set_layouts, "descriptor set layout registry")?.insert(desc.set_type, layout);
        if let Some(previous) = previous {
            // Pipelines created with the previous layout keep working; only new allocations change
            engine_warn!(SOURCE, "Descriptor set layout for {} registered twice, replacing", desc.set_type);
            self.wait_idle()?;
            unsafe { self.device.destroy_descriptor_set_layout(previous, None); }
        }

        engine_debug!(SOURCE, "Registered descriptor set layout {} ({} bindings)", desc.set_type, bindings.len());
        Ok(())
    }

    fn create_attachment_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn RendererTexture>> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!(SOURCE, "create_attachment_texture: zero extent {}x{}", desc.width, desc.height);
        }

        let mut usage = vk::ImageUsageFlags::empty();
        if desc.usage.contains(TextureUsage::COLOR_ATTACHMENT) {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if desc.usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if desc.usage.contains(TextureUsage::SAMPLED) {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if usage.is_empty() {
            engine_bail!(SOURCE, "create_attachment_texture: empty usage for {:?}", desc.format);
        }

        let format = texture_format_to_vk(desc.format);

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = self.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create {}x{} {:?} image: {:?}",
                    desc.width, desc.height, desc.format, e))?;

            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = lock(&**self.allocator, "allocator")
                .and_then(|mut allocator| {
                    allocator.allocate(&AllocationCreateDesc {
                        name: "attachment",
                        requirements,
                        location: MemoryLocation::GpuOnly,
                        linear: false,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(|_| {
                        let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                        engine_error!(SOURCE, "Out of GPU memory for attachment (required: {:.2} MB)", size_mb);
                        Error::OutOfMemory
                    })
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.gpu_context.free_allocation(allocation);
                self.device.destroy_image(image, None);
                engine_bail!(SOURCE, "Failed to bind image memory: {:?}", e);
            }

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_for_format(desc.format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = match self.device.create_image_view(&view_create_info, None) {
                Ok(view) => view,
                Err(e) => {
                    self.gpu_context.free_allocation(allocation);
                    self.device.destroy_image(image, None);
                    engine_bail!(SOURCE, "Failed to create attachment image view: {:?}", e);
                }
            };

            let info = TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage,
            };
            Ok(Arc::new(Texture::owned(Arc::clone(&self.gpu_context), image, view, allocation, info)))
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RendererRenderPass>> {
        if desc.attachment_count() == 0 {
            engine_bail!(SOURCE, "create_render_pass: render pass without attachments");
        }

        let describe = |attachment: &AttachmentDesc| {
            vk::AttachmentDescription::default()
                .format(texture_format_to_vk(attachment.format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op_to_vk(attachment.load_op))
                .store_op(store_op_to_vk(attachment.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(image_layout_to_vk(attachment.initial_layout))
                .final_layout(image_layout_to_vk(attachment.final_layout))
        };

        let mut attachments: Vec<vk::AttachmentDescription> = desc.color_attachments.iter().map(describe).collect();
        let color_attachment_refs: Vec<vk::AttachmentReference> = (0..desc.color_attachments.len() as u32)
            .map(|i| {
                vk::AttachmentReference::default()
                    .attachment(i)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            })
            .collect();

        let depth_attachment_ref = desc.depth_attachment.as_ref().map(|depth| {
            attachments.push(describe(depth));
            vk::AttachmentReference::default()
                .attachment(desc.color_attachments.len() as u32)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_refs);
        if let Some(ref depth_ref) = depth_attachment_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let (stage_mask, access_mask) = if depth_attachment_ref.is_some() {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
        } else {
            (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        };

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stage_mask)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stage_mask)
            .dst_access_mask(access_mask);

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        let render_pass = unsafe {
            self.device.create_render_pass(&render_pass_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create render pass: {:?}", e))?
        };

        Ok(Arc::new(RenderPass {
            render_pass,
            color_attachment_count: desc.color_attachments.len() as u32,
            device: self.device.clone(),
        }))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Arc<dyn RendererFramebuffer>> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!(SOURCE, "create_framebuffer: zero extent {}x{}", desc.width, desc.height);
        }

        unsafe {
            let vk_render_pass = desc.render_pass.as_ref() as *const dyn RendererRenderPass as *const RenderPass;
            let vk_render_pass = &*vk_render_pass;

            if (desc.attachments.len() as u32) < vk_render_pass.color_attachment_count {
                engine_bail!(SOURCE, "create_framebuffer: {} attachments for a render pass with {} color attachments",
                    desc.attachments.len(), vk_render_pass.color_attachment_count);
            }

            let views: Vec<vk::ImageView> = desc.attachments
                .iter()
                .map(|texture| {
                    let vk_texture = texture.as_ref() as *const dyn RendererTexture as *const Texture;
                    (*vk_texture).view
                })
                .collect();

            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(vk_render_pass.render_pass)
                .attachments(&views)
                .width(desc.width)
                .height(desc.height)
                .layers(1);

            let framebuffer = self.device.create_framebuffer(&framebuffer_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create framebuffer: {:?}", e))?;

            Ok(Arc::new(Framebuffer::new(
                framebuffer,
                desc.width,
                desc.height,
                desc.attachments.clone(),
                self.device.clone(),
            )))
        }
    }

    fn write_sampled_images(&self, set: &Arc<dyn RendererDescriptorSet>, writes: &[SampledImageWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let sampler = lock(&self.sampler_cache, "sampler cache")?.get(SamplerKey::NODE_INPUT)?;

        unsafe {
            let vk_set = set.as_ref() as *const dyn RendererDescriptorSet as *const DescriptorSet;
            let vk_set = &*vk_set;

            let image_infos: Vec<vk::DescriptorImageInfo> = writes
                .iter()
                .map(|write| {
                    if write.layout == ImageLayout::Undefined {
                        engine_warn!(SOURCE, "Sampled image at binding {} written with an undefined layout", write.binding);
                    }
                    let vk_texture = write.texture.as_ref() as *const dyn RendererTexture as *const Texture;
                    vk::DescriptorImageInfo::default()
                        .sampler(sampler)
                        .image_view((*vk_texture).view)
                        .image_layout(image_layout_to_vk(write.layout))
                })
                .collect();

            let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
                .iter()
                .zip(&image_infos)
                .map(|(write, image_info)| {
                    vk::WriteDescriptorSet::default()
                        .dst_set(vk_set.descriptor_set)
                        .dst_binding(write.binding)
                        .dst_array_element(0)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(image_info))
                })
                .collect();

            self.device.update_descriptor_sets(&descriptor_writes, &[]);
        }

        Ok(())
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<dyn RendererShader>> {
        if desc.code.len() % 4 != 0 {
            engine_bail_warn!(SOURCE, "Shader code not 4-byte aligned (size: {} bytes)", desc.code.len());
        }

        let code = ash::util::read_spv(&mut std::io::Cursor::new(desc.code))
            .map_err(|e| engine_err!(SOURCE, "Invalid SPIR-V for {:?} shader: {}", desc.stage, e))?;

        let entry_point = CString::new(desc.entry_point.as_str()).map_err(|e| {
            engine_error!(SOURCE, "Invalid entry point name {:?}: {}", desc.entry_point, e);
            Error::InvalidResource(format!("invalid entry point name: {}", e))
        })?;

        let layout = {
            let registry = lock(&self.set_layouts, "descriptor set layout registry")?;
            reflect_stage_layout(&code, desc.stage, &desc.entry_point, &desc.set_types, |set_type| {
                registry.contains_key(&set_type)
            })?
        };

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe {
            self.device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create shader module: {:?}", e))?
        };

        engine_debug!(SOURCE, "Created {:?} shader '{}': {} sets, {} vertex bindings, {} push constant bytes",
            desc.stage, desc.entry_point, layout.set_types.len(), layout.vertex_bindings.len(), layout.push_constant_size);

        Ok(Arc::new(Shader {
            module,
            stage: shader_stage_to_vk(desc.stage),
            entry_point,
            layout,
            device: self.device.clone(),
        }))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn RendererPipeline>> {
        let layout_info = desc.layout_info()?;

        if desc.geometry_shader.is_some() && !self.supports_geometry_shader {
            let message = "geometry shaders are not supported by this device".to_string();
            engine_error!(SOURCE, "{}", message);
            return Err(Error::InvalidResource(message));
        }

        unsafe {
            let vk_render_pass = desc.render_pass.as_ref() as *const dyn RendererRenderPass as *const RenderPass;
            let vk_render_pass = &*vk_render_pass;

            if desc.color_attachment_count != vk_render_pass.color_attachment_count {
                let message = format!(
                    "pipeline declares {} color attachments, render pass has {}",
                    desc.color_attachment_count, vk_render_pass.color_attachment_count
                );
                engine_error!(SOURCE, "{}", message);
                return Err(Error::InvalidResource(message));
            }

            let mut stage_shaders = vec![downcast_shader(desc.vertex_shader)];
            if let Some(geometry) = desc.geometry_shader {
                stage_shaders.push(downcast_shader(geometry));
            }
            if let Some(fragment) = desc.fragment_shader {
                stage_shaders.push(downcast_shader(fragment));
            }
            let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = stage_shaders
                .iter()
                .map(|shader| {
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(shader.stage)
                        .module(shader.module)
                        .name(&shader.entry_point)
                })
                .collect();

            let vertex_bindings: Vec<vk::VertexInputBindingDescription> = layout_info.vertex_bindings()
                .iter()
                .map(|binding| vk::VertexInputBindingDescription {
                    binding: binding.binding,
                    stride: binding.stride,
                    input_rate: match binding.input_rate {
                        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
                        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
                    },
                })
                .collect();
            let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = layout_info.vertex_attributes()
                .iter()
                .map(|attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: attribute.binding,
                    format: texture_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
                .collect();
            let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);

            let topology = if desc.params.contains(PipelineParams::LINE_TOPOLOGY) {
                vk::PrimitiveTopology::LINE_LIST
            } else if desc.params.contains(PipelineParams::POINT_TOPOLOGY) {
                vk::PrimitiveTopology::POINT_LIST
            } else {
                vk::PrimitiveTopology::TRIANGLE_LIST
            };
            let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(topology)
                .primitive_restart_enable(false);

            // Viewport and scissor are dynamic; these only seed the state
            let viewports = [vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: desc.extent.width as f32,
                height: desc.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }];
            let scissors = [vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width: desc.extent.width, height: desc.extent.height },
            }];
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewports(&viewports)
                .scissors(&scissors);

            let line_width = if desc.params.contains(PipelineParams::POINT_TOPOLOGY) && self.supports_wide_lines {
                POINT_LINE_WIDTH
            } else {
                1.0
            };
            let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(desc.fragment_shader.is_none())
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(line_width)
                .cull_mode(vk::CullModeFlags::BACK)
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false);
            if desc.params.contains(PipelineParams::DEPTH_BIAS) {
                rasterization_state = rasterization_state
                    .depth_bias_enable(true)
                    .depth_bias_constant_factor(10.0)
                    .depth_bias_clamp(0.0)
                    .depth_bias_slope_factor(1.0);
            }

            let depth_test = !desc.params.contains(PipelineParams::DISABLE_DEPTH_TEST);
            let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(depth_test)
                .depth_write_enable(depth_test)
                .depth_compare_op(vk::CompareOp::LESS)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false);

            let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
                .sample_shading_enable(false)
                .rasterization_samples(vk::SampleCountFlags::TYPE_1);

            let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD);
            let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];
            let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .attachments(&blend_attachments);

            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

            // Every index up to the highest used set needs a layout
            let set_count = layout_info.set_layouts().keys().next_back().map_or(0, |&max| max + 1);
            let mut descriptor_set_layouts = Vec::with_capacity(set_count as usize);
            for index in 0..set_count {
                match layout_info.set_layouts().get(&index) {
                    Some(&set_type) => descriptor_set_layouts.push(self.registered_layout(set_type)?),
                    None => descriptor_set_layouts.push(self.empty_set_layout),
                }
            }

            let push_constant_ranges: Vec<vk::PushConstantRange> = layout_info.push_constant_ranges()
                .iter()
                .map(|range| vk::PushConstantRange {
                    stage_flags: shader_stage_flags_to_vk(range.stages),
                    offset: range.offset,
                    size: range.size,
                })
                .collect();

            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&descriptor_set_layouts)
                .push_constant_ranges(&push_constant_ranges);
            let pipeline_layout = self.device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create pipeline layout: {:?}", e))?;

            let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .depth_stencil_state(&depth_stencil_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(pipeline_layout)
                .render_pass(vk_render_pass.render_pass)
                .subpass(0);

            let pipeline = match self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_create_info),
                None,
            ) {
                Ok(pipelines) => pipelines[0],
                Err((_, e)) => {
                    self.device.destroy_pipeline_layout(pipeline_layout, None);
                    engine_bail!(SOURCE, "Failed to create graphics pipeline: {:?}", e);
                }
            };

            Ok(Arc::new(Pipeline {
                pipeline,
                pipeline_layout,
                layout_info,
                device: self.device.clone(),
            }))
        }
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn RendererBuffer>> {
        if desc.size == 0 {
            engine_bail!(SOURCE, "create_buffer: zero-sized {:?} buffer", desc.usage);
        }

        let usage = match desc.usage {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
        };

        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = self.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = lock(&**self.allocator, "allocator")
                .and_then(|mut allocator| {
                    allocator.allocate(&AllocationCreateDesc {
                        name: "buffer",
                        requirements,
                        location: MemoryLocation::CpuToGpu,
                        linear: true,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(|_| {
                        let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                        engine_error!(SOURCE, "Out of GPU memory for buffer (required: {:.2} MB)", size_mb);
                        Error::OutOfMemory
                    })
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.gpu_context.free_allocation(allocation);
                self.device.destroy_buffer(buffer, None);
                engine_bail!(SOURCE, "Failed to bind buffer memory: {:?}", e);
            }

            Ok(Arc::new(Buffer::new(Arc::clone(&self.gpu_context), buffer, allocation, desc.size)))
        }
    }

    fn create_command_list(&self) -> Result<Box<dyn RendererCommandList>> {
        Ok(Box::new(CommandList::new(self.device.clone(), self.graphics_queue_family)?))
    }

    fn create_swapchain(&self, window: &Window) -> Result<Box<dyn RendererSwapchain>> {
        let display_handle = window.display_handle()
            .map_err(|e| init_failed("Failed to get display handle for swapchain", e))?;
        let window_handle = window.window_handle()
            .map_err(|e| init_failed("Failed to get window handle for swapchain", e))?;

        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_failed("Failed to create surface for swapchain", e))?
        };
        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &self.instance);

        let extent = Self::window_extent(window);
        let swapchain = Swapchain::new(
            Arc::clone(&self.gpu_context),
            self.physical_device,
            &self.instance,
            surface,
            surface_loader,
            self.present_queue,
            self.frame_fences.len(),
            Extent2D { width: extent.width, height: extent.height },
        )?;

        Ok(Box::new(swapchain))
    }

    fn wait_for_frame(&self, frame_index: usize) -> Result<()> {
        let fence = self.frame_fence(frame_index)?;
        unsafe {
            self.device.wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!(SOURCE, "Failed to wait for frame fence {}: {:?}", frame_index, e))
        }
    }

    fn submit(
        &self,
        commands: &dyn RendererCommandList,
        frame_index: usize,
        swapchain: &dyn RendererSwapchain,
        image_index: u32,
    ) -> Result<()> {
        let fence = self.frame_fence(frame_index)?;

        unsafe {
            let vk_commands = &*(commands as *const dyn RendererCommandList as *const CommandList);
            let vk_swapchain = &*(swapchain as *const dyn RendererSwapchain as *const Swapchain);
            let (wait_semaphore, signal_semaphore) = vk_swapchain.sync_info(frame_index, image_index)?;

            self.device.reset_fences(&[fence])
                .map_err(|e| engine_err!(SOURCE, "Failed to reset frame fence {}: {:?}", frame_index, e))?;

            let wait_semaphores = [wait_semaphore];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [vk_commands.command_buffer()];
            let signal_semaphores = [signal_semaphore];

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            self.device.queue_submit(self.graphics_queue, std::slice::from_ref(&submit_info), fence)
                .map_err(|e| engine_err!(SOURCE, "Failed to submit frame {} to GPU queue: {:?}", frame_index, e))
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "Failed to wait idle: {:?}", e))
        }
    }
}

impl DescriptorAllocator for VulkanRenderer {
    fn free_descriptor_set(&self, set_type: DescriptorSetType) -> Result<Arc<dyn RendererDescriptorSet>> {
        let layout = self.registered_layout(set_type)?;
        let mut pools = lock(&self.descriptor_pools, "descriptor pools")?;

        // Newest pool first; older pools regain room as rebuilt graph sets drop
        for pool in pools.iter().rev() {
            match pool.allocate(layout, set_type) {
                Ok(set) => return Ok(Arc::new(set)),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => continue,
                Err(e) => engine_bail!(SOURCE, "Failed to allocate {} descriptor set: {:?}", set_type, e),
            }
        }

        let pool = DescriptorPool::new(&self.device)?;
        pools.push(Arc::clone(&pool));
        engine_info!(SOURCE, "Descriptor pools exhausted, created new pool (total: {}, {} sets each)",
            pools.len(), POOL_MAX_SETS);

        let set = pool.allocate(layout, set_type)
            .map_err(|e| engine_err!(SOURCE, "Failed to allocate descriptor set after pool growth: {:?}", e))?;
        Ok(Arc::new(set))
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Samplers first; afterwards the cache no longer holds the context
            if let Ok(cache) = self.sampler_cache.get_mut() {
                cache.shutdown();
            }

            // 2. Renderer-owned objects
            for &fence in &self.frame_fences {
                self.device.destroy_fence(fence, None);
            }
            if let Ok(pools) = self.descriptor_pools.get_mut() {
                let shared = pools.iter().filter(|pool| Arc::strong_count(pool) > 1).count();
                if shared > 0 {
                    engine_warn!(SOURCE, "{} descriptor pools still hold live sets at renderer teardown", shared);
                }
                pools.clear();
            }
            if let Ok(layouts) = self.set_layouts.get_mut() {
                for (_, layout) in layouts.drain() {
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
            }
            self.device.destroy_descriptor_set_layout(self.empty_set_layout, None);

            // 3. Allocator pages go before the device
            ManuallyDrop::drop(&mut self.allocator);
            match Arc::get_mut(&mut self.gpu_context) {
                Some(ctx) => ManuallyDrop::drop(&mut ctx.allocator),
                None => engine_warn!(SOURCE, "GPU resources outlive the renderer; allocator leaked"),
            }

            // 4. No callbacks during teardown
            crate::debug::cleanup_debug_config();

            if let (Some(debug_utils), Some(messenger)) = (
                &self.gpu_context.debug_utils_loader,
                &self.gpu_context.debug_messenger,
            ) {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            // 5. Device and instance last
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
