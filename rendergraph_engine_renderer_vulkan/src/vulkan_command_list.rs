/// CommandList - Vulkan implementation of the CommandList trait

use rendergraph_engine::rendergraph::{Result, Error};
use rendergraph_engine::rendergraph::render::{
    CommandList as RendererCommandList,
    RenderPass as RendererRenderPass,
    Framebuffer as RendererFramebuffer,
    Pipeline as RendererPipeline,
    Buffer as RendererBuffer,
    DescriptorSet as RendererDescriptorSet,
    Texture as RendererTexture,
    Viewport, Rect2D, ClearValue, ImageBarrier, IndexType,
};
use rendergraph_engine::engine_error;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_render_pass::RenderPass;
use crate::vulkan_frame_buffer::Framebuffer;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_buffer::Buffer;
use crate::vulkan_descriptor_set::DescriptorSet;
use crate::vulkan_texture::Texture;
use crate::vulkan_format::{
    access_flags_to_vk, image_aspect_to_vk, image_layout_to_vk, index_type_to_vk, pipeline_stages_to_vk,
};

fn not_recording() -> Error {
    engine_error!("rendergraph::vulkan", "Command recorded while the command list is not recording");
    Error::BackendError("Command list not recording".to_string())
}

/// Vulkan command list, one per frame slot
///
/// Objects referenced by the recorded commands are retained until the next
/// `begin`, which the frame loop only calls after the slot's fence signaled.
pub struct CommandList {
    device: ash::Device,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    is_recording: bool,
    in_render_pass: bool,
    retained_framebuffers: Vec<Arc<dyn RendererFramebuffer>>,
    retained_pipelines: Vec<Arc<dyn RendererPipeline>>,
    retained_buffers: Vec<Arc<dyn RendererBuffer>>,
}

impl CommandList {
    /// Create a command pool and one primary command buffer on `graphics_queue_family`
    pub fn new(
        device: ash::Device,
        graphics_queue_family: u32,
    ) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| {
                    engine_error!("rendergraph::vulkan", "Failed to create command pool: {:?}", e);
                    Error::BackendError(format!("Failed to create command pool: {:?}", e))
                })?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = match device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers,
                Err(e) => {
                    device.destroy_command_pool(command_pool, None);
                    engine_error!("rendergraph::vulkan", "Failed to allocate command buffer: {:?}", e);
                    return Err(Error::BackendError(format!("Failed to allocate command buffers: {:?}", e)));
                }
            };

            Ok(Self {
                device,
                command_pool,
                command_buffer: command_buffers[0],
                is_recording: false,
                in_render_pass: false,
                retained_framebuffers: Vec::new(),
                retained_pipelines: Vec::new(),
                retained_buffers: Vec::new(),
            })
        }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn check_recording(&self) -> Result<()> {
        if self.is_recording {
            Ok(())
        } else {
            Err(not_recording())
        }
    }

    fn check_in_render_pass(&self) -> Result<()> {
        self.check_recording()?;
        if !self.in_render_pass {
            return Err(Error::BackendError("Not inside a render pass".to_string()));
        }
        Ok(())
    }
}

impl RendererCommandList for CommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::BackendError("Command list already recording".to_string()));
        }

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::BackendError(format!("Failed to reset command buffer: {:?}", e)))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| Error::BackendError(format!("Failed to begin command buffer: {:?}", e)))?;
        }

        self.is_recording = true;
        self.in_render_pass = false;
        self.retained_framebuffers.clear();
        self.retained_pipelines.clear();
        self.retained_buffers.clear();

        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.check_recording()?;

        if self.in_render_pass {
            return Err(Error::BackendError("Render pass not ended before ending command list".to_string()));
        }

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| Error::BackendError(format!("Failed to end command buffer: {:?}", e)))?;
        }

        self.is_recording = false;
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &Arc<dyn RendererRenderPass>,
        framebuffer: &Arc<dyn RendererFramebuffer>,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.check_recording()?;

        if self.in_render_pass {
            return Err(Error::BackendError("Already inside a render pass".to_string()));
        }

        let vk_clear_values: Vec<vk::ClearValue> = clear_values
            .iter()
            .map(|cv| match cv {
                ClearValue::Color(color) => vk::ClearValue {
                    color: vk::ClearColorValue { float32: *color },
                },
                ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: *depth, stencil: *stencil },
                },
            })
            .collect();

        unsafe {
            let vk_render_pass = render_pass.as_ref() as *const dyn RendererRenderPass as *const RenderPass;
            let vk_render_pass = &*vk_render_pass;

            let vk_framebuffer = framebuffer.as_ref() as *const dyn RendererFramebuffer as *const Framebuffer;
            let vk_framebuffer = &*vk_framebuffer;

            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(vk_render_pass.render_pass)
                .framebuffer(vk_framebuffer.framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D {
                        width: framebuffer.width(),
                        height: framebuffer.height(),
                    },
                })
                .clear_values(&vk_clear_values);

            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }

        self.retained_framebuffers.push(Arc::clone(framebuffer));
        self.in_render_pass = true;
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.check_in_render_pass()?;

        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
        self.in_render_pass = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.check_recording()?;

        let vk_viewport = vk::Viewport::default()
            .x(viewport.x)
            .y(viewport.y)
            .width(viewport.width)
            .height(viewport.height)
            .min_depth(viewport.min_depth)
            .max_depth(viewport.max_depth);

        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.check_recording()?;

        let vk_scissor = vk::Rect2D::default()
            .offset(vk::Offset2D { x: scissor.x, y: scissor.y })
            .extent(vk::Extent2D { width: scissor.width, height: scissor.height });

        unsafe {
            self.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn RendererPipeline>) -> Result<()> {
        self.check_recording()?;

        unsafe {
            let vk_pipeline = pipeline.as_ref() as *const dyn RendererPipeline as *const Pipeline;
            let vk_pipeline = &*vk_pipeline;

            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk_pipeline.pipeline,
            );
        }

        self.retained_pipelines.push(Arc::clone(pipeline));
        Ok(())
    }

    fn bind_descriptor_sets(
        &mut self,
        pipeline: &Arc<dyn RendererPipeline>,
        first_set: u32,
        sets: &[&Arc<dyn RendererDescriptorSet>],
    ) -> Result<()> {
        self.check_recording()?;

        unsafe {
            let vk_pipeline = pipeline.as_ref() as *const dyn RendererPipeline as *const Pipeline;
            let pipeline_layout = (*vk_pipeline).pipeline_layout;

            let vk_descriptor_sets: Vec<vk::DescriptorSet> = sets
                .iter()
                .map(|set| {
                    let vk_set = set.as_ref() as *const dyn RendererDescriptorSet as *const DescriptorSet;
                    (*vk_set).descriptor_set
                })
                .collect();

            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                first_set,
                &vk_descriptor_sets,
                &[],
            );
        }
        Ok(())
    }

    fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[Arc<dyn RendererBuffer>],
        offsets: &[u64],
    ) -> Result<()> {
        self.check_recording()?;

        if buffers.len() != offsets.len() {
            return Err(Error::InvalidResource(format!(
                "{} vertex buffers bound with {} offsets", buffers.len(), offsets.len()
            )));
        }

        let vk_buffers: Vec<vk::Buffer> = buffers
            .iter()
            .map(|buffer| unsafe {
                let vk_buffer = buffer.as_ref() as *const dyn RendererBuffer as *const Buffer;
                (*vk_buffer).buffer
            })
            .collect();

        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, first_binding, &vk_buffers, offsets);
        }

        self.retained_buffers.extend(buffers.iter().cloned());
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn RendererBuffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.check_recording()?;

        unsafe {
            let vk_buffer = buffer.as_ref() as *const dyn RendererBuffer as *const Buffer;
            let vk_buffer = &*vk_buffer;

            self.device.cmd_bind_index_buffer(
                self.command_buffer,
                vk_buffer.buffer,
                offset,
                index_type_to_vk(index_type),
            );
        }

        self.retained_buffers.push(Arc::clone(buffer));
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32) -> Result<()> {
        self.check_in_render_pass()?;

        unsafe {
            self.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, 0);
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()> {
        self.check_in_render_pass()?;

        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                0,
            );
        }
        Ok(())
    }

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) -> Result<()> {
        self.check_recording()?;

        if self.in_render_pass {
            return Err(Error::BackendError("Pipeline barrier recorded inside a render pass".to_string()));
        }
        if barriers.is_empty() {
            return Ok(());
        }

        let image_barriers: Vec<vk::ImageMemoryBarrier2> = barriers
            .iter()
            .map(|barrier| {
                let image = unsafe {
                    let vk_texture = barrier.texture.as_ref() as *const dyn RendererTexture as *const Texture;
                    (*vk_texture).image
                };
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(pipeline_stages_to_vk(barrier.src_stages))
                    .src_access_mask(access_flags_to_vk(barrier.src_access))
                    .dst_stage_mask(pipeline_stages_to_vk(barrier.dst_stages))
                    .dst_access_mask(access_flags_to_vk(barrier.dst_access))
                    .old_layout(image_layout_to_vk(barrier.old_layout))
                    .new_layout(image_layout_to_vk(barrier.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: image_aspect_to_vk(barrier.aspect),
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
            })
            .collect();

        let dependency_flags = if barriers.iter().all(|barrier| barrier.by_region) {
            vk::DependencyFlags::BY_REGION
        } else {
            vk::DependencyFlags::empty()
        };

        let dependency_info = vk::DependencyInfo::default()
            .dependency_flags(dependency_flags)
            .image_memory_barriers(&image_barriers);

        unsafe {
            self.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
        Ok(())
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        unsafe {
            // Frees the command buffer with the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
