/// Render graph handler: materializes a built graph into GPU resources and
/// replays it every frame into a command list.
///
/// Images are created once per attachment name, framebuffers once per node
/// (per swapchain image for swapchain nodes), and descriptor sets once per
/// `(consumer node, set type)` group of sampled edges. Everything is rebuilt
/// wholesale when the swapchain is recreated.

use std::collections::BTreeMap;
use std::sync::Arc;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SecondaryMap;
use crate::error::{Error, Result};
use crate::renderer::{
    AccessFlags, ClearValue, CommandList, DescriptorAllocator, DescriptorSetHolder, DescriptorSetType,
    ExtentClass, Extents, Framebuffer, FramebufferDesc, ImageAspect, ImageBarrier, ImageLayout,
    IndexType, Pipeline, PipelineStages, Rect2D, Renderer, SampledImageWrite, Texture, TextureDesc,
    TextureFormat, TextureUsage, Viewport,
};
use super::attachment::{Dependency, ForwardMode};
use super::descriptor_binding::bind_descriptor_sets;
use super::render_graph::RenderGraph;
use super::render_model::RenderModel;
use super::render_node::{NodeId, RenderNode};

const SOURCE: &str = "rendergraph::RenderGraphHandler";

fn resource_error(message: String) -> Error {
    crate::engine_error!(SOURCE, "{}", message);
    Error::InvalidResource(message)
}

/// GPU image shared by every attachment with the same name
#[derive(Clone)]
pub struct AttachmentImage {
    pub format: TextureFormat,
    pub extent_class: ExtentClass,
    pub texture: Arc<dyn Texture>,
}

/// Counters of one recorded frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: u32,
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    /// `bind_descriptor_sets` calls after coalescing
    pub descriptor_binds: u32,
    /// Image barriers, all levels included
    pub barriers: u32,
}

/// Framebuffers of every swapchain node for one swapchain image
pub struct SwapchainFramebuffer {
    image: Arc<dyn Texture>,
    framebuffers: SecondaryMap<NodeId, Arc<dyn Framebuffer>>,
}

impl SwapchainFramebuffer {
    pub fn image(&self) -> &Arc<dyn Texture> {
        &self.image
    }

    pub fn for_node(&self, node: NodeId) -> Option<&Arc<dyn Framebuffer>> {
        self.framebuffers.get(node)
    }
}

#[derive(Default)]
struct NodeResources {
    /// None for nodes drawing into the swapchain framebuffer
    framebuffer: Option<Arc<dyn Framebuffer>>,
    /// Sets fed by sampled edges into this node
    descriptor_sets: DescriptorSetHolder,
}

/// Runtime resources of a built render graph
pub struct RenderGraphHandler {
    depth_format: TextureFormat,
    images: FxHashMap<String, AttachmentImage>,
    nodes: SecondaryMap<NodeId, NodeResources>,
}

impl RenderGraphHandler {
    /// Create attachment images, node framebuffers and sampled descriptor sets
    ///
    /// # Errors
    ///
    /// * `InvalidGraph` if `graph` is not built
    /// * `InvalidResource` if two attachments share a name but not an extent class or format,
    ///   or if a swapchain slot is sampled or declared outside a presentation node
    pub fn new(
        renderer: &dyn Renderer,
        graph: &RenderGraph,
        extents: &Extents,
        descriptor_allocator: &dyn DescriptorAllocator,
    ) -> Result<Self> {
        if !graph.is_built() {
            return Err(Error::InvalidGraph("render graph must be built before materialization".to_string()));
        }

        let mut handler = Self {
            depth_format: renderer.device_info().depth_format,
            images: FxHashMap::default(),
            nodes: SecondaryMap::new(),
        };

        // An image is sampled as soon as one of its same-name attachments has a sampled edge
        let sampled_names: FxHashSet<&str> = graph
            .nodes()
            .flat_map(|(_, node)| node.attachments().iter())
            .filter(|attachment| attachment.has_sampled_dependency())
            .map(|attachment| attachment.name.as_str())
            .collect();

        let mut sampled_groups: BTreeMap<(NodeId, DescriptorSetType), BTreeMap<u32, String>> = BTreeMap::new();

        for (id, node) in graph.nodes() {
            handler.materialize_node_images(renderer, node, extents, &sampled_names)?;

            for attachment in node.attachments() {
                for dependency in &attachment.dependencies {
                    if let ForwardMode::AsSampledDescriptor { set_type, binding } = dependency.mode {
                        if attachment.is_swapchain {
                            return Err(resource_error(format!(
                                "node '{}' samples the swapchain image, which is never sampleable",
                                node.name()
                            )));
                        }
                        sampled_groups
                            .entry((dependency.to_node, set_type))
                            .or_default()
                            .insert(binding, attachment.name.clone());
                    }
                }
            }

            let framebuffer = if node.uses_swapchain_framebuffer() {
                None
            } else {
                let extent = extents.get(node.extent_class());
                let attachments = handler.pass_textures(node, None)?;
                Some(renderer.create_framebuffer(&FramebufferDesc {
                    render_pass: built_render_pass(node)?,
                    attachments,
                    width: extent.width,
                    height: extent.height,
                })?)
            };
            handler.nodes.insert(id, NodeResources { framebuffer, descriptor_sets: DescriptorSetHolder::new() });
        }

        for ((to_node, set_type), bindings) in sampled_groups {
            let set = descriptor_allocator.free_descriptor_set(set_type)?;
            let writes: Vec<SampledImageWrite> = bindings
                .iter()
                .map(|(&binding, name)| {
                    let image = &handler.images[name];
                    SampledImageWrite {
                        binding,
                        texture: Arc::clone(&image.texture),
                        layout: if image.format == handler.depth_format {
                            ImageLayout::DepthStencilReadOnly
                        } else {
                            ImageLayout::ShaderReadOnly
                        },
                    }
                })
                .collect();
            renderer.write_sampled_images(&set, &writes)?;

            if let Some(resources) = handler.nodes.get_mut(to_node) {
                resources.descriptor_sets.insert(set_type, set);
            }
        }

        crate::engine_info!(
            SOURCE,
            "Materialized {} attachment images, {} node framebuffers",
            handler.images.len(),
            handler.nodes.values().filter(|r| r.framebuffer.is_some()).count()
        );
        Ok(handler)
    }

    fn materialize_node_images(
        &mut self,
        renderer: &dyn Renderer,
        node: &RenderNode,
        extents: &Extents,
        sampled_names: &FxHashSet<&str>,
    ) -> Result<()> {
        for attachment in node.attachments() {
            if attachment.is_swapchain {
                if node.extent_class() != ExtentClass::Presentation {
                    return Err(resource_error(format!(
                        "node '{}' renders into the swapchain but is sized {:?}",
                        node.name(), node.extent_class()
                    )));
                }
                continue;
            }

            if let Some(existing) = self.images.get(&attachment.name) {
                if existing.extent_class != node.extent_class() || existing.format != attachment.format {
                    return Err(resource_error(format!(
                        "attachment '{}' of node '{}' is {:?}/{:?}, but the image was created as {:?}/{:?}",
                        attachment.name, node.name(), node.extent_class(), attachment.format,
                        existing.extent_class, existing.format
                    )));
                }
                continue;
            }

            let mut usage = if attachment.format == self.depth_format {
                TextureUsage::DEPTH_STENCIL_ATTACHMENT
            } else {
                TextureUsage::COLOR_ATTACHMENT
            };
            if sampled_names.contains(attachment.name.as_str()) {
                usage |= TextureUsage::SAMPLED;
            }

            let extent = extents.get(node.extent_class());
            let texture = renderer.create_attachment_texture(&TextureDesc {
                width: extent.width,
                height: extent.height,
                format: attachment.format,
                usage,
            })?;
            crate::engine_debug!(
                SOURCE,
                "Image '{}' {}x{} {:?} {:?}",
                attachment.name, extent.width, extent.height, attachment.format, usage
            );

            self.images.insert(attachment.name.clone(), AttachmentImage {
                format: attachment.format,
                extent_class: node.extent_class(),
                texture,
            });
        }
        Ok(())
    }

    // Textures of `node` in render pass order; the swapchain slot takes `swapchain_image`
    fn pass_textures(&self, node: &RenderNode, swapchain_image: Option<&Arc<dyn Texture>>) -> Result<Vec<Arc<dyn Texture>>> {
        node.pass_attachment_order(self.depth_format)?
            .into_iter()
            .map(|index| {
                let attachment = &node.attachments()[index];
                let texture = if attachment.is_swapchain {
                    swapchain_image
                } else {
                    self.images.get(&attachment.name).map(|image| &image.texture)
                };
                texture.cloned().ok_or_else(|| {
                    resource_error(format!("no image for attachment '{}' of node '{}'", attachment.name, node.name()))
                })
            })
            .collect()
    }

    /// Build, for each swapchain image, the framebuffers of the nodes drawing into it
    pub fn create_swapchain_framebuffers(
        &self,
        renderer: &dyn Renderer,
        graph: &RenderGraph,
        swapchain_images: &[Arc<dyn Texture>],
    ) -> Result<Vec<SwapchainFramebuffer>> {
        swapchain_images
            .iter()
            .map(|image| {
                let mut framebuffers = SecondaryMap::new();
                for (id, node) in graph.nodes().filter(|(_, node)| node.uses_swapchain_framebuffer()) {
                    let framebuffer = renderer.create_framebuffer(&FramebufferDesc {
                        render_pass: built_render_pass(node)?,
                        attachments: self.pass_textures(node, Some(image))?,
                        width: image.info().width,
                        height: image.info().height,
                    })?;
                    framebuffers.insert(id, framebuffer);
                }
                Ok(SwapchainFramebuffer { image: Arc::clone(image), framebuffers })
            })
            .collect()
    }

    // ===== FRAME RECORDING =====

    /// Record one frame: every level in turn, then one barrier batch per level
    ///
    /// Each node draws the models whose category it accepts. The pipeline is
    /// rebound only when it changes within a pass, and node and scene sets
    /// are bound right after each pipeline bind.
    pub fn fill_command_buffer(
        &self,
        cmd: &mut dyn CommandList,
        graph: &RenderGraph,
        swapchain: &SwapchainFramebuffer,
        scene_sets: &DescriptorSetHolder,
        render_models: &[RenderModel],
    ) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        cmd.begin()?;

        for level in 0.. {
            let level_nodes = graph.nodes_at_order(level);
            if level_nodes.is_empty() {
                break;
            }

            let mut pending: Vec<&Dependency> = Vec::new();
            for id in level_nodes {
                let node = graph
                    .node(id)
                    .ok_or_else(|| Error::InvalidGraph(format!("unknown node {:?}", id)))?;
                self.record_node(cmd, id, node, swapchain, scene_sets, render_models, &mut stats)?;
                pending.extend(node.attachments().iter().flat_map(|a| a.dependencies.iter()));
            }

            if !pending.is_empty() {
                let barriers = pending
                    .into_iter()
                    .map(|dependency| self.barrier_for(graph, dependency, swapchain))
                    .collect::<Result<Vec<_>>>()?;
                cmd.pipeline_barrier(&barriers)?;
                stats.barriers += barriers.len() as u32;
            }
        }

        cmd.end()?;
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_node(
        &self,
        cmd: &mut dyn CommandList,
        id: NodeId,
        node: &RenderNode,
        swapchain: &SwapchainFramebuffer,
        scene_sets: &DescriptorSetHolder,
        render_models: &[RenderModel],
        stats: &mut FrameStats,
    ) -> Result<()> {
        let resources = self
            .nodes
            .get(id)
            .ok_or_else(|| resource_error(format!("node '{}' was added after materialization", node.name())))?;
        let framebuffer = match &resources.framebuffer {
            Some(framebuffer) => framebuffer,
            None => swapchain.for_node(id).ok_or_else(|| {
                resource_error(format!("no swapchain framebuffer for node '{}'", node.name()))
            })?,
        };

        let clear_values: Vec<ClearValue> = framebuffer
            .formats()
            .iter()
            .map(|&format| {
                if format == self.depth_format {
                    ClearValue::DepthStencil { depth: 1.0, stencil: 0 }
                } else {
                    ClearValue::Color([0.0, 0.0, 0.0, 1.0])
                }
            })
            .collect();

        cmd.begin_render_pass(built_render_pass(node)?, framebuffer, &clear_values)?;
        cmd.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: framebuffer.width() as f32,
            height: framebuffer.height() as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        })?;
        cmd.set_scissor(Rect2D { x: 0, y: 0, width: framebuffer.width(), height: framebuffer.height() })?;
        stats.passes += 1;

        let mut bound: Option<&Arc<dyn Pipeline>> = None;
        for model in render_models.iter().filter(|m| node.category_filter().intersects(m.category)) {
            if !bound.is_some_and(|pipeline| Arc::ptr_eq(pipeline, &model.pipeline)) {
                cmd.bind_pipeline(&model.pipeline)?;
                stats.pipeline_binds += 1;
                stats.descriptor_binds += bind_descriptor_sets(cmd, &model.pipeline, &resources.descriptor_sets)?;
                stats.descriptor_binds += bind_descriptor_sets(cmd, &model.pipeline, scene_sets)?;
                bound = Some(&model.pipeline);
            }
            stats.descriptor_binds += bind_descriptor_sets(cmd, &model.pipeline, &model.descriptor_sets)?;

            if model.vertex_buffers.len() != model.vertex_buffer_offsets.len() {
                return Err(resource_error(format!(
                    "render model has {} vertex buffers but {} offsets",
                    model.vertex_buffers.len(), model.vertex_buffer_offsets.len()
                )));
            }
            if !model.vertex_buffers.is_empty() {
                cmd.bind_vertex_buffers(0, &model.vertex_buffers, &model.vertex_buffer_offsets)?;
            }

            match &model.index_buffer {
                Some((buffer, offset)) => {
                    cmd.bind_index_buffer(buffer, *offset, IndexType::U16)?;
                    cmd.draw_indexed(model.vertex_count, 1, 0, 0)?;
                }
                None => cmd.draw(model.vertex_count, 1, 0)?,
            }
            stats.draw_calls += 1;
        }

        cmd.end_render_pass()
    }

    fn barrier_for(
        &self,
        graph: &RenderGraph,
        dependency: &Dependency,
        swapchain: &SwapchainFramebuffer,
    ) -> Result<ImageBarrier> {
        let attachment = graph
            .attachment(dependency.from)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown attachment {:?}", dependency.from)))?;

        let texture = if attachment.is_swapchain {
            Arc::clone(swapchain.image())
        } else {
            self.images
                .get(&attachment.name)
                .map(|image| Arc::clone(&image.texture))
                .ok_or_else(|| resource_error(format!("no image for attachment '{}'", attachment.name)))?
        };

        let is_depth = attachment.format == self.depth_format;
        let (aspect, written, src_stages, src_access) = if is_depth {
            (
                ImageAspect::Depth,
                ImageLayout::DepthStencilAttachment,
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
        } else {
            (
                ImageAspect::Color,
                ImageLayout::ColorAttachment,
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
        };

        let (new_layout, dst_stages, dst_access) = match dependency.mode {
            ForwardMode::AsSampledDescriptor { .. } => (
                if is_depth { ImageLayout::DepthStencilReadOnly } else { ImageLayout::ShaderReadOnly },
                PipelineStages::FRAGMENT_SHADER,
                AccessFlags::SHADER_READ,
            ),
            ForwardMode::AsFramebufferAttachment => (written, src_stages, src_access),
        };

        Ok(ImageBarrier {
            texture,
            old_layout: written,
            new_layout,
            aspect,
            src_stages,
            src_access,
            dst_stages,
            dst_access,
            by_region: true,
        })
    }

    /// Drop every attachment image, node framebuffer and node descriptor set
    ///
    /// Only valid once the GPU is idle. Returns the number of descriptor sets released.
    pub fn release(&mut self) -> usize {
        let sets = self.nodes.values().map(|resources| resources.descriptor_sets.len()).sum();
        self.images.clear();
        self.nodes.clear();
        sets
    }

    // ===== QUERIES =====

    pub fn attachment_image(&self, name: &str) -> Option<&AttachmentImage> {
        self.images.get(name)
    }

    pub fn attachment_image_count(&self) -> usize {
        self.images.len()
    }

    /// Own framebuffer of a node; None for swapchain nodes
    pub fn node_framebuffer(&self, node: NodeId) -> Option<&Arc<dyn Framebuffer>> {
        self.nodes.get(node).and_then(|r| r.framebuffer.as_ref())
    }

    pub fn node_descriptor_sets(&self, node: NodeId) -> Option<&DescriptorSetHolder> {
        self.nodes.get(node).map(|r| &r.descriptor_sets)
    }
}

fn built_render_pass(node: &RenderNode) -> Result<&Arc<dyn crate::renderer::RenderPass>> {
    node.render_pass()
        .ok_or_else(|| Error::InvalidGraph(format!("node '{}' has no render pass", node.name())))
}

#[cfg(test)]
#[path = "render_graph_handler_tests.rs"]
mod tests;
