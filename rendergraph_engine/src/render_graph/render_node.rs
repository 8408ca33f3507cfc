/// Render graph node: one render pass with its attachments

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::renderer::{AttachmentDesc, ExtentClass, ImageLayout, LoadOp, RenderPass, RenderPassDesc, StoreOp, TextureFormat};
use super::attachment::Attachment;
use super::render_model::CategoryFlags;

slotmap::new_key_type! {
    /// Stable handle on a node of a `RenderGraph`
    pub struct NodeId;
}

/// One render pass of the graph
pub struct RenderNode {
    name: String,
    extent_class: ExtentClass,
    category_filter: CategoryFlags,
    pub(crate) attachments: Vec<Attachment>,
    /// Execution level; every incoming edge comes from a strictly lower level
    pub(crate) order: u32,
    pub(crate) use_swapchain_framebuffer: bool,
    pub(crate) render_pass: Option<Arc<dyn RenderPass>>,
}

impl RenderNode {
    pub(crate) fn new(name: &str, extent_class: ExtentClass, category_filter: CategoryFlags) -> Self {
        Self {
            name: name.to_string(),
            extent_class,
            category_filter,
            attachments: Vec::new(),
            order: 0,
            use_swapchain_framebuffer: false,
            render_pass: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extent_class(&self) -> ExtentClass {
        self.extent_class
    }

    /// Categories of render models drawn by this node
    pub fn category_filter(&self) -> CategoryFlags {
        self.category_filter
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn attachment_by_name(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// True when the node renders into the acquired swapchain image
    pub fn uses_swapchain_framebuffer(&self) -> bool {
        self.use_swapchain_framebuffer
    }

    /// Render pass, available once the graph is built
    pub fn render_pass(&self) -> Option<&Arc<dyn RenderPass>> {
        self.render_pass.as_ref()
    }

    /// Attachment indices in render pass order: colors as declared, then depth
    pub fn pass_attachment_order(&self, depth_format: TextureFormat) -> Result<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.attachments.len())
            .filter(|&i| self.attachments[i].format != depth_format)
            .collect();
        let depth: Vec<usize> = (0..self.attachments.len())
            .filter(|&i| self.attachments[i].format == depth_format)
            .collect();
        if depth.len() > 1 {
            return Err(Error::InvalidGraph(format!(
                "node '{}' declares {} depth attachments, at most one is allowed",
                self.name, depth.len()
            )));
        }
        order.extend(depth);
        Ok(order)
    }

    pub fn color_attachment_count(&self, depth_format: TextureFormat) -> u32 {
        self.attachments.iter().filter(|a| a.format != depth_format).count() as u32
    }

    /// Describe this node's render pass
    ///
    /// Attachments forwarded in from an earlier node are loaded, the rest are
    /// cleared. Everything is stored. A swapchain slot nobody reads afterwards
    /// ends in `PresentSrc`.
    pub fn render_pass_desc(&self, depth_format: TextureFormat) -> Result<RenderPassDesc> {
        let mut desc = RenderPassDesc {
            color_attachments: Vec::new(),
            depth_attachment: None,
        };

        for index in self.pass_attachment_order(depth_format)? {
            let attachment = &self.attachments[index];
            let is_depth = attachment.format == depth_format;
            let optimal = if is_depth {
                ImageLayout::DepthStencilAttachment
            } else {
                ImageLayout::ColorAttachment
            };

            let (load_op, initial_layout) = if attachment.forwarded_from.is_some() {
                (LoadOp::Load, optimal)
            } else {
                (LoadOp::Clear, ImageLayout::Undefined)
            };

            let final_layout = if attachment.is_swapchain && attachment.dependencies.is_empty() {
                ImageLayout::PresentSrc
            } else {
                optimal
            };

            let attachment_desc = AttachmentDesc {
                format: attachment.format,
                load_op,
                store_op: StoreOp::Store,
                initial_layout,
                final_layout,
            };

            if is_depth {
                desc.depth_attachment = Some(attachment_desc);
            } else {
                desc.color_attachments.push(attachment_desc);
            }
        }

        Ok(desc)
    }
}

impl std::fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderNode")
            .field("name", &self.name)
            .field("extent_class", &self.extent_class)
            .field("order", &self.order)
            .field("attachments", &self.attachments.len())
            .field("built", &self.render_pass.is_some())
            .finish()
    }
}
