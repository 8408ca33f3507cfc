/// Attachments and forwarding edges between render graph nodes

use crate::renderer::{DescriptorSetType, TextureFormat};
use super::render_node::NodeId;

/// Name of the slot standing for the acquired swapchain image
pub const SWAPCHAIN_ATTACHMENT_NAME: &str = "swapchain";

/// Handle on one attachment: owning node plus declaration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentRef {
    pub node: NodeId,
    pub index: usize,
}

/// How a forwarded attachment is consumed by the destination node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardMode {
    /// Same image, attached again to the destination's framebuffer and loaded
    AsFramebufferAttachment,
    /// Read through a combined image sampler at `binding` of a `set_type` set
    AsSampledDescriptor {
        set_type: DescriptorSetType,
        binding: u32,
    },
}

/// Forwarding edge from an attachment to a later node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub from: AttachmentRef,
    pub to_node: NodeId,
    pub mode: ForwardMode,
}

impl Dependency {
    pub fn is_sampled(&self) -> bool {
        matches!(self.mode, ForwardMode::AsSampledDescriptor { .. })
    }
}

/// Named, typed output slot of a node
///
/// Two attachments with the same name are the same GPU image, whichever
/// node declared them.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub format: TextureFormat,
    pub is_swapchain: bool,
    pub node: NodeId,
    /// Set when the attachment was created by `forward_as_attachment`
    pub forwarded_from: Option<AttachmentRef>,
    /// Outgoing edges, in declaration order
    pub dependencies: Vec<Dependency>,
}

impl Attachment {
    pub(crate) fn new(name: &str, format: TextureFormat, is_swapchain: bool, node: NodeId) -> Self {
        Self {
            name: name.to_string(),
            format,
            is_swapchain,
            node,
            forwarded_from: None,
            dependencies: Vec::new(),
        }
    }

    pub fn has_sampled_dependency(&self) -> bool {
        self.dependencies.iter().any(Dependency::is_sampled)
    }
}
