//! Render graph module
//!
//! Declaration (`RenderGraph`, `RenderNode`, `Attachment`), materialization and
//! per-frame replay (`RenderGraphHandler`), and descriptor set bind coalescing.

mod attachment;
mod descriptor_binding;
mod render_graph;
mod render_graph_handler;
mod render_model;
mod render_node;

pub use attachment::{Attachment, AttachmentRef, Dependency, ForwardMode, SWAPCHAIN_ATTACHMENT_NAME};
pub use descriptor_binding::{bind_descriptor_sets, coalesce_bind_ranges, BindRange};
pub use render_graph::{NodeBuilder, RenderGraph};
pub use render_graph_handler::{AttachmentImage, FrameStats, RenderGraphHandler, SwapchainFramebuffer};
pub use render_model::{CategoryFlags, RenderModel};
pub use render_node::{NodeId, RenderNode};
