/// Framebuffer trait and descriptor

use std::sync::Arc;
use crate::renderer::{RenderPass, Texture, TextureFormat};

/// Framebuffer binding a node's attachment images to its render pass
pub trait Framebuffer: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Attachment formats, in render pass order
    fn formats(&self) -> &[TextureFormat];
}

/// Descriptor for creating a framebuffer
pub struct FramebufferDesc<'a> {
    pub render_pass: &'a Arc<dyn RenderPass>,
    /// Images in render pass attachment order
    pub attachments: Vec<Arc<dyn Texture>>,
    pub width: u32,
    pub height: u32,
}
