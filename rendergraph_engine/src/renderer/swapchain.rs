/// Swapchain trait - window presentation

use std::sync::Arc;
use crate::error::Result;
use crate::renderer::{Extent2D, Texture, TextureFormat};

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image(u32),
    /// The surface changed; the swapchain must be rebuilt before rendering
    OutOfDate,
}

/// Result of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented or dropped, either way the swapchain must be rebuilt
    OutOfDate,
}

/// Presentation surface images
///
/// Per-frame acquire/present semaphores live here; the renderer signals and
/// waits on them in `Renderer::submit`.
pub trait Swapchain: Send + Sync {
    /// Acquire the next image for frame slot `frame_index`
    fn acquire_next_image(&mut self, frame_index: usize) -> Result<AcquireOutcome>;

    /// Present `image_index` once frame slot `frame_index` has finished rendering
    fn present(&mut self, frame_index: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Rebuild for the new surface size. Caller must have waited for the device to idle.
    fn recreate(&mut self, width: u32, height: u32) -> Result<()>;

    fn extent(&self) -> Extent2D;

    fn format(&self) -> TextureFormat;

    /// Swapchain images, indexed by the value returned from `acquire_next_image`
    fn images(&self) -> &[Arc<dyn Texture>];
}
