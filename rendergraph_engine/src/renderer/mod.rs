/// Renderer module - backend-agnostic GPU traits and descriptors

pub mod texture;
pub mod buffer;
pub mod render_pass;
pub mod framebuffer;
pub mod descriptor_set;
pub mod shader;
pub mod pipeline_layout;
pub mod pipeline;
pub mod command_list;
pub mod swapchain;
pub mod config;
pub mod renderer;

pub use texture::*;
pub use buffer::*;
pub use render_pass::*;
pub use framebuffer::*;
pub use descriptor_set::*;
pub use shader::*;
pub use pipeline_layout::*;
pub use pipeline::*;
pub use command_list::*;
pub use swapchain::*;
pub use config::*;
pub use renderer::*;

// Mock renderer for tests (no GPU required)
#[cfg(test)]
pub mod mock_renderer;
