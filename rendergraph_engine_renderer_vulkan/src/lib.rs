/*!
# Render Graph Engine - Vulkan Renderer Backend

Vulkan implementation of the `rendergraph_engine` renderer traits, built on
`ash` for the Vulkan bindings, `gpu-allocator` for memory and `spirq` for
shader reflection.

```no_run
use rendergraph_engine::rendergraph::render::Config;
use rendergraph_engine_renderer_vulkan::VulkanRenderer;
# fn run(window: &winit::window::Window) -> rendergraph_engine::rendergraph::Result<()> {
let renderer = VulkanRenderer::new(window, Config::default())?;
# Ok(())
# }
```
*/

mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod vulkan_texture;
mod vulkan_buffer;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_render_pass;
mod vulkan_frame_buffer;
mod vulkan_descriptor_set;
mod vulkan_sampler;
mod vulkan_command_list;
mod vulkan_swapchain;
mod debug;

pub use vulkan::VulkanRenderer;
pub use vulkan_swapchain::Swapchain as VulkanSwapchain;
pub use vulkan_command_list::CommandList as VulkanCommandList;

// Validation statistics (counted when `Config::enable_validation_stats` is set)
pub use debug::{get_validation_stats, print_validation_stats_report};
