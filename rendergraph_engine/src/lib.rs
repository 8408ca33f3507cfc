/*!
# Render Graph Engine

Render-graph compiler and frame executor.

Rendering passes are declared as nodes with named attachments and forwarding
edges. The GPU images, framebuffers and descriptor sets those edges imply are
created automatically, an execution order is computed, and that order is
replayed every frame into a command list with the barriers it needs.

## Architecture

- **RenderGraph**: node/attachment declaration, ordering, render passes
- **RenderGraphHandler**: resource materialization and per-frame replay
- **FrameLoop**: frame pacing, presentation, swapchain rebuilds
- **Renderer**: backend factory trait (see `rendergraph_engine_renderer_vulkan`)
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod renderer;
pub mod render_graph;
pub mod frame;

// Main rendergraph namespace module
pub mod rendergraph {
    pub use crate::error::{Error, Result};

    pub use crate::engine::Engine;

    pub use crate::renderer::Renderer;

    // Logging sub-module (types only; the engine_* macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // GPU-facing traits and descriptors
    pub mod render {
        pub use crate::renderer::*;
    }

    pub mod graph {
        pub use crate::render_graph::*;
    }

    pub mod frame {
        pub use crate::frame::*;
    }
}

// Re-export math library at crate root
pub use glam;
