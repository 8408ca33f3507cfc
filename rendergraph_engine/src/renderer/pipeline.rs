/// Graphics pipeline trait, fixed-function parameters and descriptor

use std::sync::Arc;
use bitflags::bitflags;
use crate::renderer::{Extent2D, PipelineLayoutInfo, RenderPass, Shader};

bitflags! {
    /// Fixed-function switches applied on top of the default triangle pipeline
    ///
    /// Defaults: triangle list, back-face culling, counter-clockwise front face,
    /// depth test LESS with depth write, alpha blending on every color attachment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineParams: u32 {
        const LINE_TOPOLOGY = 1 << 0;
        /// Point list, rasterized with line width 10
        const POINT_TOPOLOGY = 1 << 1;
        /// Constant factor 10, clamp 0, slope factor 1
        const DEPTH_BIAS = 1 << 2;
        const DISABLE_DEPTH_TEST = 1 << 3;
    }
}

/// Descriptor for creating a graphics pipeline bound to one node's render pass
pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: &'a Arc<dyn Shader>,
    pub geometry_shader: Option<&'a Arc<dyn Shader>>,
    /// `None` turns rasterizer discard on
    pub fragment_shader: Option<&'a Arc<dyn Shader>>,
    pub render_pass: &'a Arc<dyn RenderPass>,
    /// One blend attachment is emitted per color attachment
    pub color_attachment_count: u32,
    /// Initial viewport; viewport and scissor are dynamic state
    pub extent: Extent2D,
    pub params: PipelineParams,
}

impl GraphicsPipelineDesc<'_> {
    /// Merge the layouts of the supplied stages
    pub fn layout_info(&self) -> crate::error::Result<PipelineLayoutInfo> {
        PipelineLayoutInfo::merge(
            self.vertex_shader.layout(),
            self.geometry_shader.map(|s| s.layout()),
            self.fragment_shader.map(|s| s.layout()),
        )
    }
}

/// Graphics pipeline trait
pub trait Pipeline: Send + Sync {
    fn layout_info(&self) -> &PipelineLayoutInfo;
}
