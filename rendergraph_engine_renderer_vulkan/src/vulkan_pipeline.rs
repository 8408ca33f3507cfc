/// Pipeline - Vulkan graphics pipeline and its merged layout

use rendergraph_engine::rendergraph::render::{Pipeline as RendererPipeline, PipelineLayoutInfo};
use ash::vk;

pub struct Pipeline {
    pub(crate) pipeline: vk::Pipeline,
    /// Set layouts are owned by the renderer's registry, not by the pipeline
    pub(crate) pipeline_layout: vk::PipelineLayout,
    pub(crate) layout_info: PipelineLayoutInfo,
    pub(crate) device: ash::Device,
}

impl RendererPipeline for Pipeline {
    fn layout_info(&self) -> &PipelineLayoutInfo {
        &self.layout_info
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
