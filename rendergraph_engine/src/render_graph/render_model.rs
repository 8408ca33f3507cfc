/// Per-frame draw items handed to the graph executor

use std::sync::Arc;
use bitflags::bitflags;
use crate::renderer::{Buffer, DescriptorSet, DescriptorSetHolder, Pipeline};

bitflags! {
    /// Render model categories; each node draws the models whose category it accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CategoryFlags: u32 {
        /// Scene geometry
        const RENDER_MODEL = 1 << 0;
        /// 2D interface shapes
        const UI_SHAPE = 1 << 1;
        /// Full-screen quads (lighting resolve, post effects)
        const VIEWPORT = 1 << 2;
    }
}

/// One draw: pipeline, descriptor sets, vertex input, vertex/index count
#[derive(Clone)]
pub struct RenderModel {
    /// Exactly one category bit
    pub category: CategoryFlags,
    pub pipeline: Arc<dyn Pipeline>,
    /// Vertex count, or index count when `index_buffer` is set
    pub vertex_count: u32,
    pub descriptor_sets: DescriptorSetHolder,
    /// One buffer per pipeline vertex binding
    pub vertex_buffers: Vec<Arc<dyn Buffer>>,
    pub vertex_buffer_offsets: Vec<u64>,
    /// 16-bit index buffer and byte offset
    pub index_buffer: Option<(Arc<dyn Buffer>, u64)>,
}

impl RenderModel {
    pub fn new(category: CategoryFlags, pipeline: Arc<dyn Pipeline>, vertex_count: u32) -> Self {
        Self {
            category,
            pipeline,
            vertex_count,
            descriptor_sets: DescriptorSetHolder::new(),
            vertex_buffers: Vec::new(),
            vertex_buffer_offsets: Vec::new(),
            index_buffer: None,
        }
    }

    pub fn with_descriptor_set(mut self, set: Arc<dyn DescriptorSet>) -> Self {
        self.descriptor_sets.insert(set.set_type(), set);
        self
    }

    pub fn with_vertex_buffer(mut self, buffer: Arc<dyn Buffer>, offset: u64) -> Self {
        self.vertex_buffers.push(buffer);
        self.vertex_buffer_offsets.push(offset);
        self
    }

    pub fn with_index_buffer(mut self, buffer: Arc<dyn Buffer>, offset: u64) -> Self {
        self.index_buffer = Some((buffer, offset));
        self
    }
}
