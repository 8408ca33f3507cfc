//! Merge of per-stage reflected layouts into one pipeline layout
//!
//! Set indices are merged with emplace semantics: the first stage declaring an
//! index fixes its type, later stages may repeat it but not change it.

use std::collections::BTreeMap;
use crate::error::{Error, Result};
use crate::renderer::{DescriptorSetType, ShaderStage, ShaderStageFlags, ShaderStageLayout, TextureFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: TextureFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// Layout shared by every stage of a graphics pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLayoutInfo {
    set_types: BTreeMap<u32, DescriptorSetType>,
    vertex_bindings: Vec<VertexBinding>,
    vertex_attributes: Vec<VertexAttribute>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayoutInfo {
    /// Merge the vertex stage with the optional geometry and fragment stages
    ///
    /// # Errors
    ///
    /// `InvalidResource` when a layout is passed for the wrong stage, or when two
    /// stages declare different types for the same set index.
    pub fn merge(
        vertex: &ShaderStageLayout,
        geometry: Option<&ShaderStageLayout>,
        fragment: Option<&ShaderStageLayout>,
    ) -> Result<Self> {
        Self::expect_stage(vertex, ShaderStage::Vertex)?;
        if let Some(geometry) = geometry {
            Self::expect_stage(geometry, ShaderStage::Geometry)?;
        }
        if let Some(fragment) = fragment {
            Self::expect_stage(fragment, ShaderStage::Fragment)?;
        }

        let mut set_types = BTreeMap::new();
        for stage in std::iter::once(vertex).chain(geometry).chain(fragment) {
            for (&index, &set_type) in &stage.set_types {
                match set_types.get(&index) {
                    None => {
                        set_types.insert(index, set_type);
                    }
                    Some(&existing) if existing == set_type => {}
                    Some(&existing) => {
                        crate::engine_error!(
                            "rendergraph::PipelineLayout",
                            "Set {} is {} in an earlier stage but {} in the {:?} stage",
                            index, existing, set_type, stage.stage
                        );
                        return Err(Error::InvalidResource(format!(
                            "descriptor set {} declared as both {} and {}",
                            index, existing, set_type
                        )));
                    }
                }
            }
        }

        let mut vertex_bindings = Vec::with_capacity(vertex.vertex_bindings.len());
        let mut vertex_attributes = Vec::new();
        for (&binding, desc) in &vertex.vertex_bindings {
            vertex_bindings.push(VertexBinding {
                binding,
                stride: desc.stride,
                input_rate: VertexInputRate::Vertex,
            });
            for (&location, attribute) in &desc.attributes {
                vertex_attributes.push(VertexAttribute {
                    location,
                    binding,
                    format: attribute.format,
                    offset: attribute.offset,
                });
            }
        }

        let push_constant_ranges = Self::push_constant_ranges_for(vertex, geometry, fragment);

        crate::engine_trace!(
            "rendergraph::PipelineLayout",
            "Merged layout: {} sets, {} vertex bindings, {} push constant ranges",
            set_types.len(), vertex_bindings.len(), push_constant_ranges.len()
        );

        Ok(Self {
            set_types,
            vertex_bindings,
            vertex_attributes,
            push_constant_ranges,
        })
    }

    fn expect_stage(layout: &ShaderStageLayout, stage: ShaderStage) -> Result<()> {
        if layout.stage != stage {
            return Err(Error::InvalidResource(format!(
                "{:?} shader passed where a {:?} shader is expected",
                layout.stage, stage
            )));
        }
        Ok(())
    }

    // Vertex (and geometry) range first at offset 0, fragment range right after it.
    fn push_constant_ranges_for(
        vertex: &ShaderStageLayout,
        geometry: Option<&ShaderStageLayout>,
        fragment: Option<&ShaderStageLayout>,
    ) -> Vec<PushConstantRange> {
        let mut ranges = Vec::new();

        let geometry_size = geometry.map_or(0, |g| g.push_constant_size);
        let mut stages = ShaderStageFlags::empty();
        if vertex.push_constant_size > 0 {
            stages |= ShaderStageFlags::VERTEX;
        }
        if geometry_size > 0 {
            stages |= ShaderStageFlags::GEOMETRY;
        }
        let vertex_size = vertex.push_constant_size.max(geometry_size);
        if vertex_size > 0 {
            ranges.push(PushConstantRange { stages, offset: 0, size: vertex_size });
        }

        if let Some(fragment) = fragment.filter(|f| f.push_constant_size > 0) {
            ranges.push(PushConstantRange {
                stages: ShaderStageFlags::FRAGMENT,
                offset: vertex_size,
                size: fragment.push_constant_size,
            });
        }

        ranges
    }

    /// set index -> set type
    pub fn set_layouts(&self) -> &BTreeMap<u32, DescriptorSetType> {
        &self.set_types
    }

    pub fn vertex_bindings(&self) -> &[VertexBinding] {
        &self.vertex_bindings
    }

    pub fn vertex_attributes(&self) -> &[VertexAttribute] {
        &self.vertex_attributes
    }

    /// Number of vertex buffers a model must supply
    pub fn vertex_binding_count(&self) -> usize {
        self.vertex_bindings.len()
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }
}

#[cfg(test)]
#[path = "pipeline_layout_tests.rs"]
mod tests;
