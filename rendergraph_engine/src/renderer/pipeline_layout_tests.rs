//! Unit tests for pipeline_layout.rs

use super::*;
use crate::renderer::{VertexAttributeDesc, VertexBindingDesc};

fn stage(stage: ShaderStage, sets: &[(u32, DescriptorSetType)]) -> ShaderStageLayout {
    let mut layout = ShaderStageLayout::new(stage);
    layout.set_types = sets.iter().copied().collect();
    layout
}

fn with_vertex_input(mut layout: ShaderStageLayout, location: u32, format: TextureFormat) -> ShaderStageLayout {
    let mut attributes = BTreeMap::new();
    attributes.insert(location, VertexAttributeDesc { format, offset: 0 });
    layout.vertex_bindings.insert(location, VertexBindingDesc {
        stride: format.size_in_bytes(),
        attributes,
    });
    layout
}

// ============================================================================
// SET MERGE
// ============================================================================

#[test]
fn test_merge_unions_set_indices_across_stages() {
    let vertex = stage(ShaderStage::Vertex, &[(0, DescriptorSetType::CAMERA), (1, DescriptorSetType::MODEL_MATRIX)]);
    let fragment = stage(ShaderStage::Fragment, &[(0, DescriptorSetType::CAMERA), (2, DescriptorSetType::MATERIAL)]);

    let info = PipelineLayoutInfo::merge(&vertex, None, Some(&fragment)).unwrap();

    let sets: Vec<_> = info.set_layouts().iter().map(|(i, t)| (*i, *t)).collect();
    assert_eq!(sets, vec![
        (0, DescriptorSetType::CAMERA),
        (1, DescriptorSetType::MODEL_MATRIX),
        (2, DescriptorSetType::MATERIAL),
    ]);
}

#[test]
fn test_merge_conflicting_set_type_is_invalid_resource() {
    let vertex = stage(ShaderStage::Vertex, &[(1, DescriptorSetType::MODEL_MATRIX)]);
    let fragment = stage(ShaderStage::Fragment, &[(1, DescriptorSetType::MATERIAL)]);

    match PipelineLayoutInfo::merge(&vertex, None, Some(&fragment)) {
        Err(Error::InvalidResource(msg)) => assert!(msg.contains("descriptor set 1")),
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}

#[test]
fn test_merge_geometry_stage_participates() {
    let vertex = stage(ShaderStage::Vertex, &[]);
    let geometry = stage(ShaderStage::Geometry, &[(3, DescriptorSetType::SHADOW_MAP)]);

    let info = PipelineLayoutInfo::merge(&vertex, Some(&geometry), None).unwrap();
    assert_eq!(info.set_layouts().get(&3), Some(&DescriptorSetType::SHADOW_MAP));
}

#[test]
fn test_merge_rejects_layout_in_wrong_slot() {
    let fragment = stage(ShaderStage::Fragment, &[]);
    assert!(matches!(
        PipelineLayoutInfo::merge(&fragment, None, None),
        Err(Error::InvalidResource(_))
    ));
}

// ============================================================================
// VERTEX INPUT
// ============================================================================

#[test]
fn test_vertex_bindings_follow_vertex_stage() {
    let vertex = with_vertex_input(stage(ShaderStage::Vertex, &[]), 0, TextureFormat::R32G32B32_SFLOAT);
    let vertex = with_vertex_input(vertex, 1, TextureFormat::R32G32_SFLOAT);

    let info = PipelineLayoutInfo::merge(&vertex, None, None).unwrap();

    assert_eq!(info.vertex_binding_count(), 2);
    assert_eq!(info.vertex_bindings()[0], VertexBinding { binding: 0, stride: 12, input_rate: VertexInputRate::Vertex });
    assert_eq!(info.vertex_bindings()[1].stride, 8);
    assert_eq!(info.vertex_attributes()[1], VertexAttribute {
        location: 1,
        binding: 1,
        format: TextureFormat::R32G32_SFLOAT,
        offset: 0,
    });
}

#[test]
fn test_no_vertex_inputs_means_zero_bindings() {
    let vertex = stage(ShaderStage::Vertex, &[]);
    let info = PipelineLayoutInfo::merge(&vertex, None, None).unwrap();
    assert_eq!(info.vertex_binding_count(), 0);
    assert!(info.vertex_attributes().is_empty());
}

// ============================================================================
// PUSH CONSTANTS
// ============================================================================

#[test]
fn test_push_constant_fragment_range_follows_vertex_range() {
    let mut vertex = stage(ShaderStage::Vertex, &[]);
    vertex.push_constant_size = 64;
    let mut fragment = stage(ShaderStage::Fragment, &[]);
    fragment.push_constant_size = 16;

    let info = PipelineLayoutInfo::merge(&vertex, None, Some(&fragment)).unwrap();
    assert_eq!(info.push_constant_ranges(), &[
        PushConstantRange { stages: ShaderStageFlags::VERTEX, offset: 0, size: 64 },
        PushConstantRange { stages: ShaderStageFlags::FRAGMENT, offset: 64, size: 16 },
    ]);
}

#[test]
fn test_no_push_constants_means_no_ranges() {
    let vertex = stage(ShaderStage::Vertex, &[]);
    let fragment = stage(ShaderStage::Fragment, &[]);
    let info = PipelineLayoutInfo::merge(&vertex, None, Some(&fragment)).unwrap();
    assert!(info.push_constant_ranges().is_empty());
}
