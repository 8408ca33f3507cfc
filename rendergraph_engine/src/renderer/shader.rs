/// Shader trait, shader descriptor and per-stage reflected layout

use std::collections::BTreeMap;
use bitflags::bitflags;
use crate::renderer::{DescriptorSetType, TextureFormat};

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

bitflags! {
    /// Set of shader stages (descriptor visibility, push constant ranges)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const GEOMETRY = 1 << 1;
        const FRAGMENT = 1 << 2;
    }
}

impl From<ShaderStage> for ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Descriptor for creating a shader module
#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    /// SPIR-V bytecode
    pub code: &'a [u8],
    pub stage: ShaderStage,
    pub entry_point: String,
    /// Semantic type of every descriptor set index the module declares
    pub set_types: BTreeMap<u32, DescriptorSetType>,
}

/// One vertex attribute inside a vertex binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDesc {
    pub format: TextureFormat,
    /// Byte offset inside one vertex of the binding
    pub offset: u32,
}

/// One vertex buffer binding as declared by the vertex stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBindingDesc {
    pub stride: u32,
    /// location -> attribute
    pub attributes: BTreeMap<u32, VertexAttributeDesc>,
}

/// Reflected interface of one shader stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageLayout {
    pub stage: ShaderStage,
    /// set index -> set type
    pub set_types: BTreeMap<u32, DescriptorSetType>,
    /// binding index -> vertex binding (vertex stage only)
    pub vertex_bindings: BTreeMap<u32, VertexBindingDesc>,
    /// Size of the push constant block, 0 if none
    pub push_constant_size: u32,
}

impl ShaderStageLayout {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            set_types: BTreeMap::new(),
            vertex_bindings: BTreeMap::new(),
            push_constant_size: 0,
        }
    }
}

/// Shader module trait
pub trait Shader: Send + Sync {
    fn layout(&self) -> &ShaderStageLayout;
}
