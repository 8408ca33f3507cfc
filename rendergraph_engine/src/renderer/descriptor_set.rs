/// Descriptor set types, layouts and the allocator seam

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use crate::error::Result;
use crate::renderer::{ImageLayout, ShaderStageFlags, Texture};

/// Semantic kind of a descriptor set (camera, material, shadow map, ...)
///
/// Pipelines map set indices to types; holders map types to sets. The same
/// type can sit at different indices in different pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescriptorSetType(pub u32);

impl DescriptorSetType {
    pub const CAMERA: Self = Self(0);
    pub const LIGHTS: Self = Self(1);
    pub const MATERIAL: Self = Self(2);
    pub const MODEL_MATRIX: Self = Self(3);
    pub const SKELETON: Self = Self(4);
    pub const SHADOW_MAP: Self = Self(5);
    /// Scene color sampled by post-process passes
    pub const COLOR_INPUT: Self = Self(6);
}

impl fmt::Display for DescriptorSetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::CAMERA => write!(f, "Camera"),
            Self::LIGHTS => write!(f, "Lights"),
            Self::MATERIAL => write!(f, "Material"),
            Self::MODEL_MATRIX => write!(f, "ModelMatrix"),
            Self::SKELETON => write!(f, "Skeleton"),
            Self::SHADOW_MAP => write!(f, "ShadowMap"),
            Self::COLOR_INPUT => write!(f, "ColorInput"),
            Self(other) => write!(f, "Custom({})", other),
        }
    }
}

/// Allocated descriptor set
pub trait DescriptorSet: Send + Sync {
    fn set_type(&self) -> DescriptorSetType;
}

/// Sets keyed by type, looked up against a pipeline's index-to-type map when binding
pub type DescriptorSetHolder = BTreeMap<DescriptorSetType, Arc<dyn DescriptorSet>>;

/// Descriptor kinds supported by set layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
}

/// One binding of a set layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorBindingDesc {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Layout registered for a set type before shaders referencing it are created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetLayoutDesc {
    pub set_type: DescriptorSetType,
    pub bindings: Vec<DescriptorBindingDesc>,
}

/// One combined image+sampler write
#[derive(Clone)]
pub struct SampledImageWrite {
    pub binding: u32,
    pub texture: Arc<dyn Texture>,
    /// Layout the image is in when the shader reads it
    pub layout: ImageLayout,
}

/// Hands out fresh descriptor sets of a registered type
pub trait DescriptorAllocator: Send + Sync {
    fn free_descriptor_set(&self, set_type: DescriptorSetType) -> Result<Arc<dyn DescriptorSet>>;
}
