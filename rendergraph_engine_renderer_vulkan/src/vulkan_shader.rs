/// Shader - Vulkan shader module with its spirq-reflected stage layout

use rendergraph_engine::rendergraph::{Result, Error};
use rendergraph_engine::rendergraph::render::{
    DescriptorSetType, Shader as RendererShader, ShaderStage, ShaderStageLayout,
    VertexAttributeDesc, VertexBindingDesc,
};
use rendergraph_engine::{engine_err, engine_error, engine_warn};
use ash::vk;
use std::collections::BTreeMap;
use std::ffi::CString;

use crate::vulkan_format::float_vertex_format;

pub struct Shader {
    pub(crate) module: vk::ShaderModule,
    pub(crate) stage: vk::ShaderStageFlags,
    pub(crate) entry_point: CString,
    pub(crate) layout: ShaderStageLayout,
    pub(crate) device: ash::Device,
}

impl RendererShader for Shader {
    fn layout(&self) -> &ShaderStageLayout {
        &self.layout
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn invalid_shader(message: String) -> Error {
    engine_error!("rendergraph::vulkan", "{}", message);
    Error::InvalidResource(message)
}

/// Reflect one SPIR-V module into a stage layout
///
/// Every descriptor set index the module uses must have an entry in
/// `set_types`, and every such type must be registered (`is_registered`).
/// Vertex inputs become one tightly packed binding per location, in location
/// order.
pub(crate) fn reflect_stage_layout(
    code: &[u32],
    stage: ShaderStage,
    entry_point: &str,
    set_types: &BTreeMap<u32, DescriptorSetType>,
    is_registered: impl Fn(DescriptorSetType) -> bool,
) -> Result<ShaderStageLayout> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!("rendergraph::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    let entry = entry_points
        .iter()
        .find(|ep| ep.name == entry_point)
        .ok_or_else(|| invalid_shader(format!("entry point '{}' not found in module", entry_point)))?;

    let mut layout = ShaderStageLayout::new(stage);
    // location -> attribute format
    let mut inputs = BTreeMap::new();

    for var in &entry.vars {
        match var {
            spirq::var::Variable::Descriptor { desc_bind, .. } => {
                let set = desc_bind.set();
                let set_type = *set_types.get(&set).ok_or_else(|| {
                    invalid_shader(format!("{:?} shader uses descriptor set {} without a declared type", stage, set))
                })?;
                if !is_registered(set_type) {
                    return Err(invalid_shader(format!(
                        "descriptor set type {} (set {}) has no registered layout", set_type, set
                    )));
                }
                layout.set_types.insert(set, set_type);
            }
            spirq::var::Variable::PushConstant { ty, .. } => {
                let size = ty.nbyte().unwrap_or(0) as u32;
                layout.push_constant_size = layout.push_constant_size.max(size);
            }
            spirq::var::Variable::Input { location, ty, .. } if stage == ShaderStage::Vertex => {
                let format = vertex_input_format(ty).ok_or_else(|| {
                    invalid_shader(format!("unsupported vertex input type at location {}: {:?}", location.loc(), ty))
                })?;
                inputs.insert(location.loc(), format);
            }
            _ => {}
        }
    }

    for (set, set_type) in set_types {
        if !layout.set_types.contains_key(set) {
            engine_warn!("rendergraph::vulkan",
                "{:?} shader declares set {} ({}) but never uses it", stage, set, set_type);
        }
    }

    for (binding, (location, format)) in inputs.into_iter().enumerate() {
        let mut attributes = BTreeMap::new();
        attributes.insert(location, VertexAttributeDesc { format, offset: 0 });
        layout.vertex_bindings.insert(binding as u32, VertexBindingDesc {
            stride: format.size_in_bytes(),
            attributes,
        });
    }

    Ok(layout)
}

fn vertex_input_format(ty: &spirq::ty::Type) -> Option<rendergraph_engine::rendergraph::render::TextureFormat> {
    use spirq::ty::{ScalarType, Type};
    match ty {
        Type::Scalar(ScalarType::Float { bits: 32 }) => float_vertex_format(1),
        Type::Vector(vector) if matches!(vector.scalar_ty, ScalarType::Float { bits: 32 }) => {
            float_vertex_format(vector.nscalar)
        }
        _ => None,
    }
}
