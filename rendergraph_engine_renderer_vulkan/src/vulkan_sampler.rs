/// SamplerCache - VkSampler objects created on first use
///
/// Graph nodes only sample their inputs with one sampler kind, so the cache
/// stays tiny.

use rendergraph_engine::rendergraph::Result;
use rendergraph_engine::engine_err;
use crate::vulkan_context::GpuContext;
use ash::vk;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Filter and addressing mode of a cached sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SamplerKey {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
}

impl SamplerKey {
    /// Sampler used for attachments read by later nodes
    pub(crate) const NODE_INPUT: Self = Self {
        filter: vk::Filter::NEAREST,
        address_mode: vk::SamplerAddressMode::REPEAT,
    };
}

pub(crate) struct SamplerCache {
    ctx: Option<Arc<GpuContext>>,
    cache: FxHashMap<SamplerKey, vk::Sampler>,
}

impl SamplerCache {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx: Some(ctx),
            cache: FxHashMap::default(),
        }
    }

    /// Get or create the sampler for `key`
    pub(crate) fn get(&mut self, key: SamplerKey) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&key) {
            return Ok(sampler);
        }

        let ctx = self.ctx.as_ref()
            .ok_or_else(|| engine_err!("rendergraph::vulkan", "Sampler requested after renderer shutdown"))?;

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(key.filter)
            .min_filter(key.filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(key.address_mode)
            .address_mode_v(key.address_mode)
            .address_mode_w(key.address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe {
            ctx.device.create_sampler(&create_info, None)
                .map_err(|e| engine_err!("rendergraph::vulkan", "Failed to create sampler {:?}: {:?}", key, e))?
        };
        self.cache.insert(key, sampler);
        Ok(sampler)
    }

    /// Destroy every cached sampler and release the context
    ///
    /// Called from `VulkanRenderer::drop` while the device is still alive.
    pub(crate) fn shutdown(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            for (_, sampler) in self.cache.drain() {
                unsafe { ctx.device.destroy_sampler(sampler, None); }
            }
        }
    }
}

impl Drop for SamplerCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
