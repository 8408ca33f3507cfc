/// DescriptorSet - Vulkan implementation of the DescriptorSet trait
///
/// Sets return to their pool when the last `Arc` drops, so graph sets
/// replaced by a swapchain rebuild do not accumulate.

use rendergraph_engine::rendergraph::Result;
use rendergraph_engine::rendergraph::render::{DescriptorSet as RendererDescriptorSet, DescriptorSetType};
use rendergraph_engine::engine_err;
use ash::vk;
use std::sync::{Arc, Mutex};

/// Sets per pool
pub(crate) const POOL_MAX_SETS: u32 = 1024;

/// Fixed-capacity pool whose sets can be freed individually
pub struct DescriptorPool {
    pub(crate) pool: vk::DescriptorPool,
    /// Allocation and free on one pool must not race
    access: Mutex<()>,
    device: ash::Device,
}

impl DescriptorPool {
    pub(crate) fn new(device: &ash::Device) -> Result<Arc<Self>> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2 * POOL_MAX_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: POOL_MAX_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: POOL_MAX_SETS,
            },
        ];
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(POOL_MAX_SETS);

        let pool = unsafe {
            device.create_descriptor_pool(&info, None)
                .map_err(|e| engine_err!("rendergraph::vulkan", "Failed to create descriptor pool: {:?}", e))?
        };
        Ok(Arc::new(Self { pool, access: Mutex::new(()), device: device.clone() }))
    }

    /// Allocate one set; pool exhaustion comes back as the raw `vk::Result`
    pub(crate) fn allocate(
        self: &Arc<Self>,
        layout: vk::DescriptorSetLayout,
        set_type: DescriptorSetType,
    ) -> std::result::Result<DescriptorSet, vk::Result> {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let _access = self.access.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info)? };
        let descriptor_set = sets.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)?;
        Ok(DescriptorSet { descriptor_set, set_type, pool: Arc::clone(self) })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

pub struct DescriptorSet {
    pub(crate) descriptor_set: vk::DescriptorSet,
    pub(crate) set_type: DescriptorSetType,
    pool: Arc<DescriptorPool>,
}

impl RendererDescriptorSet for DescriptorSet {
    fn set_type(&self) -> DescriptorSetType {
        self.set_type
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        let _access = self.pool.access.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        unsafe {
            self.pool.device.free_descriptor_sets(self.pool.pool, &[self.descriptor_set]).ok();
        }
    }
}
