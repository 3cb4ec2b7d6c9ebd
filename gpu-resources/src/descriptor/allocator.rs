//! Pool-backed allocation of descriptor sets for one layout.

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;

use crate::backend::{DescriptorPoolDesc, GpuDevice, LayoutBinding};
use crate::config::CacheConfig;
use crate::error::GpuError;

use super::layout::{DescriptorSetLayout, is_buffer_type};
use super::set::{
    BoundBuffer, BoundBufferArray, BoundImage, BoundImageArray, DescriptorSetParam, UNUSED_BINDING,
};

#[derive(Debug, Clone, Copy)]
struct Pool {
    handle: vk::DescriptorPool,
    allocated: u32,
}

/// Allocates descriptor sets of one layout from a growing list of pools.
///
/// Released sets go to a free list and are handed out again before any pool
/// is touched. The allocator never frees individual sets back to a pool.
pub struct DescriptorSetAllocator {
    device: Arc<dyn GpuDevice>,
    layout: vk::DescriptorSetLayout,
    layout_hash: u64,
    set: u32,
    bindings: Vec<LayoutBinding>,
    pool_flags: vk::DescriptorPoolCreateFlags,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets_per_pool: u32,
    variable_count: Option<u32>,
    pools: Vec<Pool>,
    current_pool: usize,
    free: Vec<vk::DescriptorSet>,
}

impl DescriptorSetAllocator {
    /// Prepare an allocator for `layout`. No pool is created until the first allocation.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        layout: &DescriptorSetLayout,
        config: &CacheConfig,
    ) -> Self {
        let mut counts: BTreeMap<i32, u32> = BTreeMap::new();
        for binding in layout.bindings() {
            *counts.entry(binding.descriptor_type.as_raw()).or_default() +=
                binding.descriptor_count;
        }
        let pool_sizes = counts
            .into_iter()
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: vk::DescriptorType::from_raw(ty),
                descriptor_count: count * config.max_sets_per_pool,
            })
            .collect();

        let variable_count = layout
            .bindings()
            .iter()
            .any(|b| {
                b.binding_flags
                    .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
            })
            .then_some(config.variable_descriptor_count);

        Self {
            device,
            layout: layout.handle(),
            layout_hash: layout.hash(),
            set: layout.set(),
            bindings: layout.bindings().to_vec(),
            pool_flags: layout.pool_flags(),
            pool_sizes,
            max_sets_per_pool: config.max_sets_per_pool,
            variable_count,
            pools: Vec::new(),
            current_pool: 0,
            free: Vec::new(),
        }
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn set(&self) -> u32 {
        self.set
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    /// Pool sizes each new pool is created with.
    pub fn pool_sizes(&self) -> &[vk::DescriptorPoolSize] {
        &self.pool_sizes
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Hand out a set: a released one if available, else a fresh one from a pool.
    pub fn allocate(&mut self) -> Result<vk::DescriptorSet, GpuError> {
        if let Some(set) = self.free.pop() {
            return Ok(set);
        }
        let index = self.find_pool()?;
        let set = self.device.allocate_descriptor_set(
            self.pools[index].handle,
            self.layout,
            self.variable_count,
        )?;
        self.pools[index].allocated += 1;
        Ok(set)
    }

    /// Return `set` for reuse. Only call once nothing pending references it.
    pub fn release(&mut self, set: vk::DescriptorSet) {
        self.free.push(set);
    }

    /// Reset every pool and forget released sets.
    pub fn reset(&mut self) -> Result<(), GpuError> {
        for pool in &mut self.pools {
            self.device.reset_descriptor_pool(pool.handle)?;
            pool.allocated = 0;
        }
        self.current_pool = 0;
        self.free.clear();
        Ok(())
    }

    /// Size `param` for this layout: one slot per binding up to the largest,
    /// each array as long as the binding's descriptor count.
    pub fn fill_empty_param(&self, param: &mut DescriptorSetParam) {
        param.layout = self.layout;
        param.layout_hash = self.layout_hash;
        param.set = self.set;

        let slots = self
            .bindings
            .iter()
            .map(|b| b.binding as usize + 1)
            .max()
            .unwrap_or(0);
        param.buffer_infos = (0..slots)
            .map(|_| BoundBufferArray {
                binding: UNUSED_BINDING,
                buffers: Vec::new(),
            })
            .collect();
        param.image_infos = (0..slots)
            .map(|_| BoundImageArray {
                binding: UNUSED_BINDING,
                images: Vec::new(),
            })
            .collect();

        for binding in &self.bindings {
            let count = match self.variable_count {
                Some(count)
                    if binding
                        .binding_flags
                        .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT) =>
                {
                    count
                }
                _ => binding.descriptor_count,
            } as usize;
            let slot = binding.binding as usize;
            if is_buffer_type(binding.descriptor_type) {
                param.buffer_infos[slot] = BoundBufferArray {
                    binding: binding.binding,
                    buffers: vec![BoundBuffer::EMPTY; count],
                };
            } else {
                param.image_infos[slot] = BoundImageArray {
                    binding: binding.binding,
                    images: vec![BoundImage::EMPTY; count],
                };
            }
        }
    }

    /// Destroy every pool; sets allocated from them become invalid.
    pub fn destroy(&mut self) {
        for pool in self.pools.drain(..) {
            self.device.destroy_descriptor_pool(pool.handle);
        }
        self.current_pool = 0;
        self.free.clear();
    }

    fn find_pool(&mut self) -> Result<usize, GpuError> {
        if self.max_sets_per_pool == 0 {
            return Err(GpuError::InvalidParameter(
                "descriptor pools must hold at least one set".to_string(),
            ));
        }
        loop {
            if self.current_pool >= self.pools.len() {
                let handle = self.device.create_descriptor_pool(&DescriptorPoolDesc {
                    flags: self.pool_flags,
                    max_sets: self.max_sets_per_pool,
                    pool_sizes: &self.pool_sizes,
                })?;
                log::debug!(
                    "Opened descriptor pool {} for set {}",
                    self.pools.len(),
                    self.set
                );
                self.pools.push(Pool {
                    handle,
                    allocated: 0,
                });
                self.current_pool = self.pools.len() - 1;
            }
            if self.pools[self.current_pool].allocated < self.max_sets_per_pool {
                return Ok(self.current_pool);
            }
            self.current_pool += 1;
        }
    }
}

impl Drop for DescriptorSetAllocator {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for DescriptorSetAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetAllocator")
            .field("layout", &self.layout)
            .field("set", &self.set)
            .field("pools", &self.pools.len())
            .field("free", &self.free.len())
            .finish()
    }
}
