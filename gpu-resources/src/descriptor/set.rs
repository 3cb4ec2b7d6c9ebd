//! Descriptor set parameters and cached descriptor sets.

use ash::vk;

use crate::backend::{DescriptorWrite, DeviceLimits, GpuDevice, LayoutBinding, WriteResource};
use crate::error::GpuError;

/// Binding value of a requirement slot the layout does not use.
pub const UNUSED_BINDING: u32 = u32::MAX;

/// Most writes one descriptor set can track.
pub const MAX_WRITES_PER_SET: usize = u64::BITS as usize;

/// One buffer bound to an array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundBuffer {
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub range: u64,
    pub dst_array_idx: u32,
}

impl BoundBuffer {
    pub const EMPTY: Self = Self {
        buffer: vk::Buffer::null(),
        offset: 0,
        range: 0,
        dst_array_idx: 0,
    };
}

/// One image (and/or sampler) bound to an array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundImage {
    pub sampler: vk::Sampler,
    pub image_view: vk::ImageView,
    pub image_layout: vk::ImageLayout,
    pub dst_array_idx: u32,
}

impl BoundImage {
    pub const EMPTY: Self = Self {
        sampler: vk::Sampler::null(),
        image_view: vk::ImageView::null(),
        image_layout: vk::ImageLayout::UNDEFINED,
        dst_array_idx: 0,
    };
}

/// Buffers bound to one binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundBufferArray {
    pub binding: u32,
    pub buffers: Vec<BoundBuffer>,
}

/// Images bound to one binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundImageArray {
    pub binding: u32,
    pub images: Vec<BoundImage>,
}

/// Everything bound into one descriptor set; the descriptor set cache key.
///
/// `buffer_infos` and `image_infos` are indexed by binding. Slots whose
/// binding is [`UNUSED_BINDING`] belong to the other array or to no binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetParam {
    pub layout: vk::DescriptorSetLayout,
    pub layout_hash: u64,
    pub set: u32,
    pub buffer_infos: Vec<BoundBufferArray>,
    pub image_infos: Vec<BoundImageArray>,
    /// Sets are cached per command buffer so one in flight is never rewritten.
    pub attached_cmdbuf: vk::CommandBuffer,
}

impl DescriptorSetParam {
    /// A requirement for `set` that no layout backs.
    pub fn empty(set: u32) -> Self {
        Self {
            layout: vk::DescriptorSetLayout::null(),
            layout_hash: 0,
            set,
            buffer_infos: Vec::new(),
            image_infos: Vec::new(),
            attached_cmdbuf: vk::CommandBuffer::null(),
        }
    }

    /// Whether a layout backs this requirement.
    pub fn is_used(&self) -> bool {
        self.layout != vk::DescriptorSetLayout::null()
    }
}

/// A cached descriptor set and the writes that populate it.
#[derive(Debug)]
pub struct DescriptorSet {
    handle: vk::DescriptorSet,
    writes: Vec<DescriptorWrite>,
    applied: u64,
}

impl DescriptorSet {
    /// Build the write list for `param` against `bindings`.
    ///
    /// Null buffers and views are skipped. Buffer ranges are checked against
    /// `limits` unless they are `vk::WHOLE_SIZE`.
    pub fn new(
        handle: vk::DescriptorSet,
        param: &DescriptorSetParam,
        bindings: &[LayoutBinding],
        limits: &DeviceLimits,
    ) -> Result<Self, GpuError> {
        let find = |binding: u32| bindings.iter().find(|b| b.binding == binding);
        let mut writes = Vec::new();

        for array in param.buffer_infos.iter().filter(|a| a.binding != UNUSED_BINDING) {
            let Some(layout_binding) = find(array.binding) else {
                continue;
            };
            let ty = layout_binding.descriptor_type;
            let limit = match ty {
                vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
                    limits.max_uniform_buffer_range
                }
                _ => limits.max_storage_buffer_range,
            };

            for bound in array.buffers.iter().filter(|b| b.buffer != vk::Buffer::null()) {
                if bound.range != vk::WHOLE_SIZE && bound.range > u64::from(limit) {
                    return Err(GpuError::InvalidParameter(format!(
                        "range {} at set {} binding {} exceeds the {:?} limit of {}",
                        bound.range, param.set, array.binding, ty, limit
                    )));
                }
                writes.push(DescriptorWrite {
                    set: handle,
                    binding: array.binding,
                    array_element: bound.dst_array_idx,
                    descriptor_type: ty,
                    resource: WriteResource::Buffer {
                        buffer: bound.buffer,
                        offset: bound.offset,
                        range: bound.range,
                    },
                });
            }
        }

        for array in param.image_infos.iter().filter(|a| a.binding != UNUSED_BINDING) {
            let Some(layout_binding) = find(array.binding) else {
                continue;
            };
            let ty = layout_binding.descriptor_type;
            let populated = |image: &&BoundImage| match ty {
                vk::DescriptorType::SAMPLER => image.sampler != vk::Sampler::null(),
                _ => image.image_view != vk::ImageView::null(),
            };

            for bound in array.images.iter().filter(populated) {
                writes.push(DescriptorWrite {
                    set: handle,
                    binding: array.binding,
                    array_element: bound.dst_array_idx,
                    descriptor_type: ty,
                    resource: WriteResource::Image {
                        sampler: bound.sampler,
                        image_view: bound.image_view,
                        image_layout: bound.image_layout,
                    },
                });
            }
        }

        if writes.len() > MAX_WRITES_PER_SET {
            return Err(GpuError::InvalidParameter(format!(
                "set {} needs {} writes, at most {} are supported",
                param.set,
                writes.len(),
                MAX_WRITES_PER_SET
            )));
        }

        Ok(Self {
            handle,
            writes,
            applied: 0,
        })
    }

    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    pub fn writes(&self) -> &[DescriptorWrite] {
        &self.writes
    }

    /// Issue every write not applied yet. Returns how many were issued.
    pub fn apply_write(&mut self, device: &dyn GpuDevice) -> usize {
        let pending: Vec<DescriptorWrite> = self
            .writes
            .iter()
            .enumerate()
            .filter(|(index, _)| self.applied & (1u64 << index) == 0)
            .map(|(_, write)| *write)
            .collect();

        if pending.is_empty() {
            return 0;
        }
        device.update_descriptor_sets(&pending);
        self.applied = match self.writes.len() {
            MAX_WRITES_PER_SET => u64::MAX,
            len => (1u64 << len) - 1,
        };
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use ash::vk::Handle;

    fn binding(binding: u32, ty: vk::DescriptorType, count: u32) -> LayoutBinding {
        LayoutBinding {
            binding,
            descriptor_type: ty,
            descriptor_count: count,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            binding_flags: vk::DescriptorBindingFlags::empty(),
        }
    }

    fn param_with_buffer(range: u64) -> DescriptorSetParam {
        let mut param = DescriptorSetParam::empty(0);
        param.layout = vk::DescriptorSetLayout::from_raw(1);
        param.buffer_infos.push(BoundBufferArray {
            binding: 0,
            buffers: vec![BoundBuffer {
                buffer: vk::Buffer::from_raw(7),
                offset: 0,
                range,
                dst_array_idx: 0,
            }],
        });
        param
    }

    #[test]
    fn test_skips_null_resources() {
        let mut param = param_with_buffer(16);
        param.buffer_infos[0].buffers.push(BoundBuffer::EMPTY);
        param.image_infos.push(BoundImageArray {
            binding: UNUSED_BINDING,
            images: vec![BoundImage::EMPTY],
        });
        param.image_infos.push(BoundImageArray {
            binding: 1,
            images: vec![BoundImage::EMPTY],
        });
        let bindings = [
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, 2),
            binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
        ];

        let set = DescriptorSet::new(
            vk::DescriptorSet::from_raw(3),
            &param,
            &bindings,
            &DeviceLimits::default(),
        )
        .unwrap();
        assert_eq!(set.writes().len(), 1);
    }

    #[test]
    fn test_range_limit() {
        let bindings = [binding(0, vk::DescriptorType::UNIFORM_BUFFER, 1)];
        let limits = DeviceLimits::default();
        let handle = vk::DescriptorSet::from_raw(3);

        let too_big = param_with_buffer(u64::from(limits.max_uniform_buffer_range) + 1);
        assert!(DescriptorSet::new(handle, &too_big, &bindings, &limits).is_err());

        let whole = param_with_buffer(vk::WHOLE_SIZE);
        assert!(DescriptorSet::new(handle, &whole, &bindings, &limits).is_ok());
    }

    #[test]
    fn test_write_limit() {
        let mut param = DescriptorSetParam::empty(0);
        param.buffer_infos.push(BoundBufferArray {
            binding: 0,
            buffers: (0..65)
                .map(|i| BoundBuffer {
                    buffer: vk::Buffer::from_raw(100 + i),
                    offset: 0,
                    range: 4,
                    dst_array_idx: i as u32,
                })
                .collect(),
        });
        let bindings = [binding(0, vk::DescriptorType::STORAGE_BUFFER, 65)];
        let result = DescriptorSet::new(
            vk::DescriptorSet::from_raw(3),
            &param,
            &bindings,
            &DeviceLimits::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_write_once() {
        let device = DummyDevice::new();
        let bindings = [binding(0, vk::DescriptorType::UNIFORM_BUFFER, 1)];
        let mut set = DescriptorSet::new(
            vk::DescriptorSet::from_raw(3),
            &param_with_buffer(16),
            &bindings,
            &DeviceLimits::default(),
        )
        .unwrap();

        assert_eq!(set.apply_write(&device), 1);
        assert_eq!(set.apply_write(&device), 0);
        assert_eq!(device.stats().descriptor_writes, 1);
    }
}
