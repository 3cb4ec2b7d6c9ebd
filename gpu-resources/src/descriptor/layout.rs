//! Descriptor set layouts derived from reflected shader resources.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::{GpuDevice, LayoutBinding};
use crate::error::GpuError;
use crate::reflection::{ResourceKind, ShaderResource, UpdateMode};
use crate::shader::ShaderModule;

/// Descriptor type a reflected resource is bound as.
pub fn descriptor_type(resource: &ShaderResource) -> Option<vk::DescriptorType> {
    let dynamic = resource.update_mode == UpdateMode::Dynamic;
    Some(match resource.kind {
        ResourceKind::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        ResourceKind::Image => vk::DescriptorType::SAMPLED_IMAGE,
        ResourceKind::Sampler => vk::DescriptorType::SAMPLER,
        ResourceKind::ImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ResourceKind::ImageStorage => vk::DescriptorType::STORAGE_IMAGE,
        ResourceKind::UniformBuffer if dynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        ResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceKind::StorageBuffer if dynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        ResourceKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        ResourceKind::Input
        | ResourceKind::Output
        | ResourceKind::PushConstant
        | ResourceKind::SpecializationConstant => return None,
    })
}

/// Whether `ty` is written with buffer infos rather than image infos.
pub fn is_buffer_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

/// Layout of one descriptor set of a pipeline layout.
pub struct DescriptorSetLayout {
    device: Arc<dyn GpuDevice>,
    handle: vk::DescriptorSetLayout,
    set: u32,
    hash: u64,
    bindings: Vec<LayoutBinding>,
    pool_flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorSetLayout {
    /// Merge the descriptor resources of `modules` that live in `set` and create the layout.
    ///
    /// `shader_hash` identifies the module combination.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        set: u32,
        shader_hash: u64,
        modules: &[Rc<ShaderModule>],
    ) -> Result<Self, GpuError> {
        let limits = device.limits();
        let mut merged: BTreeMap<u32, LayoutBinding> = BTreeMap::new();
        let mut update_after_bind = false;

        let resources = modules
            .iter()
            .flat_map(|module| module.resources())
            .filter(|resource| resource.kind.is_descriptor() && resource.set == set);

        for resource in resources {
            let Some(descriptor_type) = descriptor_type(resource) else {
                continue;
            };

            let (descriptor_count, binding_flags) = match resource.update_mode {
                UpdateMode::UpdateAfterBind if resource.kind == ResourceKind::ImageSampler => {
                    update_after_bind = true;
                    (
                        limits.max_update_after_bind_sampled_images,
                        vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
                            | vk::DescriptorBindingFlags::PARTIALLY_BOUND
                            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                            | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING,
                    )
                }
                UpdateMode::UpdateAfterBind => {
                    return Err(GpuError::InvalidParameter(format!(
                        "'{}' is a {:?}; only image samplers can be updated after bind",
                        resource.name, resource.kind
                    )));
                }
                _ => (resource.array_size, vk::DescriptorBindingFlags::empty()),
            };

            match merged.get_mut(&resource.binding) {
                Some(existing) if existing.descriptor_type != descriptor_type => {
                    return Err(GpuError::InvalidParameter(format!(
                        "set {} binding {} declared as both {:?} and {:?}",
                        set, resource.binding, existing.descriptor_type, descriptor_type
                    )));
                }
                Some(existing) => existing.stage_flags |= resource.stages,
                None => {
                    merged.insert(
                        resource.binding,
                        LayoutBinding {
                            binding: resource.binding,
                            descriptor_type,
                            descriptor_count,
                            stage_flags: resource.stages,
                            binding_flags,
                        },
                    );
                }
            }
        }

        let bindings: Vec<LayoutBinding> = merged.into_values().collect();
        let (layout_flags, pool_flags) = if update_after_bind {
            (
                vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
                vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
            )
        } else {
            (
                vk::DescriptorSetLayoutCreateFlags::empty(),
                vk::DescriptorPoolCreateFlags::empty(),
            )
        };

        let handle = device.create_descriptor_set_layout(&bindings, layout_flags)?;

        let mut hasher = DefaultHasher::new();
        shader_hash.hash(&mut hasher);
        set.hash(&mut hasher);

        log::debug!(
            "Created descriptor set layout for set {} with {} bindings",
            set,
            bindings.len()
        );

        Ok(Self {
            device,
            handle,
            set,
            hash: hasher.finish(),
            bindings,
            pool_flags,
        })
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn set(&self) -> u32 {
        self.set
    }

    /// Shader-combination hash combined with the set index.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Bindings sorted by binding index.
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings
            .binary_search_by_key(&binding, |b| b.binding)
            .ok()
            .map(|index| &self.bindings[index])
    }

    /// Flags the descriptor pools for this layout must be created with.
    pub fn pool_flags(&self) -> vk::DescriptorPoolCreateFlags {
        self.pool_flags
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.handle);
    }
}

impl std::fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("handle", &self.handle)
            .field("set", &self.set)
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(kind: ResourceKind, mode: UpdateMode) -> ShaderResource {
        let mut resource = ShaderResource::new("r", kind, vk::ShaderStageFlags::VERTEX);
        resource.update_mode = mode;
        resource
    }

    #[test]
    fn test_descriptor_types() {
        assert_eq!(
            descriptor_type(&resource(ResourceKind::UniformBuffer, UpdateMode::Static)),
            Some(vk::DescriptorType::UNIFORM_BUFFER)
        );
        assert_eq!(
            descriptor_type(&resource(ResourceKind::StorageBuffer, UpdateMode::Dynamic)),
            Some(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC)
        );
        assert_eq!(
            descriptor_type(&resource(ResourceKind::InputAttachment, UpdateMode::Static)),
            Some(vk::DescriptorType::INPUT_ATTACHMENT)
        );
        assert_eq!(
            descriptor_type(&resource(ResourceKind::PushConstant, UpdateMode::Static)),
            None
        );
    }

    #[test]
    fn test_buffer_types() {
        assert!(is_buffer_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC));
        assert!(!is_buffer_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }
}
