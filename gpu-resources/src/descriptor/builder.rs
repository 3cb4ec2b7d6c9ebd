//! Accumulates named resource binds into per-set descriptor requirements.

use std::collections::BTreeMap;
use std::rc::Rc;

use ash::vk;

use crate::error::fatal;
use crate::reflection::{ResourceKind, ShaderResource, UpdateMode};
use crate::shader::ShaderModule;

use super::set::{BoundBuffer, BoundImage, DescriptorSetParam};

/// Collects binds by resource name against the active shader modules.
///
/// Requirements are pre-sized by [`DescriptorCache::fill_requirements`], so a
/// bind is a name lookup plus a slot write.
///
/// [`DescriptorCache::fill_requirements`]: super::DescriptorCache::fill_requirements
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    modules: Vec<Rc<ShaderModule>>,
    pipeline_layout: vk::PipelineLayout,
    /// Indexed by set.
    requirements: Vec<DescriptorSetParam>,
    /// Keyed by (set, binding, array index) so iteration follows bind order.
    dynamic_offsets: BTreeMap<(u32, u32, u32), u32>,
    suppress_warnings: bool,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to `modules`, dropping every requirement and bind.
    pub fn bind_shaders(&mut self, modules: &[Rc<ShaderModule>]) {
        self.modules = modules.to_vec();
        self.pipeline_layout = vk::PipelineLayout::null();
        self.requirements.clear();
        self.dynamic_offsets.clear();
    }

    pub fn modules(&self) -> &[Rc<ShaderModule>] {
        &self.modules
    }

    /// Install pre-sized requirements for the layout of the active modules.
    pub fn set_requirements(
        &mut self,
        pipeline_layout: vk::PipelineLayout,
        requirements: Vec<DescriptorSetParam>,
    ) {
        self.pipeline_layout = pipeline_layout;
        self.requirements = requirements;
        self.dynamic_offsets.clear();
    }

    /// Layout the requirements were sized for; null before they are filled.
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    /// Stop warning about binds that match no resource.
    pub fn suppress_warnings(&mut self, suppress: bool) {
        self.suppress_warnings = suppress;
    }

    /// Record which command buffer the requirements will be bound on.
    pub fn attach_command_buffer(&mut self, cmd: vk::CommandBuffer) {
        for requirement in &mut self.requirements {
            requirement.attached_cmdbuf = cmd;
        }
    }

    /// Filled per-set requirements, indexed by set.
    pub fn get_params(&self) -> &[DescriptorSetParam] {
        &self.requirements
    }

    /// Dynamic offsets for `set`, ordered by binding then array element.
    pub fn dynamic_offsets(&self, set: u32) -> Vec<u32> {
        self.dynamic_offsets
            .range((set, 0, 0)..=(set, u32::MAX, u32::MAX))
            .map(|(_, &offset)| offset)
            .collect()
    }

    /// Bind `buffer` to the uniform or storage buffer called `name`.
    ///
    /// Returns `false` (with a warning) if no active module declares it.
    pub fn bind_buffer(
        &mut self,
        name: &str,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        array_idx: u32,
    ) -> bool {
        let Some((set, binding, dynamic)) = self
            .find(name, |kind| {
                matches!(kind, ResourceKind::UniformBuffer | ResourceKind::StorageBuffer)
            })
            .map(|r| (r.set, r.binding, r.update_mode == UpdateMode::Dynamic))
        else {
            self.warn_unresolved("buffer", name);
            return false;
        };

        let written_offset = if dynamic {
            let offset = u32::try_from(offset).unwrap_or_else(|_| {
                fatal(format_args!("dynamic offset {} of '{}' exceeds u32", offset, name))
            });
            self.dynamic_offsets.insert((set, binding, array_idx), offset);
            0
        } else {
            offset
        };

        let slot = self.buffer_slot(set, binding, array_idx);
        *slot = BoundBuffer {
            buffer,
            offset: written_offset,
            range: size,
            dst_array_idx: array_idx,
        };
        true
    }

    /// Bind a sampled image to the combined image sampler called `name`.
    pub fn bind_image(
        &mut self,
        name: &str,
        sampler: vk::Sampler,
        image_view: vk::ImageView,
        array_idx: u32,
    ) -> bool {
        let Some((set, binding)) = self
            .find(name, |kind| kind == ResourceKind::ImageSampler)
            .map(|r| (r.set, r.binding))
        else {
            self.warn_unresolved("image", name);
            return false;
        };

        *self.image_slot(set, binding, array_idx) = BoundImage {
            sampler,
            image_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            dst_array_idx: array_idx,
        };
        true
    }

    /// Bind an attachment view to the subpass input called `name`.
    pub fn bind_input_attachment(
        &mut self,
        name: &str,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    ) -> bool {
        let Some((set, binding)) = self
            .find(name, |kind| kind == ResourceKind::InputAttachment)
            .map(|r| (r.set, r.binding))
        else {
            self.warn_unresolved("input attachment", name);
            return false;
        };

        *self.image_slot(set, binding, 0) = BoundImage {
            sampler: vk::Sampler::null(),
            image_view,
            image_layout,
            dst_array_idx: 0,
        };
        true
    }

    fn find(&self, name: &str, kind: impl Fn(ResourceKind) -> bool) -> Option<&ShaderResource> {
        self.modules
            .iter()
            .flat_map(|module| module.resources())
            .find(|resource| resource.name == name && kind(resource.kind))
    }

    fn warn_unresolved(&self, what: &str, name: &str) {
        if self.suppress_warnings {
            return;
        }
        log::warn!("Can't find {} named {} in the following shaders:", what, name);
        for module in &self.modules {
            log::warn!("\t{}", module.path());
        }
    }

    fn requirement(&mut self, set: u32) -> &mut DescriptorSetParam {
        match self.requirements.get_mut(set as usize) {
            Some(requirement) if requirement.is_used() => requirement,
            _ => fatal(format_args!("set {} has no descriptor requirement", set)),
        }
    }

    fn buffer_slot(&mut self, set: u32, binding: u32, array_idx: u32) -> &mut BoundBuffer {
        self.requirement(set)
            .buffer_infos
            .get_mut(binding as usize)
            .and_then(|array| array.buffers.get_mut(array_idx as usize))
            .unwrap_or_else(|| {
                fatal(format_args!(
                    "buffer slot (set {}, binding {}, element {}) is outside the layout",
                    set, binding, array_idx
                ))
            })
    }

    fn image_slot(&mut self, set: u32, binding: u32, array_idx: u32) -> &mut BoundImage {
        self.requirement(set)
            .image_infos
            .get_mut(binding as usize)
            .and_then(|array| array.images.get_mut(array_idx as usize))
            .unwrap_or_else(|| {
                fatal(format_args!(
                    "image slot (set {}, binding {}, element {}) is outside the layout",
                    set, binding, array_idx
                ))
            })
    }
}
