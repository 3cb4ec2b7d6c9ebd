//! Conversions from the backend descriptions to Vulkan create-info structures.

use ash::vk;

use crate::backend::{AttachmentRef, LayoutBinding, SamplerDesc};
use crate::pipeline::{ColorBlendState, SpecializationConstantInfo};

/// Convert a layout binding. Binding flags travel separately in a
/// `DescriptorSetLayoutBindingFlagsCreateInfo`.
pub fn convert_layout_binding(binding: &LayoutBinding) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding.binding)
        .descriptor_type(binding.descriptor_type)
        .descriptor_count(binding.descriptor_count)
        .stage_flags(binding.stage_flags)
}

/// Convert a blend state into one color attachment blend state.
pub fn convert_blend_state(state: &ColorBlendState) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(state.blend_enable)
        .src_color_blend_factor(state.src_color)
        .dst_color_blend_factor(state.dst_color)
        .color_blend_op(state.color_op)
        .src_alpha_blend_factor(state.src_alpha)
        .dst_alpha_blend_factor(state.dst_alpha)
        .alpha_blend_op(state.alpha_op)
        .color_write_mask(state.write_mask)
}

/// Map entries of a specialization blob.
pub fn convert_specialization_entries(
    info: &SpecializationConstantInfo,
) -> Vec<vk::SpecializationMapEntry> {
    info.entries()
        .iter()
        .map(|entry| {
            vk::SpecializationMapEntry::default()
                .constant_id(entry.constant_id)
                .offset(entry.offset)
                .size(entry.size as usize)
        })
        .collect()
}

pub fn convert_attachment_description(
    attachment: &vk::AttachmentDescription,
) -> vk::AttachmentDescription2<'static> {
    vk::AttachmentDescription2::default()
        .flags(attachment.flags)
        .format(attachment.format)
        .samples(attachment.samples)
        .load_op(attachment.load_op)
        .store_op(attachment.store_op)
        .stencil_load_op(attachment.stencil_load_op)
        .stencil_store_op(attachment.stencil_store_op)
        .initial_layout(attachment.initial_layout)
        .final_layout(attachment.final_layout)
}

pub fn convert_attachment_ref(reference: &AttachmentRef) -> vk::AttachmentReference2<'static> {
    vk::AttachmentReference2::default()
        .attachment(reference.attachment)
        .layout(reference.layout)
        .aspect_mask(reference.aspect)
}

pub fn convert_subpass_dependency(
    dependency: &vk::SubpassDependency,
) -> vk::SubpassDependency2<'static> {
    vk::SubpassDependency2::default()
        .src_subpass(dependency.src_subpass)
        .dst_subpass(dependency.dst_subpass)
        .src_stage_mask(dependency.src_stage_mask)
        .dst_stage_mask(dependency.dst_stage_mask)
        .src_access_mask(dependency.src_access_mask)
        .dst_access_mask(dependency.dst_access_mask)
        .dependency_flags(dependency.dependency_flags)
}

pub fn convert_sampler_desc(desc: &SamplerDesc) -> vk::SamplerCreateInfo<'static> {
    let mut info = vk::SamplerCreateInfo::default()
        .mag_filter(desc.mag_filter)
        .min_filter(desc.min_filter)
        .mipmap_mode(desc.mipmap_mode)
        .address_mode_u(desc.address_mode_u)
        .address_mode_v(desc.address_mode_v)
        .address_mode_w(desc.address_mode_w)
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
        .border_color(desc.border_color)
        .unnormalized_coordinates(false);

    if let Some(max_anisotropy) = desc.max_anisotropy {
        info = info.anisotropy_enable(true).max_anisotropy(max_anisotropy);
    }
    if let Some(compare_op) = desc.compare_op {
        info = info.compare_enable(true).compare_op(compare_op);
    }
    info
}
