//! Native Vulkan backend implementation using ash.
//!
//! [`VulkanDevice`] wraps a logical device created by the application. It does
//! not own the device: the application destroys it after every cache built on
//! this backend has been dropped.

pub(crate) mod conversion;

use std::slice;

use ash::vk;
use parking_lot::Mutex;

use crate::backend::{
    ComputePipelineDesc, DescriptorPoolDesc, DescriptorWrite, DeviceLimits, FramebufferDesc,
    GpuDevice, GraphicsPipelineDesc, LayoutBinding, RenderPassDesc, SamplerDesc,
    ShaderStageDesc, SubmitDesc, SubpassDesc, WriteResource,
};
use crate::error::GpuError;

use self::conversion::{
    convert_attachment_description, convert_attachment_ref, convert_blend_state,
    convert_layout_binding, convert_sampler_desc, convert_specialization_entries,
    convert_subpass_dependency,
};

/// Vulkan-based [`GpuDevice`].
///
/// Requires Vulkan 1.2 (`vkCreateRenderPass2`, descriptor indexing and
/// depth/stencil resolve).
pub struct VulkanDevice {
    /// Logical device.
    device: ash::Device,
    /// Queue every submission goes to.
    queue: vk::Queue,
    /// Family of `queue`; command pools are created for it.
    queue_family: u32,
    limits: DeviceLimits,
    /// `vkQueueSubmit` requires external synchronization of the queue.
    queue_lock: Mutex<()>,
}

impl VulkanDevice {
    /// Wrap `device` and query the limits of `physical_device`.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family: u32,
    ) -> Self {
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingProperties::default();
        let mut properties = vk::PhysicalDeviceProperties2::default().push_next(&mut indexing);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties) };
        let native = properties.properties.limits;

        let limits = DeviceLimits {
            max_uniform_buffer_range: native.max_uniform_buffer_range,
            max_storage_buffer_range: native.max_storage_buffer_range,
            max_update_after_bind_sampled_images: indexing
                .max_descriptor_set_update_after_bind_sampled_images,
        };
        log::info!("Vulkan device limits: {:?}", limits);

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Self {
            device,
            queue,
            queue_family,
            limits,
            queue_lock: Mutex::new(()),
        }
    }

    /// Get the logical device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("queue", &self.queue)
            .field("queue_family", &self.queue_family)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Attachment references of one subpass in Vulkan form.
struct SubpassRefs {
    input: Vec<vk::AttachmentReference2<'static>>,
    color: Vec<vk::AttachmentReference2<'static>>,
    resolve: Vec<vk::AttachmentReference2<'static>>,
    depth: Option<vk::AttachmentReference2<'static>>,
    depth_resolve: Option<vk::AttachmentReference2<'static>>,
}

impl SubpassRefs {
    fn new(subpass: &SubpassDesc) -> Self {
        Self {
            input: subpass.input.iter().map(convert_attachment_ref).collect(),
            color: subpass.color.iter().map(convert_attachment_ref).collect(),
            resolve: subpass.resolve.iter().map(convert_attachment_ref).collect(),
            depth: subpass.depth.as_ref().map(convert_attachment_ref),
            depth_resolve: subpass.depth_resolve.as_ref().map(convert_attachment_ref),
        }
    }
}

fn stage_create_info<'a>(
    stage: &ShaderStageDesc<'a>,
    specialization: &'a vk::SpecializationInfo<'a>,
) -> vk::PipelineShaderStageCreateInfo<'a> {
    let info = vk::PipelineShaderStageCreateInfo::default()
        .stage(stage.stage)
        .module(stage.module)
        .name(stage.entry_point);
    if stage.specialization.is_empty() {
        info
    } else {
        info.specialization_info(specialization)
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule, GpuError> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { self.device.create_shader_module(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateShaderModule", e))?;
        log::trace!("Vulkan: created shader module {:?}", module);
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<vk::DescriptorSetLayout, GpuError> {
        let native: Vec<_> = bindings.iter().map(convert_layout_binding).collect();
        let binding_flags: Vec<_> = bindings.iter().map(|b| b.binding_flags).collect();
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let mut info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(flags)
            .bindings(&native);
        if binding_flags.iter().any(|f| !f.is_empty()) {
            info = info.push_next(&mut flags_info);
        }

        let layout = unsafe { self.device.create_descriptor_set_layout(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateDescriptorSetLayout", e))?;
        log::trace!(
            "Vulkan: created descriptor set layout {:?} ({} bindings)",
            layout,
            bindings.len()
        );
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDesc<'_>,
    ) -> Result<vk::DescriptorPool, GpuError> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(desc.flags)
            .max_sets(desc.max_sets)
            .pool_sizes(desc.pool_sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateDescriptorPool", e))?;
        log::trace!("Vulkan: created descriptor pool {:?}", pool);
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), GpuError> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
        .map_err(|e| GpuError::vulkan("vkResetDescriptorPool", e))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> Result<vk::DescriptorSet, GpuError> {
        let layouts = [layout];
        let counts = [variable_count.unwrap_or(0)];
        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default().descriptor_counts(&counts);

        let mut info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        if variable_count.is_some() {
            info = info.push_next(&mut variable_info);
        }

        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }
            .map_err(|e| GpuError::vulkan("vkAllocateDescriptorSets", e))?;
        sets.first().copied().ok_or_else(|| {
            GpuError::ResourceCreationFailed("vkAllocateDescriptorSets returned no set".to_string())
        })
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for write in writes {
            match write.resource {
                WriteResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => buffer_infos.push(
                    vk::DescriptorBufferInfo::default()
                        .buffer(buffer)
                        .offset(offset)
                        .range(range),
                ),
                WriteResource::Image {
                    sampler,
                    image_view,
                    image_layout,
                } => image_infos.push(
                    vk::DescriptorImageInfo::default()
                        .sampler(sampler)
                        .image_view(image_view)
                        .image_layout(image_layout),
                ),
            }
        }

        let mut buffers = buffer_infos.iter();
        let mut images = image_infos.iter();
        let native: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .filter_map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(write.set)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.descriptor_type);
                match write.resource {
                    WriteResource::Buffer { .. } => buffers
                        .next()
                        .map(|info| base.buffer_info(slice::from_ref(info))),
                    WriteResource::Image { .. } => images
                        .next()
                        .map(|info| base.image_info(slice::from_ref(info))),
                }
            })
            .collect();

        log::trace!("Vulkan: {} descriptor writes", native.len());
        unsafe { self.device.update_descriptor_sets(&native, &[]) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout, GpuError> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe { self.device.create_pipeline_layout(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreatePipelineLayout", e))?;
        log::trace!("Vulkan: created pipeline layout {:?}", layout);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<vk::Pipeline, GpuError> {
        let raster = desc.raster;

        let map_entries: Vec<_> = desc
            .stages
            .iter()
            .map(|stage| convert_specialization_entries(stage.specialization))
            .collect();
        let specializations: Vec<_> = desc
            .stages
            .iter()
            .zip(&map_entries)
            .map(|(stage, entries)| {
                vk::SpecializationInfo::default()
                    .map_entries(entries)
                    .data(stage.specialization.data())
            })
            .collect();
        let stages: Vec<_> = desc
            .stages
            .iter()
            .zip(&specializations)
            .map(|(stage, specialization)| stage_create_info(stage, specialization))
            .collect();

        // Vertex data is pulled from buffers in the shaders.
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(raster.topology)
            .primitive_restart_enable(false);

        // Dynamic viewport and scissor
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(raster.polygon_mode)
            .line_width(1.0)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(raster.depth_bias_enable)
            .depth_bias_constant_factor(raster.depth_bias_constant)
            .depth_bias_clamp(raster.depth_bias_clamp)
            .depth_bias_slope_factor(raster.depth_bias_slope);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(raster.samples);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(raster.depth_write)
            .depth_compare_op(raster.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let has_fragment = desc
            .stages
            .iter()
            .any(|stage| stage.stage == vk::ShaderStageFlags::FRAGMENT);
        let color_blend_attachments = if has_fragment {
            vec![convert_blend_state(&raster.blend); raster.color_target_count as usize]
        } else {
            Vec::new()
        };
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| GpuError::vulkan("vkCreateGraphicsPipelines", e))?;

        let pipeline = pipelines.first().copied().ok_or_else(|| {
            GpuError::ResourceCreationFailed("vkCreateGraphicsPipelines returned no pipeline".to_string())
        })?;
        log::trace!("Vulkan: created graphics pipeline {:?}", pipeline);
        Ok(pipeline)
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
    ) -> Result<vk::Pipeline, GpuError> {
        let map_entries = convert_specialization_entries(desc.stage.specialization);
        let specialization = vk::SpecializationInfo::default()
            .map_entries(&map_entries)
            .data(desc.stage.specialization.data());

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_create_info(&desc.stage, &specialization))
            .layout(desc.layout);

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| GpuError::vulkan("vkCreateComputePipelines", e))?;

        let pipeline = pipelines.first().copied().ok_or_else(|| {
            GpuError::ResourceCreationFailed("vkCreateComputePipelines returned no pipeline".to_string())
        })?;
        log::trace!("Vulkan: created compute pipeline {:?}", pipeline);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass, GpuError> {
        let attachments: Vec<_> = desc
            .attachments
            .iter()
            .map(convert_attachment_description)
            .collect();
        let dependencies: Vec<_> = desc
            .dependencies
            .iter()
            .map(convert_subpass_dependency)
            .collect();
        let refs: Vec<_> = desc.subpasses.iter().map(SubpassRefs::new).collect();

        let mut depth_resolves: Vec<_> = refs
            .iter()
            .map(|refs| {
                let info = vk::SubpassDescriptionDepthStencilResolve::default()
                    .depth_resolve_mode(vk::ResolveModeFlags::SAMPLE_ZERO)
                    .stencil_resolve_mode(vk::ResolveModeFlags::SAMPLE_ZERO);
                match &refs.depth_resolve {
                    Some(reference) => info.depth_stencil_resolve_attachment(reference),
                    None => info,
                }
            })
            .collect();

        let subpasses: Vec<_> = refs
            .iter()
            .zip(depth_resolves.iter_mut())
            .map(|(refs, depth_resolve)| {
                let mut subpass = vk::SubpassDescription2::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&refs.input)
                    .color_attachments(&refs.color);
                if !refs.resolve.is_empty() {
                    subpass = subpass.resolve_attachments(&refs.resolve);
                }
                if let Some(depth) = &refs.depth {
                    subpass = subpass.depth_stencil_attachment(depth);
                }
                if refs.depth_resolve.is_some() {
                    subpass = subpass.push_next(depth_resolve);
                }
                subpass
            })
            .collect();

        let info = vk::RenderPassCreateInfo2::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { self.device.create_render_pass2(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateRenderPass2", e))?;
        log::trace!(
            "Vulkan: created render pass {:?} ({} attachments, {} subpasses)",
            render_pass,
            attachments.len(),
            subpasses.len()
        );
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        desc: &FramebufferDesc<'_>,
    ) -> Result<vk::Framebuffer, GpuError> {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(desc.render_pass)
            .attachments(desc.attachments)
            .width(desc.width)
            .height(desc.height)
            .layers(desc.layers);
        let framebuffer = unsafe { self.device.create_framebuffer(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateFramebuffer", e))?;
        log::trace!("Vulkan: created framebuffer {:?}", framebuffer);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler, GpuError> {
        let info = convert_sampler_desc(desc);
        let sampler = unsafe { self.device.create_sampler(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateSampler", e))?;
        log::trace!("Vulkan: created sampler {:?}", sampler);
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_command_pool(&self) -> Result<vk::CommandPool, GpuError> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe { self.device.create_command_pool(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateCommandPool", e))
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> Result<(), GpuError> {
        unsafe {
            self.device
                .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| GpuError::vulkan("vkResetCommandPool", e))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, GpuError> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| GpuError::vulkan("vkAllocateCommandBuffers", e))
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<(), GpuError> {
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(command_buffer, &info) }
            .map_err(|e| GpuError::vulkan("vkBeginCommandBuffer", e))
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), GpuError> {
        unsafe { self.device.end_command_buffer(command_buffer) }
            .map_err(|e| GpuError::vulkan("vkEndCommandBuffer", e))
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), GpuError> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| GpuError::vulkan("vkResetCommandBuffer", e))
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, GpuError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateFence", e))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn fence_status(&self, fence: vk::Fence) -> Result<bool, GpuError> {
        unsafe { self.device.get_fence_status(fence) }
            .map_err(|e| GpuError::vulkan("vkGetFenceStatus", e))
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<(), GpuError> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.wait_for_fences(fences, true, u64::MAX) }
            .map_err(|e| GpuError::vulkan("vkWaitForFences", e))
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<(), GpuError> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.reset_fences(fences) }
            .map_err(|e| GpuError::vulkan("vkResetFences", e))
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore, GpuError> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }
            .map_err(|e| GpuError::vulkan("vkCreateSemaphore", e))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn queue_submit(&self, submit: &SubmitDesc<'_>) -> Result<(), GpuError> {
        let command_buffers = [submit.command_buffer];
        let info = vk::SubmitInfo::default()
            .wait_semaphores(submit.wait_semaphores)
            .wait_dst_stage_mask(submit.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(submit.signal_semaphores);

        let _guard = self.queue_lock.lock();
        unsafe { self.device.queue_submit(self.queue, &[info], submit.fence) }
            .map_err(|e| GpuError::vulkan("vkQueueSubmit", e))?;
        log::trace!(
            "Vulkan: submitted {:?} (waits {}, signals {})",
            submit.command_buffer,
            submit.wait_semaphores.len(),
            submit.signal_semaphores.len()
        );
        Ok(())
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                bind_point,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            )
        };
    }

    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, bind_point, pipeline)
        };
    }
}
