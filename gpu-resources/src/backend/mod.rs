//! Native object backend.
//!
//! The caches never talk to a graphics API directly. They derive plain value
//! descriptions (layout bindings, attachment lists, pipeline state, descriptor
//! writes) and hand them to a [`GpuDevice`], which turns them into native
//! objects.
//!
//! # Available Backends
//!
//! - [`DummyDevice`]: No GPU; mints handles and records statistics. Used by tests.
//! - `VulkanDevice` (`vulkan-backend` feature): Native Vulkan via ash.
//!
//! Handles are `ash::vk` handle types for every backend.

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use std::ffi::CStr;

use ash::vk;

use crate::error::GpuError;
use crate::pipeline::{RasterState, SpecializationConstantInfo};

pub use dummy::{DescriptorBindRecord, DummyDevice, DummyStats, SubmitRecord};
#[cfg(feature = "vulkan-backend")]
pub use vulkan::VulkanDevice;

/// Device limits the caches validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    pub max_uniform_buffer_range: u32,
    pub max_storage_buffer_range: u32,
    pub max_update_after_bind_sampled_images: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_uniform_buffer_range: 65536,
            max_storage_buffer_range: 1 << 27,
            max_update_after_bind_sampled_images: 1 << 16,
        }
    }
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
    pub binding_flags: vk::DescriptorBindingFlags,
}

/// Description of a descriptor pool.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorPoolDesc<'a> {
    pub flags: vk::DescriptorPoolCreateFlags,
    pub max_sets: u32,
    pub pool_sizes: &'a [vk::DescriptorPoolSize],
}

/// The resource written into one descriptor array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteResource {
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Image {
        sampler: vk::Sampler,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    },
}

/// One descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub resource: WriteResource,
}

/// A programmable stage of a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStageDesc<'a> {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: &'a CStr,
    pub specialization: &'a SpecializationConstantInfo,
}

/// Everything needed to build a graphics pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub stages: &'a [ShaderStageDesc<'a>],
    pub raster: &'a RasterState,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

/// Everything needed to build a compute pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc<'a> {
    pub stage: ShaderStageDesc<'a>,
    pub layout: vk::PipelineLayout,
}

/// Attachment references of one subpass, as indices into the attachment list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassDesc {
    pub input: Vec<AttachmentRef>,
    pub color: Vec<AttachmentRef>,
    /// Either empty or exactly as long as `color`.
    pub resolve: Vec<AttachmentRef>,
    pub depth: Option<AttachmentRef>,
    pub depth_resolve: Option<AttachmentRef>,
}

/// Reference to an attachment from a subpass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentRef {
    /// Attachment index, or `vk::ATTACHMENT_UNUSED`.
    pub attachment: u32,
    pub layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
}

impl AttachmentRef {
    pub const UNUSED: Self = Self {
        attachment: vk::ATTACHMENT_UNUSED,
        layout: vk::ImageLayout::UNDEFINED,
        aspect: vk::ImageAspectFlags::empty(),
    };
}

/// A render pass, fully derived from its parameters.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

/// Description of a framebuffer.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferDesc<'a> {
    pub render_pass: vk::RenderPass,
    pub attachments: &'a [vk::ImageView],
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Description of a sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub max_anisotropy: Option<f32>,
    pub compare_op: Option<vk::CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: vk::BorderColor,
}

/// One queue submission of a single command buffer.
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc<'a> {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphores: &'a [vk::Semaphore],
    pub wait_stages: &'a [vk::PipelineStageFlags],
    pub signal_semaphores: &'a [vk::Semaphore],
    pub fence: vk::Fence,
}

/// Creates, destroys and drives native GPU objects.
///
/// All methods take `&self`; implementations synchronise internally where they
/// keep state.
pub trait GpuDevice: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Limits the caches validate against.
    fn limits(&self) -> DeviceLimits;

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule, GpuError>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<vk::DescriptorSetLayout, GpuError>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDesc<'_>,
    ) -> Result<vk::DescriptorPool, GpuError>;
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), GpuError>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one set; `variable_count` is set for variable-sized layouts.
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> Result<vk::DescriptorSet, GpuError>;
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout, GpuError>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<vk::Pipeline, GpuError>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
    ) -> Result<vk::Pipeline, GpuError>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass, GpuError>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>)
        -> Result<vk::Framebuffer, GpuError>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler, GpuError>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    fn create_command_pool(&self) -> Result<vk::CommandPool, GpuError>;
    fn reset_command_pool(&self, pool: vk::CommandPool) -> Result<(), GpuError>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, GpuError>;
    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<(), GpuError>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), GpuError>;
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), GpuError>;

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, GpuError>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Non-blocking check whether `fence` is signaled.
    fn fence_status(&self, fence: vk::Fence) -> Result<bool, GpuError>;
    /// Block until every fence in `fences` is signaled.
    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<(), GpuError>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<(), GpuError>;

    fn create_semaphore(&self) -> Result<vk::Semaphore, GpuError>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn queue_submit(&self, submit: &SubmitDesc<'_>) -> Result<(), GpuError>;

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
}
