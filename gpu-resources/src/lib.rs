//! # RedLilium GPU Resources
//!
//! Resource caching layer for the RedLilium Vulkan renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`reflection`] - SPIR-V reflection of the resources a shader stage declares
//! - [`ShaderModuleCache`] - Reflected shader modules keyed by path, stage and macros
//! - [`DescriptorCache`] - Pipeline layouts, pooled descriptor sets and batched binding
//! - [`GraphicsPipelineCache`] / [`ComputePipelineCache`] - Hash-consed pipelines
//! - [`FboCache`] - Render passes and framebuffers with reference-counted eviction
//! - [`SamplerCache`] - Samplers keyed by their filtering state
//! - [`CommandBufferRing`] - Fence-tracked recycling of primary command buffers
//! - [`GpuContext`] - One owner for all of the above that drives garbage collection
//!
//! Every cache keeps the epoch an entry was last used in and evicts entries
//! that have not been used for a configurable number of flushes. Native
//! objects are created through the [`GpuDevice`] trait: [`DummyDevice`] for
//! tests and `VulkanDevice` over ash.
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_gpu_resources::{CacheConfig, GpuContext, ShaderModuleParam, ShaderSource};
//!
//! let mut ctx = GpuContext::new(device, CacheConfig::default())?;
//! ctx.store_mut().load("shaders/mesh.vert.spv")?;
//!
//! let cmd = ctx.command_buffer();
//! ctx.bind_graphics_shader(&ShaderModuleParam::new(
//!     vk::ShaderStageFlags::VERTEX,
//!     ShaderSource::new("shaders/mesh.vert.spv"),
//! ));
//! // Bind fragment stage, resources, render pass, pipeline...
//! ctx.flush();
//! ```

pub mod backend;
pub mod cache;
pub mod command;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod pipeline;
pub mod profiling;
pub mod reflection;
pub mod render_pass;
pub mod sampler;
pub mod shader;

// Re-export main types for convenience
pub use backend::{DeviceLimits, DummyDevice, GpuDevice};
#[cfg(feature = "vulkan-backend")]
pub use backend::VulkanDevice;
pub use cache::{CacheHitCounter, GcTimer};
pub use command::{CommandBufferRing, CommandBufferState};
pub use config::CacheConfig;
pub use context::GpuContext;
pub use descriptor::{DescriptorBuilder, DescriptorCache, DescriptorSetParam};
pub use error::{GpuError, ReflectionError};
pub use pipeline::{
    ColorBlendState, ComputePipelineCache, GraphicsPipelineCache, PipelineLayout, RasterState,
    SpecializationConstantInfo,
};
pub use reflection::{ResourceKind, ShaderResource, UpdateMode};
pub use render_pass::{AttachmentFlags, FboCache, FramebufferParam, RenderPassParam};
pub use sampler::{MagFilter, MinFilter, SamplerCache, SamplerParam};
pub use shader::{ShaderContentStore, ShaderModule, ShaderModuleCache, ShaderModuleParam, ShaderSource};

/// GPU resources library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the GPU resources subsystem.
pub fn init() {
    log::info!("RedLilium GPU Resources v{} initialized", VERSION);
}
