//! Descriptor set layouts, allocation, binding and caching.
//!
//! # Flow
//!
//! 1. [`DescriptorBuilder::bind_shaders`] attaches the active shader modules.
//! 2. [`DescriptorCache::fill_requirements`] sizes one [`DescriptorSetParam`]
//!    per set from the pipeline layout of those modules.
//! 3. `bind_buffer` / `bind_image` / `bind_input_attachment` fill slots by
//!    resource name.
//! 4. [`DescriptorCache::bind_descriptor_sets`] looks up (or allocates and
//!    writes) one set per requirement and binds them with their dynamic offsets.

mod allocator;
mod builder;
mod cache;
mod layout;
mod set;

pub use allocator::DescriptorSetAllocator;
pub use builder::DescriptorBuilder;
pub use cache::DescriptorCache;
pub use layout::{DescriptorSetLayout, descriptor_type, is_buffer_type};
pub use set::{
    BoundBuffer, BoundBufferArray, BoundImage, BoundImageArray, DescriptorSet, DescriptorSetParam,
    MAX_WRITES_PER_SET, UNUSED_BINDING,
};
