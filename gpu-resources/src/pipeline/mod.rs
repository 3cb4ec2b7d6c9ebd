//! Pipeline layouts, pipelines and the fixed-function state they are built from.
//!
//! Pipeline layouts live in the [`DescriptorCache`](crate::DescriptorCache)
//! next to the set allocators they own. The pipeline caches drive it: they
//! collect the active shaders, resolve the layout, and build one pipeline per
//! distinct combination of shaders, layout, specialization constants and
//! fixed-function state.

mod compute;
mod graphics;
mod layout;
mod raster;
mod specialization;

pub use compute::{ComputePipelineCache, ComputePipelineParam};
pub use graphics::{GraphicsPipelineCache, GraphicsPipelineParam, Pipeline};
pub use layout::{PipelineLayout, PipelineLayoutParam};
pub use raster::{ColorBlendState, RasterState};
pub use specialization::{SpecializationConstantInfo, SpecializationEntry};
