//! Pipeline layouts built from the reflected resources of a shader combination.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::GpuDevice;
use crate::config::MAX_DESCRIPTOR_SETS;
use crate::descriptor::DescriptorSetLayout;
use crate::error::GpuError;
use crate::reflection::ResourceKind;
use crate::shader::ShaderModule;

/// The shader modules of one pipeline; the pipeline layout cache key.
///
/// Hashing combines the modules' bytecode hashes; equality is module identity.
#[derive(Debug, Clone)]
pub struct PipelineLayoutParam {
    modules: Vec<Rc<ShaderModule>>,
}

impl PipelineLayoutParam {
    pub fn new(modules: Vec<Rc<ShaderModule>>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &[Rc<ShaderModule>] {
        &self.modules
    }

    /// Combined bytecode hash of every module, in order.
    pub fn shader_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for PipelineLayoutParam {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for module in &self.modules {
            module.bytecode_hash().hash(state);
        }
    }
}

impl PartialEq for PipelineLayoutParam {
    fn eq(&self, other: &Self) -> bool {
        self.modules.len() == other.modules.len()
            && self
                .modules
                .iter()
                .zip(&other.modules)
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }
}

impl Eq for PipelineLayoutParam {}

/// A native pipeline layout and the descriptor set layouts it was built from.
pub struct PipelineLayout {
    device: Arc<dyn GpuDevice>,
    handle: vk::PipelineLayout,
    shader_hash: u64,
    /// One per set index from 0 to the highest used set. Gaps get empty layouts.
    set_layouts: Vec<DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    modules: Vec<Rc<ShaderModule>>,
}

impl PipelineLayout {
    pub fn new(device: Arc<dyn GpuDevice>, param: &PipelineLayoutParam) -> Result<Self, GpuError> {
        let shader_hash = param.shader_hash();
        let resources = || param.modules.iter().flat_map(|module| module.resources());

        let used_sets: BTreeSet<u32> = resources()
            .filter(|resource| resource.kind.is_descriptor())
            .map(|resource| resource.set)
            .collect();
        let set_count = match used_sets.last() {
            None => 0,
            Some(&max) if max < MAX_DESCRIPTOR_SETS => max + 1,
            Some(&max) => {
                return Err(GpuError::InvalidParameter(format!(
                    "descriptor set {max} is past the limit of {MAX_DESCRIPTOR_SETS} sets"
                )));
            }
        };

        let set_layouts = (0..set_count)
            .map(|set| DescriptorSetLayout::new(device.clone(), set, shader_hash, &param.modules))
            .collect::<Result<Vec<_>, _>>()?;

        let push_constant_ranges: Vec<vk::PushConstantRange> = resources()
            .filter(|resource| resource.kind == ResourceKind::PushConstant)
            .map(|resource| vk::PushConstantRange {
                stage_flags: resource.stages,
                offset: resource.offset,
                size: resource.size,
            })
            .collect();

        let handles: Vec<vk::DescriptorSetLayout> =
            set_layouts.iter().map(DescriptorSetLayout::handle).collect();
        let handle = device.create_pipeline_layout(&handles, &push_constant_ranges)?;

        log::debug!(
            "Created pipeline layout with {} sets and {} push constant ranges",
            set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self {
            device,
            handle,
            shader_hash,
            set_layouts,
            push_constant_ranges,
            modules: param.modules.clone(),
        })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    pub fn shader_hash(&self) -> u64 {
        self.shader_hash
    }

    /// Set layouts indexed by set.
    pub fn set_layouts(&self) -> &[DescriptorSetLayout] {
        &self.set_layouts
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }

    pub fn modules(&self) -> &[Rc<ShaderModule>] {
        &self.modules
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // The set layouts are fields and are destroyed after this.
        self.device.destroy_pipeline_layout(self.handle);
    }
}

impl std::fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("handle", &self.handle)
            .field("set_layouts", &self.set_layouts.len())
            .field("push_constant_ranges", &self.push_constant_ranges)
            .finish()
    }
}
