//! Compute pipeline cache.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::{ComputePipelineDesc, GpuDevice, ShaderStageDesc};
use crate::cache::{CacheEntry, CacheHitCounter, GcTimer, drain_stale};
use crate::config::CacheConfig;
use crate::descriptor::{DescriptorBuilder, DescriptorCache};
use crate::error::{OrFatal, fatal};
use crate::shader::{ShaderContentStore, ShaderModule, ShaderModuleCache, ShaderModuleParam};

use super::graphics::{ENTRY_POINT, Pipeline};
use super::specialization::SpecializationConstantInfo;

/// Everything a compute pipeline is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineParam {
    pub module: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub specialization: SpecializationConstantInfo,
}

/// Same flow as [`GraphicsPipelineCache`](super::GraphicsPipelineCache) with a
/// single compute module and no fixed-function state.
pub struct ComputePipelineCache {
    device: Arc<dyn GpuDevice>,
    timer: GcTimer,
    pipelines: HashMap<ComputePipelineParam, CacheEntry<Pipeline>>,
    builder: DescriptorBuilder,
    current_module: Option<Rc<ShaderModule>>,
    current_layout: vk::PipelineLayout,
    specialization: SpecializationConstantInfo,
    current_pipeline: vk::Pipeline,
    bound_cmd: vk::CommandBuffer,
    hit_counter: CacheHitCounter,
}

impl ComputePipelineCache {
    pub fn new(device: Arc<dyn GpuDevice>, config: &CacheConfig) -> Self {
        Self {
            device,
            timer: GcTimer::new(config.gc_period),
            pipelines: HashMap::new(),
            builder: DescriptorBuilder::new(),
            current_module: None,
            current_layout: vk::PipelineLayout::null(),
            specialization: SpecializationConstantInfo::new(),
            current_pipeline: vk::Pipeline::null(),
            bound_cmd: vk::CommandBuffer::null(),
            hit_counter: CacheHitCounter::new("Compute Pipeline Cache"),
        }
    }

    /// Make the module for `param` the active compute shader.
    pub fn bind_shader(
        &mut self,
        shaders: &mut ShaderModuleCache,
        store: &ShaderContentStore,
        param: &ShaderModuleParam,
    ) -> Rc<ShaderModule> {
        let module = shaders.get(store, param);
        if module.stage() != vk::ShaderStageFlags::COMPUTE {
            fatal(format_args!(
                "{} is a {:?} shader, not a compute shader",
                module.path(),
                module.stage()
            ));
        }
        self.current_module = Some(module.clone());
        module
    }

    pub fn bind_pipeline_layout(&mut self, descriptors: &mut DescriptorCache) -> vk::PipelineLayout {
        let modules: Vec<Rc<ShaderModule>> = self.current_module.iter().cloned().collect();
        self.builder.bind_shaders(&modules);
        descriptors.fill_requirements(&mut self.builder);
        self.current_layout = self.builder.pipeline_layout();
        self.current_layout
    }

    pub fn bind_specialization_constant(&mut self) -> &mut SpecializationConstantInfo {
        &mut self.specialization
    }

    pub fn bind_buffer(
        &mut self,
        name: &str,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        array_idx: u32,
    ) -> bool {
        self.builder.bind_buffer(name, buffer, offset, size, array_idx)
    }

    pub fn bind_image(
        &mut self,
        name: &str,
        sampler: vk::Sampler,
        image_view: vk::ImageView,
        array_idx: u32,
    ) -> bool {
        self.builder.bind_image(name, sampler, image_view, array_idx)
    }

    pub fn bind_descriptor_set(
        &mut self,
        cmd: vk::CommandBuffer,
        descriptors: &mut DescriptorCache,
    ) -> usize {
        descriptors.bind_descriptor_sets(cmd, vk::PipelineBindPoint::COMPUTE, &mut self.builder)
    }

    /// Resolve the pipeline for the bound module and bind it on `cmd`.
    pub fn bind_pipeline(&mut self, cmd: vk::CommandBuffer) -> vk::Pipeline {
        let module = self
            .current_module
            .clone()
            .or_fatal("No compute shader bound");
        let param = ComputePipelineParam {
            module: module.handle(),
            layout: self.current_layout,
            specialization: self.specialization.clone(),
        };

        let epoch = self.timer.current_count();
        let pipeline = match self.pipelines.get_mut(&param) {
            Some(entry) => {
                self.hit_counter.hit();
                entry.touch(epoch).handle()
            }
            None => {
                self.hit_counter.miss();
                let handle = self
                    .device
                    .create_compute_pipeline(&ComputePipelineDesc {
                        stage: ShaderStageDesc {
                            stage: vk::ShaderStageFlags::COMPUTE,
                            module: param.module,
                            entry_point: ENTRY_POINT,
                            specialization: &param.specialization,
                        },
                        layout: param.layout,
                    })
                    .or_fatal("Failed to create compute pipeline");
                log::debug!("Created compute pipeline {:?} for {}", handle, module.path());
                let pipeline = Pipeline::new(self.device.clone(), handle, vec![module]);
                self.pipelines.insert(param, CacheEntry::new(pipeline, epoch));
                handle
            }
        };

        if pipeline != self.current_pipeline || cmd != self.bound_cmd {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline);
            self.current_pipeline = pipeline;
            self.bound_cmd = cmd;
        }
        pipeline
    }

    /// Advance the epoch after `cmd` was flushed and evict stale pipelines.
    pub fn gc(&mut self, cmd: vk::CommandBuffer) {
        self.timer.tick();
        self.clear_bound_state(cmd);
        for (_, pipeline) in drain_stale(&mut self.pipelines, &self.timer) {
            log::trace!("Evicted compute pipeline {:?}", pipeline.handle());
        }
    }

    pub fn reset(&mut self) {
        self.clear_bound_state(self.bound_cmd);
        self.pipelines.clear();
    }

    fn clear_bound_state(&mut self, cmd: vk::CommandBuffer) {
        self.specialization.clear();
        self.current_module = None;
        self.current_layout = vk::PipelineLayout::null();
        self.builder.bind_shaders(&[]);
        if cmd == self.bound_cmd {
            self.current_pipeline = vk::Pipeline::null();
            self.bound_cmd = vk::CommandBuffer::null();
        }
    }

    pub fn descriptor_builder(&mut self) -> &mut DescriptorBuilder {
        &mut self.builder
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn hit_counter(&self) -> &CacheHitCounter {
        &self.hit_counter
    }
}

impl std::fmt::Debug for ComputePipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePipelineCache")
            .field("pipelines", &self.pipelines.len())
            .field("current_pipeline", &self.current_pipeline)
            .finish()
    }
}
