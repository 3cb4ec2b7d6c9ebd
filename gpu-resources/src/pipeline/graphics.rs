//! Graphics pipeline cache and its per-draw binding state.

use std::collections::HashMap;
use std::ffi::CStr;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::{GpuDevice, GraphicsPipelineDesc, ShaderStageDesc};
use crate::cache::{CacheEntry, CacheHitCounter, GcTimer, drain_stale};
use crate::config::CacheConfig;
use crate::descriptor::{DescriptorBuilder, DescriptorCache};
use crate::error::OrFatal;
use crate::profile_scope;
use crate::shader::{ShaderContentStore, ShaderModule, ShaderModuleCache, ShaderModuleParam};

use super::raster::RasterState;
use super::specialization::SpecializationConstantInfo;

pub(crate) const ENTRY_POINT: &CStr = c"main";

/// Everything a graphics pipeline is built from; the pipeline cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineParam {
    pub stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    pub layout: vk::PipelineLayout,
    pub specialization: SpecializationConstantInfo,
    pub raster: RasterState,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

/// A native pipeline, keeping its shader modules alive.
pub struct Pipeline {
    device: Arc<dyn GpuDevice>,
    handle: vk::Pipeline,
    _modules: Vec<Rc<ShaderModule>>,
}

impl Pipeline {
    pub(crate) fn new(
        device: Arc<dyn GpuDevice>,
        handle: vk::Pipeline,
        modules: Vec<Rc<ShaderModule>>,
    ) -> Self {
        Self {
            device,
            handle,
            _modules: modules,
        }
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("handle", &self.handle).finish()
    }
}

/// Builds graphics pipelines from the currently bound shaders, layout,
/// specialization constants, raster state and render pass.
///
/// # Per-draw flow
///
/// ```ignore
/// cache.bind_shader(&mut shaders, &store, &vertex);
/// cache.bind_shader(&mut shaders, &store, &fragment);
/// cache.bind_pipeline_layout(&mut descriptors);
/// cache.bind_buffer("Globals", buffer, 0, 64, 0);
/// cache.bind_render_pass(render_pass, 0);
/// cache.bind_descriptor_set(cmd, &mut descriptors);
/// cache.bind_pipeline(cmd);
/// ```
pub struct GraphicsPipelineCache {
    device: Arc<dyn GpuDevice>,
    timer: GcTimer,
    pipelines: HashMap<GraphicsPipelineParam, CacheEntry<Pipeline>>,
    builder: DescriptorBuilder,
    current_modules: Vec<Rc<ShaderModule>>,
    current_layout: vk::PipelineLayout,
    specialization: SpecializationConstantInfo,
    raster: RasterState,
    render_pass: vk::RenderPass,
    subpass: u32,
    /// Pipeline last bound on `bound_cmd`.
    current_pipeline: vk::Pipeline,
    bound_cmd: vk::CommandBuffer,
    hit_counter: CacheHitCounter,
}

impl GraphicsPipelineCache {
    pub fn new(device: Arc<dyn GpuDevice>, config: &CacheConfig) -> Self {
        Self {
            device,
            timer: GcTimer::new(config.gc_period),
            pipelines: HashMap::new(),
            builder: DescriptorBuilder::new(),
            current_modules: Vec::new(),
            current_layout: vk::PipelineLayout::null(),
            specialization: SpecializationConstantInfo::new(),
            raster: RasterState::default(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            current_pipeline: vk::Pipeline::null(),
            bound_cmd: vk::CommandBuffer::null(),
            hit_counter: CacheHitCounter::new("Graphics Pipeline Cache"),
        }
    }

    /// Add the module for `param` to the active shader set.
    ///
    /// The set is kept ordered by stage bit, so the layout and pipeline keys
    /// do not depend on bind order.
    pub fn bind_shader(
        &mut self,
        shaders: &mut ShaderModuleCache,
        store: &ShaderContentStore,
        param: &ShaderModuleParam,
    ) -> Rc<ShaderModule> {
        let module = shaders.get(store, param);
        let stage = module.stage().as_raw();
        let index = self
            .current_modules
            .partition_point(|bound| bound.stage().as_raw() <= stage);
        self.current_modules.insert(index, module.clone());
        module
    }

    /// Resolve the pipeline layout of the active shaders and size the
    /// descriptor requirements for it.
    pub fn bind_pipeline_layout(&mut self, descriptors: &mut DescriptorCache) -> vk::PipelineLayout {
        self.builder.bind_shaders(&self.current_modules);
        descriptors.fill_requirements(&mut self.builder);
        self.current_layout = self.builder.pipeline_layout();
        self.current_layout
    }

    /// Specialization constants used by the next pipeline.
    pub fn bind_specialization_constant(&mut self) -> &mut SpecializationConstantInfo {
        &mut self.specialization
    }

    pub fn bind_raster_state(&mut self, raster: RasterState) {
        self.raster = raster;
    }

    pub fn bind_render_pass(&mut self, render_pass: vk::RenderPass, subpass: u32) {
        self.render_pass = render_pass;
        self.subpass = subpass;
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

    pub fn bind_input_attachment(&mut self, name: &str, image_view: vk::ImageView) -> bool {
        self.builder
            .bind_input_attachment(name, image_view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// Resolve and bind the descriptor sets filled so far.
    pub fn bind_descriptor_set(
        &mut self,
        cmd: vk::CommandBuffer,
        descriptors: &mut DescriptorCache,
    ) -> usize {
        descriptors.bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, &mut self.builder)
    }

    /// Resolve the pipeline for the bound state and bind it on `cmd`.
    ///
    /// The native bind is skipped when the same pipeline is already bound on `cmd`.
    pub fn bind_pipeline(&mut self, cmd: vk::CommandBuffer) -> vk::Pipeline {
        profile_scope!("bind_graphics_pipeline");
        let param = GraphicsPipelineParam {
            stages: self
                .current_modules
                .iter()
                .map(|module| (module.stage(), module.handle()))
                .collect(),
            layout: self.current_layout,
            specialization: self.specialization.clone(),
            raster: self.raster,
            render_pass: self.render_pass,
            subpass: self.subpass,
        };

        let pipeline = self.get_pipeline(param);
        if pipeline == self.current_pipeline && cmd == self.bound_cmd {
            return pipeline;
        }
        self.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        self.current_pipeline = pipeline;
        self.bound_cmd = cmd;
        pipeline
    }

    fn get_pipeline(&mut self, param: GraphicsPipelineParam) -> vk::Pipeline {
        let epoch = self.timer.current_count();
        if let Some(entry) = self.pipelines.get_mut(&param) {
            self.hit_counter.hit();
            return entry.touch(epoch).handle();
        }

        self.hit_counter.miss();
        let stages: Vec<ShaderStageDesc<'_>> = param
            .stages
            .iter()
            .map(|&(stage, module)| ShaderStageDesc {
                stage,
                module,
                entry_point: ENTRY_POINT,
                specialization: &param.specialization,
            })
            .collect();
        let handle = self
            .device
            .create_graphics_pipeline(&GraphicsPipelineDesc {
                stages: &stages,
                raster: &param.raster,
                layout: param.layout,
                render_pass: param.render_pass,
                subpass: param.subpass,
            })
            .or_fatal("Failed to create graphics pipeline");
        log::debug!(
            "Created graphics pipeline {:?} with {} stages",
            handle,
            stages.len()
        );

        let pipeline = Pipeline::new(self.device.clone(), handle, self.current_modules.clone());
        self.pipelines.insert(param, CacheEntry::new(pipeline, epoch));
        handle
    }

    /// Advance the epoch after `cmd` was flushed, clear the per-draw state and
    /// evict stale pipelines.
    pub fn gc(&mut self, cmd: vk::CommandBuffer) {
        self.timer.tick();
        self.clear_bound_state(cmd);
        for (_, pipeline) in drain_stale(&mut self.pipelines, &self.timer) {
            log::trace!("Evicted graphics pipeline {:?}", pipeline.handle());
        }
    }

    /// Drop every pipeline and all bound state.
    pub fn reset(&mut self) {
        self.clear_bound_state(self.bound_cmd);
        self.raster = RasterState::default();
        self.render_pass = vk::RenderPass::null();
        self.subpass = 0;
        self.pipelines.clear();
    }

    /// Forget the shader set of the current draw along with its descriptor
    /// binds and specialization constants. Raster state and render pass stay.
    pub fn unbind_pipeline(&mut self) {
        self.specialization.clear();
        self.current_modules.clear();
        self.current_layout = vk::PipelineLayout::null();
        self.builder.bind_shaders(&[]);
    }

    fn clear_bound_state(&mut self, cmd: vk::CommandBuffer) {
        self.unbind_pipeline();
        if cmd == self.bound_cmd {
            self.current_pipeline = vk::Pipeline::null();
            self.bound_cmd = vk::CommandBuffer::null();
        }
    }

    /// Builder holding the descriptor binds of the current draw.
    pub fn descriptor_builder(&mut self) -> &mut DescriptorBuilder {
        &mut self.builder
    }

    pub fn current_modules(&self) -> &[Rc<ShaderModule>] {
        &self.current_modules
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

impl std::fmt::Debug for GraphicsPipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipelineCache")
            .field("pipelines", &self.pipelines.len())
            .field("current_modules", &self.current_modules.len())
            .field("current_pipeline", &self.current_pipeline)
            .finish()
    }
}
