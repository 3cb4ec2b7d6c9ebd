//! The render context: one owner for the content store, every cache and the
//! command buffer ring.

use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::GpuDevice;
use crate::command::CommandBufferRing;
use crate::config::CacheConfig;
use crate::descriptor::DescriptorCache;
use crate::error::GpuError;
use crate::pipeline::{ComputePipelineCache, GraphicsPipelineCache};
use crate::render_pass::FboCache;
use crate::sampler::SamplerCache;
use crate::shader::{ShaderContentStore, ShaderModule, ShaderModuleCache, ShaderModuleParam};
use crate::{frame_mark, profile_plot};

/// Frame-driving entry point.
///
/// Flushing the ring through [`flush`](Self::flush) advances every cache's
/// epoch and evicts stale entries.
///
/// # Example
///
/// ```ignore
/// let mut ctx = GpuContext::new(device, CacheConfig::default())?;
/// ctx.store_mut().insert("mesh.vert.spv", vertex_words);
///
/// let cmd = ctx.command_buffer();
/// ctx.bind_graphics_shader(&vertex);
/// ctx.bind_graphics_shader(&fragment);
/// ctx.bind_graphics_pipeline_layout();
/// ctx.graphics().bind_buffer("Globals", buffer, 0, 64, 0);
/// ctx.graphics().bind_render_pass(render_pass, 0);
/// ctx.bind_graphics_descriptor_sets(cmd);
/// ctx.graphics().bind_pipeline(cmd);
/// ctx.flush();
/// ```
pub struct GpuContext {
    // Dropped first so in-flight work drains before cached objects are destroyed.
    ring: CommandBufferRing,
    graphics: GraphicsPipelineCache,
    compute: ComputePipelineCache,
    descriptors: DescriptorCache,
    fbo: FboCache,
    samplers: SamplerCache,
    shaders: ShaderModuleCache,
    store: ShaderContentStore,
    device: Arc<dyn GpuDevice>,
    config: CacheConfig,
}

impl GpuContext {
    pub fn new(device: Arc<dyn GpuDevice>, config: CacheConfig) -> Result<Self, GpuError> {
        let ring = CommandBufferRing::new(device.clone(), &config)?;
        log::info!(
            "GPU context created on {} backend ({} command buffers, gc period {})",
            device.name(),
            config.command_buffer_count,
            config.gc_period
        );
        Ok(Self {
            ring,
            graphics: GraphicsPipelineCache::new(device.clone(), &config),
            compute: ComputePipelineCache::new(device.clone(), &config),
            descriptors: DescriptorCache::new(device.clone(), &config),
            fbo: FboCache::new(device.clone(), &config),
            samplers: SamplerCache::new(device.clone()),
            shaders: ShaderModuleCache::new(device.clone()),
            store: ShaderContentStore::new(),
            device,
            config,
        })
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &ShaderContentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ShaderContentStore {
        &mut self.store
    }

    pub fn shaders(&mut self) -> &mut ShaderModuleCache {
        &mut self.shaders
    }

    pub fn descriptors(&mut self) -> &mut DescriptorCache {
        &mut self.descriptors
    }

    pub fn graphics(&mut self) -> &mut GraphicsPipelineCache {
        &mut self.graphics
    }

    pub fn compute(&mut self) -> &mut ComputePipelineCache {
        &mut self.compute
    }

    pub fn fbo(&mut self) -> &mut FboCache {
        &mut self.fbo
    }

    pub fn samplers(&mut self) -> &mut SamplerCache {
        &mut self.samplers
    }

    pub fn ring(&mut self) -> &mut CommandBufferRing {
        &mut self.ring
    }

    /// Module for `param`, created on first use.
    pub fn shader_module(&mut self, param: &ShaderModuleParam) -> Rc<ShaderModule> {
        self.shaders.get(&self.store, param)
    }

    /// The recording command buffer.
    pub fn command_buffer(&mut self) -> vk::CommandBuffer {
        self.ring.get()
    }

    pub fn bind_graphics_shader(&mut self, param: &ShaderModuleParam) -> Rc<ShaderModule> {
        self.graphics
            .bind_shader(&mut self.shaders, &self.store, param)
    }

    pub fn bind_graphics_pipeline_layout(&mut self) -> vk::PipelineLayout {
        self.graphics.bind_pipeline_layout(&mut self.descriptors)
    }

    pub fn bind_graphics_descriptor_sets(&mut self, cmd: vk::CommandBuffer) -> usize {
        self.graphics
            .bind_descriptor_set(cmd, &mut self.descriptors)
    }

    pub fn bind_compute_shader(&mut self, param: &ShaderModuleParam) -> Rc<ShaderModule> {
        self.compute
            .bind_shader(&mut self.shaders, &self.store, param)
    }

    pub fn bind_compute_pipeline_layout(&mut self) -> vk::PipelineLayout {
        self.compute.bind_pipeline_layout(&mut self.descriptors)
    }

    pub fn bind_compute_descriptor_sets(&mut self, cmd: vk::CommandBuffer) -> usize {
        self.compute
            .bind_descriptor_set(cmd, &mut self.descriptors)
    }

    /// Submit the recording buffer and run one garbage collection step.
    ///
    /// Returns `false` (and collects nothing) if no buffer was recording.
    pub fn flush(&mut self) -> bool {
        let Some(cmd) = self.ring.active() else {
            return false;
        };
        if !self.ring.flush() {
            return false;
        }

        self.graphics.gc(cmd);
        self.compute.gc(cmd);
        self.descriptors.gc();
        self.fbo.gc();

        profile_plot!("graphics_pipelines", self.graphics.len());
        profile_plot!("descriptor_sets", self.descriptors.set_count());
        profile_plot!("framebuffers", self.fbo.framebuffer_count());
        frame_mark!();
        true
    }

    /// Block until all submitted work has completed and recycle the ring.
    pub fn wait(&mut self) {
        self.ring.wait();
        self.ring.gc();
    }

    /// Drain the GPU and drop every cached object.
    pub fn reset(&mut self) {
        self.wait();
        self.graphics.reset();
        self.compute.reset();
        self.descriptors.reset();
        self.fbo.reset();
        self.samplers.reset();
        self.shaders.reset();
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("backend", &self.device.name())
            .field("ring", &self.ring)
            .field("descriptors", &self.descriptors)
            .field("fbo", &self.fbo)
            .finish()
    }
}
