//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It mints unique handles,
//! keeps enough bookkeeping to validate how the caches drive it (descriptor
//! pool capacity, fence states) and counts every call so tests can assert on
//! how many native objects were built or written.

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;

use crate::error::GpuError;

use super::{
    ComputePipelineDesc, DescriptorPoolDesc, DescriptorWrite, DeviceLimits, FramebufferDesc,
    GpuDevice, GraphicsPipelineDesc, LayoutBinding, RenderPassDesc, SamplerDesc, SubmitDesc,
};

/// Call statistics collected by [`DummyDevice`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummyStats {
    pub shader_modules_created: usize,
    pub shader_modules_destroyed: usize,
    pub descriptor_set_layouts_created: usize,
    pub descriptor_set_layouts_destroyed: usize,
    pub descriptor_pools_created: usize,
    pub descriptor_pools_destroyed: usize,
    pub descriptor_pool_resets: usize,
    pub descriptor_sets_allocated: usize,
    /// Total number of descriptor writes applied.
    pub descriptor_writes: usize,
    pub pipeline_layouts_created: usize,
    pub pipeline_layouts_destroyed: usize,
    pub graphics_pipelines_created: usize,
    pub compute_pipelines_created: usize,
    pub pipelines_destroyed: usize,
    pub render_passes_created: usize,
    pub render_passes_destroyed: usize,
    pub framebuffers_created: usize,
    pub framebuffers_destroyed: usize,
    pub samplers_created: usize,
    pub samplers_destroyed: usize,
    pub command_pool_resets: usize,
    pub command_buffer_resets: usize,
    pub command_buffers_begun: usize,
    pub fence_waits: usize,
    pub submissions: usize,
    pub descriptor_set_binds: usize,
    pub pipeline_binds: usize,
}

/// A recorded queue submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRecord {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

/// A recorded `cmd_bind_descriptor_sets` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorBindRecord {
    pub command_buffer: vk::CommandBuffer,
    pub layout: vk::PipelineLayout,
    pub first_set: u32,
    pub sets: Vec<vk::DescriptorSet>,
    pub dynamic_offsets: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

#[derive(Debug, Clone, Copy)]
struct PoolState {
    max_sets: u32,
    allocated: u32,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u64,
    stats: DummyStats,
    fences: HashMap<vk::Fence, FenceState>,
    pools: HashMap<vk::DescriptorPool, PoolState>,
    set_layouts: HashMap<vk::DescriptorSetLayout, Vec<LayoutBinding>>,
    render_passes: HashMap<vk::RenderPass, RenderPassDesc>,
    framebuffers: HashMap<vk::Framebuffer, Vec<vk::ImageView>>,
    writes: Vec<DescriptorWrite>,
    submissions: Vec<SubmitRecord>,
    descriptor_binds: Vec<DescriptorBindRecord>,
}

impl DummyState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn next<H: Handle>(&mut self) -> H {
        H::from_raw(self.next_raw())
    }
}

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    limits: DeviceLimits,
    /// Signal fences at submission instead of on the first wait.
    auto_complete: bool,
    fail_creation: Mutex<bool>,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a dummy device whose submissions complete immediately.
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            auto_complete: true,
            fail_creation: Mutex::new(false),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Override the reported device limits.
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Keep submitted work pending until someone waits on its fence.
    pub fn with_deferred_completion(mut self) -> Self {
        self.auto_complete = false;
        self
    }

    /// Make every subsequent `create_*` call fail.
    pub fn set_fail_creation(&self, fail: bool) {
        *self.fail_creation.lock() = fail;
    }

    /// Snapshot of the call statistics.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats.clone()
    }

    /// All submissions in order.
    pub fn submissions(&self) -> Vec<SubmitRecord> {
        self.state.lock().submissions.clone()
    }

    /// All descriptor writes in order.
    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.state.lock().writes.clone()
    }

    /// All descriptor set bind calls in order.
    pub fn descriptor_binds(&self) -> Vec<DescriptorBindRecord> {
        self.state.lock().descriptor_binds.clone()
    }

    /// Bindings a live descriptor set layout was created with.
    pub fn set_layout_bindings(&self, layout: vk::DescriptorSetLayout) -> Option<Vec<LayoutBinding>> {
        self.state.lock().set_layouts.get(&layout).cloned()
    }

    /// Description a live render pass was created with.
    pub fn render_pass_desc(&self, render_pass: vk::RenderPass) -> Option<RenderPassDesc> {
        self.state.lock().render_passes.get(&render_pass).cloned()
    }

    /// Attachments a live framebuffer was created with.
    pub fn framebuffer_attachments(&self, framebuffer: vk::Framebuffer) -> Option<Vec<vk::ImageView>> {
        self.state.lock().framebuffers.get(&framebuffer).cloned()
    }

    /// Number of submitted fences that have not completed yet.
    pub fn pending_fences(&self) -> usize {
        self.state
            .lock()
            .fences
            .values()
            .filter(|fence| fence.pending)
            .count()
    }

    /// Complete every pending submission.
    pub fn complete_all(&self) {
        for fence in self.state.lock().fences.values_mut() {
            if fence.pending {
                fence.pending = false;
                fence.signaled = true;
            }
        }
    }

    fn check_creation(&self, what: &str) -> Result<(), GpuError> {
        if *self.fail_creation.lock() {
            return Err(GpuError::ResourceCreationFailed(format!(
                "DummyDevice: {what} creation disabled"
            )));
        }
        Ok(())
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule, GpuError> {
        self.check_creation("shader module")?;
        let mut state = self.state.lock();
        state.stats.shader_modules_created += 1;
        let module = state.next();
        log::trace!("DummyDevice: creating shader module {module:?} ({} words)", code.len());
        Ok(module)
    }

    fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        self.state.lock().stats.shader_modules_destroyed += 1;
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
        _flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<vk::DescriptorSetLayout, GpuError> {
        self.check_creation("descriptor set layout")?;
        let mut state = self.state.lock();
        state.stats.descriptor_set_layouts_created += 1;
        let layout = state.next();
        state.set_layouts.insert(layout, bindings.to_vec());
        log::trace!("DummyDevice: creating descriptor set layout {layout:?}");
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.state.lock();
        state.stats.descriptor_set_layouts_destroyed += 1;
        state.set_layouts.remove(&layout);
    }

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDesc<'_>,
    ) -> Result<vk::DescriptorPool, GpuError> {
        self.check_creation("descriptor pool")?;
        let mut state = self.state.lock();
        state.stats.descriptor_pools_created += 1;
        let pool = state.next();
        state.pools.insert(
            pool,
            PoolState {
                max_sets: desc.max_sets,
                allocated: 0,
            },
        );
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.stats.descriptor_pool_resets += 1;
        match state.pools.get_mut(&pool) {
            Some(pool) => {
                pool.allocated = 0;
                Ok(())
            }
            None => Err(GpuError::InvalidParameter(format!(
                "unknown descriptor pool {pool:?}"
            ))),
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        state.stats.descriptor_pools_destroyed += 1;
        state.pools.remove(&pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
        _variable_count: Option<u32>,
    ) -> Result<vk::DescriptorSet, GpuError> {
        let mut state = self.state.lock();
        let Some(pool_state) = state.pools.get_mut(&pool) else {
            return Err(GpuError::InvalidParameter(format!(
                "unknown descriptor pool {pool:?}"
            )));
        };
        if pool_state.allocated >= pool_state.max_sets {
            return Err(GpuError::vulkan(
                "vkAllocateDescriptorSets",
                vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            ));
        }
        pool_state.allocated += 1;
        state.stats.descriptor_sets_allocated += 1;
        Ok(state.next())
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let mut state = self.state.lock();
        state.stats.descriptor_writes += writes.len();
        state.writes.extend_from_slice(writes);
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout, GpuError> {
        self.check_creation("pipeline layout")?;
        let mut state = self.state.lock();
        state.stats.pipeline_layouts_created += 1;
        Ok(state.next())
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.state.lock().stats.pipeline_layouts_destroyed += 1;
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<vk::Pipeline, GpuError> {
        self.check_creation("graphics pipeline")?;
        let mut state = self.state.lock();
        state.stats.graphics_pipelines_created += 1;
        let pipeline = state.next();
        log::trace!(
            "DummyDevice: creating graphics pipeline {pipeline:?} ({} stages)",
            desc.stages.len()
        );
        Ok(pipeline)
    }

    fn create_compute_pipeline(
        &self,
        _desc: &ComputePipelineDesc<'_>,
    ) -> Result<vk::Pipeline, GpuError> {
        self.check_creation("compute pipeline")?;
        let mut state = self.state.lock();
        state.stats.compute_pipelines_created += 1;
        Ok(state.next())
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        self.state.lock().stats.pipelines_destroyed += 1;
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass, GpuError> {
        self.check_creation("render pass")?;
        let mut state = self.state.lock();
        state.stats.render_passes_created += 1;
        let render_pass = state.next();
        state.render_passes.insert(render_pass, desc.clone());
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut state = self.state.lock();
        state.stats.render_passes_destroyed += 1;
        state.render_passes.remove(&render_pass);
    }

    fn create_framebuffer(
        &self,
        desc: &FramebufferDesc<'_>,
    ) -> Result<vk::Framebuffer, GpuError> {
        self.check_creation("framebuffer")?;
        let mut state = self.state.lock();
        if !state.render_passes.contains_key(&desc.render_pass) {
            return Err(GpuError::InvalidParameter(format!(
                "framebuffer references destroyed render pass {:?}",
                desc.render_pass
            )));
        }
        state.stats.framebuffers_created += 1;
        let framebuffer = state.next();
        state.framebuffers.insert(framebuffer, desc.attachments.to_vec());
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock();
        state.stats.framebuffers_destroyed += 1;
        state.framebuffers.remove(&framebuffer);
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<vk::Sampler, GpuError> {
        self.check_creation("sampler")?;
        let mut state = self.state.lock();
        state.stats.samplers_created += 1;
        Ok(state.next())
    }

    fn destroy_sampler(&self, _sampler: vk::Sampler) {
        self.state.lock().stats.samplers_destroyed += 1;
    }

    fn create_command_pool(&self) -> Result<vk::CommandPool, GpuError> {
        self.check_creation("command pool")?;
        Ok(self.state.lock().next())
    }

    fn reset_command_pool(&self, _pool: vk::CommandPool) -> Result<(), GpuError> {
        self.state.lock().stats.command_pool_resets += 1;
        Ok(())
    }

    fn destroy_command_pool(&self, _pool: vk::CommandPool) {}

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, GpuError> {
        let mut state = self.state.lock();
        Ok((0..count).map(|_| state.next()).collect())
    }

    fn begin_command_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> Result<(), GpuError> {
        self.state.lock().stats.command_buffers_begun += 1;
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> Result<(), GpuError> {
        Ok(())
    }

    fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> Result<(), GpuError> {
        self.state.lock().stats.command_buffer_resets += 1;
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, GpuError> {
        self.check_creation("fence")?;
        let mut state = self.state.lock();
        let fence = state.next();
        state.fences.insert(
            fence,
            FenceState {
                signaled,
                pending: false,
            },
        );
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state.lock().fences.remove(&fence);
    }

    fn fence_status(&self, fence: vk::Fence) -> Result<bool, GpuError> {
        self.state
            .lock()
            .fences
            .get(&fence)
            .map(|state| state.signaled)
            .ok_or_else(|| GpuError::InvalidParameter(format!("unknown fence {fence:?}")))
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.stats.fence_waits += 1;
        for fence in fences {
            let Some(fence_state) = state.fences.get_mut(fence) else {
                return Err(GpuError::InvalidParameter(format!("unknown fence {fence:?}")));
            };
            if fence_state.signaled {
                continue;
            }
            if !fence_state.pending {
                // A real device would block forever here.
                return Err(GpuError::InvalidParameter(format!(
                    "waiting on fence {fence:?} that was never submitted"
                )));
            }
            fence_state.pending = false;
            fence_state.signaled = true;
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        for fence in fences {
            if let Some(fence_state) = state.fences.get_mut(fence) {
                *fence_state = FenceState::default();
            }
        }
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore, GpuError> {
        self.check_creation("semaphore")?;
        Ok(self.state.lock().next())
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {}

    fn queue_submit(&self, submit: &SubmitDesc<'_>) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.stats.submissions += 1;
        state.submissions.push(SubmitRecord {
            command_buffer: submit.command_buffer,
            wait_semaphores: submit.wait_semaphores.to_vec(),
            signal_semaphores: submit.signal_semaphores.to_vec(),
            fence: submit.fence,
        });
        let auto_complete = self.auto_complete;
        if let Some(fence) = state.fences.get_mut(&submit.fence) {
            if auto_complete {
                fence.signaled = true;
            } else {
                fence.pending = true;
            }
        }
        Ok(())
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        let mut state = self.state.lock();
        state.stats.descriptor_set_binds += 1;
        state.descriptor_binds.push(DescriptorBindRecord {
            command_buffer,
            layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_bind_pipeline(
        &self,
        _command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _pipeline: vk::Pipeline,
    ) {
        self.state.lock().stats.pipeline_binds += 1;
    }
}
