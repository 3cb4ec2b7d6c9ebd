//! Cache of pipeline layouts and descriptor sets.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::GpuDevice;
use crate::cache::{CacheEntry, CacheHitCounter, GcTimer, drain_stale};
use crate::config::CacheConfig;
use crate::error::OrFatal;
use crate::pipeline::{PipelineLayout, PipelineLayoutParam};
use crate::profile_scope;
use crate::shader::ShaderModule;

use super::allocator::DescriptorSetAllocator;
use super::builder::DescriptorBuilder;
use super::set::{DescriptorSet, DescriptorSetParam};

/// Owns pipeline layouts, one set allocator per set layout, and every
/// descriptor set written so far.
///
/// A descriptor set is keyed by its full contents plus the command buffer it
/// was bound on, so a set referenced by a pending command buffer is never
/// rewritten.
pub struct DescriptorCache {
    device: Arc<dyn GpuDevice>,
    config: CacheConfig,
    timer: GcTimer,
    layouts: HashMap<PipelineLayoutParam, CacheEntry<PipelineLayout>>,
    allocators: HashMap<vk::DescriptorSetLayout, DescriptorSetAllocator>,
    sets: HashMap<DescriptorSetParam, CacheEntry<DescriptorSet>>,
    layout_hit_counter: CacheHitCounter,
    set_hit_counter: CacheHitCounter,
}

impl DescriptorCache {
    pub fn new(device: Arc<dyn GpuDevice>, config: &CacheConfig) -> Self {
        Self {
            device,
            config: *config,
            timer: GcTimer::new(config.gc_period),
            layouts: HashMap::new(),
            allocators: HashMap::new(),
            sets: HashMap::new(),
            layout_hit_counter: CacheHitCounter::new("Pipeline Layout Cache"),
            set_hit_counter: CacheHitCounter::new("Descriptor Set Cache"),
        }
    }

    /// Get the pipeline layout for `modules`, creating it and its set
    /// allocators on first use.
    pub fn get_pipeline_layout(&mut self, modules: &[Rc<ShaderModule>]) -> &PipelineLayout {
        let epoch = self.timer.current_count();
        match self.layouts.entry(PipelineLayoutParam::new(modules.to_vec())) {
            Entry::Occupied(entry) => {
                self.layout_hit_counter.hit();
                let entry = entry.into_mut();
                entry.last_accessed = epoch;
                &entry.value
            }
            Entry::Vacant(entry) => {
                self.layout_hit_counter.miss();
                let layout = PipelineLayout::new(self.device.clone(), entry.key())
                    .or_fatal("Failed to create pipeline layout");
                for set_layout in layout.set_layouts() {
                    if set_layout.bindings().is_empty() {
                        continue;
                    }
                    self.allocators.insert(
                        set_layout.handle(),
                        DescriptorSetAllocator::new(self.device.clone(), set_layout, &self.config),
                    );
                }
                &entry.insert(CacheEntry::new(layout, epoch)).value
            }
        }
    }

    /// Size `builder`'s requirements for the layout of its bound modules.
    ///
    /// Sets without bindings get an unused requirement and are skipped at bind time.
    pub fn fill_requirements(&mut self, builder: &mut DescriptorBuilder) {
        let modules = builder.modules().to_vec();
        let layout = self.get_pipeline_layout(&modules);
        let handle = layout.handle();
        let set_layouts: Vec<(u32, vk::DescriptorSetLayout)> = layout
            .set_layouts()
            .iter()
            .map(|set_layout| (set_layout.set(), set_layout.handle()))
            .collect();

        let requirements = set_layouts
            .into_iter()
            .map(|(set, set_layout)| {
                let mut param = DescriptorSetParam::empty(set);
                if let Some(allocator) = self.allocators.get(&set_layout) {
                    allocator.fill_empty_param(&mut param);
                }
                param
            })
            .collect();
        builder.set_requirements(handle, requirements);
    }

    /// Get the descriptor set written with `param`, allocating and writing it
    /// on first use. Pending writes are applied on every call.
    pub fn get_descriptor_set(&mut self, param: &DescriptorSetParam) -> vk::DescriptorSet {
        let epoch = self.timer.current_count();
        if let Some(entry) = self.sets.get_mut(param) {
            self.set_hit_counter.hit();
            let set = entry.touch(epoch);
            set.apply_write(&*self.device);
            return set.handle();
        }

        self.set_hit_counter.miss();
        let limits = self.device.limits();
        let allocator = self
            .allocators
            .get_mut(&param.layout)
            .or_fatal("No descriptor set allocator for layout");
        let handle = allocator
            .allocate()
            .or_fatal("Failed to allocate descriptor set");
        let mut set = DescriptorSet::new(handle, param, allocator.bindings(), &limits)
            .or_fatal("Failed to build descriptor set");
        set.apply_write(&*self.device);
        self.sets.insert(param.clone(), CacheEntry::new(set, epoch));
        handle
    }

    /// Bind every used set of `builder` on `cmd`.
    ///
    /// Contiguous sets are bound with one call; unused sets split the calls.
    /// Returns the number of sets bound.
    pub fn bind_descriptor_sets(
        &mut self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        builder: &mut DescriptorBuilder,
    ) -> usize {
        profile_scope!("bind_descriptor_sets");
        let layout = builder.pipeline_layout();
        if layout == vk::PipelineLayout::null() {
            return 0;
        }
        builder.attach_command_buffer(cmd);

        let mut bound = 0;
        let mut first_set = 0;
        let mut run: Vec<vk::DescriptorSet> = Vec::new();
        let mut offsets: Vec<u32> = Vec::new();

        for param in builder.get_params() {
            if !param.is_used() {
                self.flush_run(cmd, bind_point, layout, first_set, &mut run, &mut offsets);
                continue;
            }
            if run.is_empty() {
                first_set = param.set;
            }
            run.push(self.get_descriptor_set(param));
            offsets.extend(builder.dynamic_offsets(param.set));
            bound += 1;
        }
        self.flush_run(cmd, bind_point, layout, first_set, &mut run, &mut offsets);
        bound
    }

    fn flush_run(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        run: &mut Vec<vk::DescriptorSet>,
        offsets: &mut Vec<u32>,
    ) {
        if run.is_empty() {
            return;
        }
        self.device
            .cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, run, offsets);
        run.clear();
        offsets.clear();
    }

    /// Advance the epoch and evict stale sets, then stale layouts.
    pub fn gc(&mut self) {
        profile_scope!("descriptor_cache_gc");
        self.timer.tick();

        for (param, set) in drain_stale(&mut self.sets, &self.timer) {
            if let Some(allocator) = self.allocators.get_mut(&param.layout) {
                allocator.release(set.handle());
            }
        }

        let stale_layouts = drain_stale(&mut self.layouts, &self.timer);
        if stale_layouts.is_empty() {
            return;
        }
        for (_, layout) in stale_layouts {
            let handles: Vec<vk::DescriptorSetLayout> =
                layout.set_layouts().iter().map(|l| l.handle()).collect();
            self.sets.retain(|param, _| !handles.contains(&param.layout));
            for handle in &handles {
                self.allocators.remove(handle);
            }
            log::trace!("Evicted pipeline layout {:?}", layout.handle());
        }
    }

    /// Drop every set, allocator and layout.
    pub fn reset(&mut self) {
        self.sets.clear();
        self.allocators.clear();
        self.layouts.clear();
    }

    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn allocator_count(&self) -> usize {
        self.allocators.len()
    }

    pub fn allocator(&self, layout: vk::DescriptorSetLayout) -> Option<&DescriptorSetAllocator> {
        self.allocators.get(&layout)
    }

    pub fn layout_hit_counter(&self) -> &CacheHitCounter {
        &self.layout_hit_counter
    }

    pub fn set_hit_counter(&self) -> &CacheHitCounter {
        &self.set_hit_counter
    }
}

impl Drop for DescriptorCache {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("layouts", &self.layouts.len())
            .field("allocators", &self.allocators.len())
            .field("sets", &self.sets.len())
            .field("epoch", &self.timer.current_count())
            .finish()
    }
}
