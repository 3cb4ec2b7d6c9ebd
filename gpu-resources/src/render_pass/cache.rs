use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use crate::backend::GpuDevice;
use crate::cache::{CacheEntry, CacheHitCounter, GcTimer, drain_stale};
use crate::config::CacheConfig;
use crate::error::OrFatal;

use super::framebuffer::{Framebuffer, FramebufferParam};
use super::pass::{RenderPass, RenderPassParam};

/// Cache of render passes and the framebuffers built against them.
///
/// Every cached framebuffer holds a reference on its render pass. A render
/// pass is only evicted once it is stale and no framebuffer references it.
pub struct FboCache {
    device: Arc<dyn GpuDevice>,
    timer: GcTimer,
    framebuffers: HashMap<FramebufferParam, CacheEntry<Framebuffer>>,
    render_passes: HashMap<RenderPassParam, CacheEntry<RenderPass>>,
    ref_counts: HashMap<vk::RenderPass, u32>,
    render_pass_hit_counter: CacheHitCounter,
    framebuffer_hit_counter: CacheHitCounter,
}

impl FboCache {
    pub fn new(device: Arc<dyn GpuDevice>, config: &CacheConfig) -> Self {
        Self {
            device,
            timer: GcTimer::new(config.gc_period),
            framebuffers: HashMap::new(),
            render_passes: HashMap::new(),
            ref_counts: HashMap::new(),
            render_pass_hit_counter: CacheHitCounter::new("FBO Cache [Render Pass]"),
            framebuffer_hit_counter: CacheHitCounter::new("FBO Cache [Framebuffer]"),
        }
    }

    pub fn get_render_pass(&mut self, param: &RenderPassParam) -> vk::RenderPass {
        let epoch = self.timer.current_count();
        if let Some(entry) = self.render_passes.get_mut(param) {
            self.render_pass_hit_counter.hit();
            return entry.touch(epoch).handle();
        }

        self.render_pass_hit_counter.miss();
        let render_pass = RenderPass::new(self.device.clone(), param)
            .or_fatal("Failed to create render pass");
        let handle = render_pass.handle();
        log::debug!("Created render pass {:?}", handle);
        self.ref_counts.insert(handle, 0);
        self.render_passes
            .insert(*param, CacheEntry::new(render_pass, epoch));
        handle
    }

    /// Get the framebuffer for `param`. `param.render_pass` must come from
    /// [`get_render_pass`](Self::get_render_pass) on this cache.
    pub fn get_framebuffer(&mut self, param: &FramebufferParam) -> vk::Framebuffer {
        let epoch = self.timer.current_count();
        if let Some(entry) = self.framebuffers.get_mut(param) {
            self.framebuffer_hit_counter.hit();
            return entry.touch(epoch).handle();
        }

        self.framebuffer_hit_counter.miss();
        let ref_count = self
            .ref_counts
            .get_mut(&param.render_pass)
            .or_fatal("Framebuffer references a render pass this cache does not own");
        let framebuffer = Framebuffer::new(self.device.clone(), param)
            .or_fatal("Failed to create framebuffer");
        *ref_count += 1;

        let handle = framebuffer.handle();
        log::debug!(
            "Created framebuffer {:?} ({}x{}) for render pass {:?}",
            handle,
            param.width,
            param.height,
            param.render_pass
        );
        self.framebuffers
            .insert(*param, CacheEntry::new(framebuffer, epoch));
        handle
    }

    /// Advance the epoch, evict stale framebuffers, then evict stale render
    /// passes nothing references any more.
    pub fn gc(&mut self) {
        self.timer.tick();

        for (_, framebuffer) in drain_stale(&mut self.framebuffers, &self.timer) {
            if let Some(count) = self.ref_counts.get_mut(&framebuffer.render_pass()) {
                *count = count.saturating_sub(1);
            }
        }

        let timer = self.timer;
        let ref_counts = &mut self.ref_counts;
        self.render_passes.retain(|_, entry| {
            let handle = entry.value.handle();
            let unreferenced = ref_counts.get(&handle).map_or(true, |&count| count == 0);
            if timer.should_recycle(entry.last_accessed) && unreferenced {
                ref_counts.remove(&handle);
                log::trace!("Evicted render pass {:?}", handle);
                false
            } else {
                true
            }
        });
    }

    /// Destroy every framebuffer, then every render pass.
    pub fn reset(&mut self) {
        self.framebuffers.clear();
        self.ref_counts.clear();
        self.render_passes.clear();
    }

    /// Number of cached framebuffers referencing `render_pass`.
    pub fn ref_count(&self, render_pass: vk::RenderPass) -> Option<u32> {
        self.ref_counts.get(&render_pass).copied()
    }

    pub fn render_pass_count(&self) -> usize {
        self.render_passes.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn render_pass_hit_counter(&self) -> &CacheHitCounter {
        &self.render_pass_hit_counter
    }

    pub fn framebuffer_hit_counter(&self) -> &CacheHitCounter {
        &self.framebuffer_hit_counter
    }
}

impl Drop for FboCache {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for FboCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FboCache")
            .field("render_passes", &self.render_passes.len())
            .field("framebuffers", &self.framebuffers.len())
            .field("ref_counts", &self.ref_counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use ash::vk::Handle;

    fn cache(device: &Arc<DummyDevice>) -> FboCache {
        FboCache::new(device.clone(), &CacheConfig::new().with_gc_period(2))
    }

    fn color_pass() -> RenderPassParam {
        let mut param = RenderPassParam::default();
        param.color_formats[0] = vk::Format::B8G8R8A8_UNORM;
        param
    }

    fn framebuffer(render_pass: vk::RenderPass, view: u64) -> FramebufferParam {
        let mut param = FramebufferParam::new(render_pass, 128, 128);
        param.colors[0] = vk::ImageView::from_raw(view);
        param
    }

    #[test]
    fn test_render_pass_is_hash_consed() {
        let device = Arc::new(DummyDevice::new());
        let mut cache = cache(&device);
        let a = cache.get_render_pass(&color_pass());
        let b = cache.get_render_pass(&color_pass());
        assert_eq!(a, b);
        assert_eq!(device.stats().render_passes_created, 1);
        assert_eq!(cache.render_pass_hit_counter().hits(), 1);
    }

    #[test]
    fn test_framebuffers_pin_render_pass() {
        let device = Arc::new(DummyDevice::new());
        let mut cache = cache(&device);
        let render_pass = cache.get_render_pass(&color_pass());
        cache.get_framebuffer(&framebuffer(render_pass, 1));
        cache.get_framebuffer(&framebuffer(render_pass, 2));
        assert_eq!(cache.ref_count(render_pass), Some(2));

        // Keep one framebuffer alive while the render pass itself goes stale.
        for _ in 0..4 {
            cache.get_framebuffer(&framebuffer(render_pass, 1));
            cache.gc();
        }
        assert_eq!(cache.framebuffer_count(), 1);
        assert_eq!(cache.ref_count(render_pass), Some(1));
        assert_eq!(cache.render_pass_count(), 1);

        for _ in 0..4 {
            cache.gc();
        }
        assert_eq!(cache.framebuffer_count(), 0);
        assert_eq!(cache.render_pass_count(), 0);
        assert_eq!(cache.ref_count(render_pass), None);
        assert_eq!(device.stats().render_passes_destroyed, 1);
    }

    #[test]
    #[should_panic]
    fn test_framebuffer_needs_cached_render_pass() {
        let device = Arc::new(DummyDevice::new());
        let mut cache = cache(&device);
        cache.get_framebuffer(&framebuffer(vk::RenderPass::from_raw(999), 1));
    }

    #[test]
    fn test_reset_destroys_framebuffers_first() {
        let device = Arc::new(DummyDevice::new());
        let mut cache = cache(&device);
        let render_pass = cache.get_render_pass(&color_pass());
        cache.get_framebuffer(&framebuffer(render_pass, 1));
        cache.reset();
        let stats = device.stats();
        assert_eq!(stats.framebuffers_destroyed, 1);
        assert_eq!(stats.render_passes_destroyed, 1);
    }
}
