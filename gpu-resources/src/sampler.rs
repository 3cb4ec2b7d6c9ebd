//! Sampler parameters and the sampler cache.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use crate::backend::{GpuDevice, SamplerDesc};
use crate::cache::CacheHitCounter;
use crate::error::OrFatal;

/// Magnification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MagFilter {
    #[default]
    Nearest,
    Linear,
}

/// Minification filter together with the mip mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MinFilter {
    #[default]
    NearestNoMipmap,
    LinearNoMipmap,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl MinFilter {
    fn filter(self) -> vk::Filter {
        match self {
            Self::NearestNoMipmap | Self::NearestMipmapNearest | Self::NearestMipmapLinear => {
                vk::Filter::NEAREST
            }
            Self::LinearNoMipmap | Self::LinearMipmapNearest | Self::LinearMipmapLinear => {
                vk::Filter::LINEAR
            }
        }
    }

    fn mipmap_mode(self) -> vk::SamplerMipmapMode {
        match self {
            Self::NearestMipmapLinear | Self::LinearMipmapLinear => vk::SamplerMipmapMode::LINEAR,
            _ => vk::SamplerMipmapMode::NEAREST,
        }
    }

    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Self::NearestNoMipmap | Self::LinearNoMipmap)
    }

    fn max_lod(self) -> f32 {
        // 0.25 with NEAREST mip mode emulates a non-mipmapped minification filter.
        if self.uses_mipmaps() { 12.0 } else { 0.25 }
    }
}

/// Sampler state; the sampler cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerParam {
    pub mag: MagFilter,
    pub min: MinFilter,
    pub address_u: vk::SamplerAddressMode,
    pub address_v: vk::SamplerAddressMode,
    pub address_w: vk::SamplerAddressMode,
    pub compare: Option<vk::CompareOp>,
    /// 0 disables anisotropic filtering.
    pub max_anisotropy: u8,
}

impl Default for SamplerParam {
    fn default() -> Self {
        Self {
            mag: MagFilter::Nearest,
            min: MinFilter::NearestNoMipmap,
            address_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            compare: None,
            max_anisotropy: 16,
        }
    }
}

impl SamplerParam {
    /// Native sampler description.
    pub fn desc(&self) -> SamplerDesc {
        SamplerDesc {
            mag_filter: match self.mag {
                MagFilter::Nearest => vk::Filter::NEAREST,
                MagFilter::Linear => vk::Filter::LINEAR,
            },
            min_filter: self.min.filter(),
            mipmap_mode: self.min.mipmap_mode(),
            address_mode_u: self.address_u,
            address_mode_v: self.address_v,
            address_mode_w: self.address_w,
            max_anisotropy: (self.max_anisotropy > 0).then_some(f32::from(self.max_anisotropy)),
            compare_op: self.compare,
            min_lod: 0.0,
            max_lod: self.min.max_lod(),
            border_color: vk::BorderColor::FLOAT_OPAQUE_BLACK,
        }
    }
}

/// Cache of samplers. Samplers are never evicted, only dropped by [`reset`](Self::reset).
pub struct SamplerCache {
    device: Arc<dyn GpuDevice>,
    samplers: HashMap<SamplerParam, vk::Sampler>,
    hit_counter: CacheHitCounter,
}

impl SamplerCache {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            samplers: HashMap::new(),
            hit_counter: CacheHitCounter::new("Sampler Cache"),
        }
    }

    pub fn get(&mut self, param: &SamplerParam) -> vk::Sampler {
        if let Some(&sampler) = self.samplers.get(param) {
            self.hit_counter.hit();
            return sampler;
        }
        self.hit_counter.miss();
        let sampler = self
            .device
            .create_sampler(&param.desc())
            .or_fatal("Failed to create sampler");
        log::debug!("Created sampler {:?} for {:?}", sampler, param);
        self.samplers.insert(*param, sampler);
        sampler
    }

    pub fn reset(&mut self) {
        for (_, sampler) in self.samplers.drain() {
            self.device.destroy_sampler(sampler);
        }
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn hit_counter(&self) -> &CacheHitCounter {
        &self.hit_counter
    }
}

impl Drop for SamplerCache {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for SamplerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerCache")
            .field("samplers", &self.samplers.len())
            .finish()
    }
}
