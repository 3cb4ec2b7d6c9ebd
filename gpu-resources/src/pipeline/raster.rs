//! Fixed-function state of a graphics pipeline.

use std::hash::{Hash, Hasher};

use ash::vk;

/// Blend state applied to every colour target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendState {
    pub blend_enable: bool,
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color: vk::BlendFactor::ONE,
            dst_color: vk::BlendFactor::ZERO,
            color_op: vk::BlendOp::ADD,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendState {
    /// Straight (non-premultiplied) alpha blending.
    pub fn alpha_blending() -> Self {
        Self {
            blend_enable: true,
            src_color: vk::BlendFactor::SRC_ALPHA,
            dst_color: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            ..Self::default()
        }
    }
}

/// Rasterization, depth and blend state of a graphics pipeline.
///
/// Depth testing is always on; `depth_write` and `depth_compare` shape it.
#[derive(Debug, Clone, Copy)]
pub struct RasterState {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope: f32,
    pub samples: vk::SampleCountFlags,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub color_target_count: u32,
    pub blend: ColorBlendState,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: false,
            depth_bias_constant: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope: 0.0,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            color_target_count: 1,
            blend: ColorBlendState::default(),
        }
    }
}

type RasterKey = (
    vk::PrimitiveTopology,
    vk::PolygonMode,
    vk::CullModeFlags,
    vk::FrontFace,
    bool,
    [u32; 3],
    vk::SampleCountFlags,
    bool,
    vk::CompareOp,
    u32,
    ColorBlendState,
);

impl RasterState {
    // Floats compare and hash by bit pattern.
    fn key(&self) -> RasterKey {
        (
            self.topology,
            self.polygon_mode,
            self.cull_mode,
            self.front_face,
            self.depth_bias_enable,
            [
                self.depth_bias_constant.to_bits(),
                self.depth_bias_clamp.to_bits(),
                self.depth_bias_slope.to_bits(),
            ],
            self.samples,
            self.depth_write,
            self.depth_compare,
            self.color_target_count,
            self.blend,
        )
    }
}

impl PartialEq for RasterState {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RasterState {}

impl Hash for RasterState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
