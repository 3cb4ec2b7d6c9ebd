//! Common utilities for the cache integration tests.
//!
//! Everything runs against the [`DummyDevice`], so no GPU is needed. Shader
//! bytecode is assembled with [`SpirvBuilder`] and registered in the context's
//! content store under the paths below.

#![allow(dead_code)]

pub mod spirv;

use std::sync::Arc;

use ::spirv::StorageClass;
use ash::vk;
use rstest::fixture;

use redlilium_gpu_resources::{
    CacheConfig, DummyDevice, GpuContext, ShaderContentStore, ShaderModuleParam, ShaderSource,
};

pub use self::spirv::SpirvBuilder;

pub const MESH_VERT: &str = "shaders/mesh.vert.spv";
pub const MESH_FRAG: &str = "shaders/mesh.frag.spv";
pub const BLUR_COMP: &str = "shaders/blur.comp.spv";
pub const COMPOSE_FRAG: &str = "shaders/compose.frag.spv";

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// A dummy device whose submissions complete immediately.
#[fixture]
pub fn device() -> Arc<DummyDevice> {
    init_logging();
    Arc::new(DummyDevice::new())
}

/// A small garbage collection period keeps eviction tests short.
#[fixture]
pub fn config() -> CacheConfig {
    CacheConfig::new()
        .with_gc_period(3)
        .with_command_buffer_count(4)
}

/// Context over `device` with every test shader registered.
pub fn context(device: &Arc<DummyDevice>, config: CacheConfig) -> GpuContext {
    let mut ctx = GpuContext::new(device.clone(), config).expect("context creation");
    register_shaders(ctx.store_mut());
    ctx
}

pub fn register_shaders(store: &mut ShaderContentStore) {
    store.insert(MESH_VERT, mesh_vertex());
    store.insert(MESH_FRAG, mesh_fragment());
    store.insert(BLUR_COMP, blur_compute());
    store.insert(COMPOSE_FRAG, compose_fragment());
}

pub fn vertex(path: &str) -> ShaderModuleParam {
    ShaderModuleParam::new(vk::ShaderStageFlags::VERTEX, ShaderSource::new(path))
}

pub fn fragment(path: &str) -> ShaderModuleParam {
    ShaderModuleParam::new(vk::ShaderStageFlags::FRAGMENT, ShaderSource::new(path))
}

pub fn compute(path: &str) -> ShaderModuleParam {
    ShaderModuleParam::new(vk::ShaderStageFlags::COMPUTE, ShaderSource::new(path))
}

/// `{ vec3 position; float intensity; vec4 colors[2]; }`, 48 bytes.
pub fn light_block(builder: &mut SpirvBuilder) -> u32 {
    let float = builder.float();
    let vec3 = builder.type_vector(float, 3);
    let vec4 = builder.type_vector(float, 4);
    let colors = builder.type_array(vec4, 2, 16);
    builder.type_struct(&[("position", vec3, 0), ("intensity", float, 12), ("colors", colors, 16)])
}

/// Vertex stage.
///
/// - `Globals` uniform buffer `{ mat4 view_proj; }` at (0, 0)
/// - `Light` uniform buffer at (0, 3)
/// - `position` input at location 0, `uv` output at location 0
pub fn mesh_vertex() -> Vec<u32> {
    let mut b = SpirvBuilder::vertex();
    let float = b.float();
    let vec4 = b.type_vector(float, 4);
    let mat4 = b.type_matrix(vec4, 4);
    let globals = b.type_struct(&[("view_proj", mat4, 0)]);
    b.member_decorate(globals, 0, ::spirv::Decoration::MatrixStride, &[16]);
    b.uniform_buffer("Globals", 0, 0, globals);

    let light = light_block(&mut b);
    b.uniform_buffer("Light", 0, 3, light);

    let vec3 = b.type_vector(float, 3);
    let vec2 = b.type_vector(float, 2);
    b.stage_variable("position", StorageClass::Input, vec3, 0);
    b.stage_variable("uv", StorageClass::Output, vec2, 0);
    b.build()
}

/// Fragment stage.
///
/// - `albedo` combined image sampler at (0, 1)
/// - `Light` uniform buffer at (0, 3), shared with the vertex stage
/// - `Material` uniform buffer `{ vec4 tint; }` at (1, 0)
/// - `color` output at location 0
pub fn mesh_fragment() -> Vec<u32> {
    let mut b = SpirvBuilder::fragment();
    b.combined_image_sampler("albedo", 0, 1, 1);
    let light = light_block(&mut b);
    b.uniform_buffer("Light", 0, 3, light);

    let float = b.float();
    let vec4 = b.type_vector(float, 4);
    let material = b.type_struct(&[("tint", vec4, 0)]);
    b.uniform_buffer("Material", 1, 0, material);

    let vec2 = b.type_vector(float, 2);
    b.stage_variable("uv", StorageClass::Input, vec2, 0);
    b.stage_variable("color", StorageClass::Output, vec4, 0);
    b.build()
}

/// Compute stage.
///
/// - `Pixels` storage buffer `{ uint count; vec4 data[]; }` at (0, 0)
/// - `target` storage image at (0, 1)
/// - `Params` push constant block `{ vec2 scale @ 16; float radius @ 24; }`
/// - `KERNEL_SIZE` specialization constant, id 0
pub fn blur_compute() -> Vec<u32> {
    let mut b = SpirvBuilder::compute();
    let float = b.float();
    let uint = b.uint();
    let vec4 = b.type_vector(float, 4);
    let data = b.type_runtime_array(vec4, 16);
    let pixels = b.type_struct(&[("count", uint, 0), ("data", data, 16)]);
    b.storage_buffer("Pixels", 0, 0, pixels);
    b.storage_image("target", 0, 1);

    let vec2 = b.type_vector(float, 2);
    let params = b.type_struct(&[("scale", vec2, 16), ("radius", float, 24)]);
    b.push_constant("Params", params);

    b.spec_constant("KERNEL_SIZE", uint, 0, 5);
    b.build()
}

/// Fragment stage reading the previous subpass.
///
/// - `gbuffer` input attachment 0 at (0, 0)
/// - `Frame` uniform buffer `{ vec4 exposure; }` at (2, 0), leaving set 1 empty
pub fn compose_fragment() -> Vec<u32> {
    let mut b = SpirvBuilder::fragment();
    b.input_attachment("gbuffer", 0, 0, 0);
    let float = b.float();
    let vec4 = b.type_vector(float, 4);
    let frame = b.type_struct(&[("exposure", vec4, 0)]);
    b.uniform_buffer("Frame", 2, 0, frame);
    b.stage_variable("color", StorageClass::Output, vec4, 0);
    b.build()
}
