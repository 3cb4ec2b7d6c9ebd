//! Pipeline layout and descriptor set cache tests.

mod common;

use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use rstest::rstest;

use common::{COMPOSE_FRAG, MESH_FRAG, MESH_VERT, SpirvBuilder, config, device};
use redlilium_gpu_resources::{
    CacheConfig, DescriptorBuilder, DummyDevice, GpuContext, GpuDevice, SamplerParam,
    ShaderModule, ShaderModuleParam, ShaderSource, UpdateMode,
};

fn mesh_modules(ctx: &mut GpuContext) -> Vec<Rc<ShaderModule>> {
    vec![
        ctx.shader_module(&common::vertex(MESH_VERT)),
        ctx.shader_module(&common::fragment(MESH_FRAG)),
    ]
}

/// Builder sized for `modules` with every mesh resource bound.
fn mesh_builder(ctx: &mut GpuContext, modules: &[Rc<ShaderModule>]) -> DescriptorBuilder {
    let sampler = ctx.samplers().get(&SamplerParam::default());
    let mut builder = DescriptorBuilder::new();
    builder.bind_shaders(modules);
    ctx.descriptors().fill_requirements(&mut builder);

    assert!(builder.bind_buffer("Globals", vk::Buffer::from_raw(100), 0, 64, 0));
    assert!(builder.bind_buffer("Light", vk::Buffer::from_raw(101), 0, 48, 0));
    assert!(builder.bind_buffer("Material", vk::Buffer::from_raw(102), 0, 16, 0));
    assert!(builder.bind_image("albedo", sampler, vk::ImageView::from_raw(200), 0));
    builder
}

#[rstest]
fn test_shared_binding_merges_stage_masks(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let modules = mesh_modules(&mut ctx);
    let layout = ctx.descriptors().get_pipeline_layout(&modules);

    assert_eq!(layout.set_layouts().len(), 2);
    let set0 = &layout.set_layouts()[0];
    let light = set0.binding(3).expect("binding 3");
    assert_eq!(
        light.stage_flags,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
    assert_eq!(light.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(
        set0.binding(0).map(|b| b.stage_flags),
        Some(vk::ShaderStageFlags::VERTEX)
    );
    assert_eq!(
        set0.binding(1).map(|b| b.descriptor_type),
        Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
    );

    let set1 = &layout.set_layouts()[1];
    assert_eq!(set1.bindings().len(), 1);
    assert_eq!(set1.bindings()[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
}

/// Storage buffer `{ uint count; }` at (0, 3).
fn counter_shader() -> Vec<u32> {
    let mut b = SpirvBuilder::vertex();
    let uint = b.uint();
    let block = b.type_struct(&[("count", uint, 0)]);
    b.storage_buffer("Counters", 0, 3, block);
    b.build()
}

#[rstest]
fn test_shared_storage_buffer_is_one_binding(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    ctx.store_mut().insert("shaders/counter.vert.spv", counter_shader());
    ctx.store_mut().insert("shaders/counter.frag.spv", counter_shader());
    let modules = vec![
        ctx.shader_module(&common::vertex("shaders/counter.vert.spv")),
        ctx.shader_module(&common::fragment("shaders/counter.frag.spv")),
    ];

    let layout = ctx.descriptors().get_pipeline_layout(&modules);
    let bindings = device
        .set_layout_bindings(layout.set_layouts()[0].handle())
        .expect("live set layout");
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].binding, 3);
    assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
    assert_eq!(
        bindings[0].stage_flags,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
}

#[rstest]
fn test_pipeline_layout_built_once(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let modules = mesh_modules(&mut ctx);

    let first = ctx.descriptors().get_pipeline_layout(&modules).handle();
    let second = ctx.descriptors().get_pipeline_layout(&modules).handle();
    assert_eq!(first, second);

    let stats = device.stats();
    assert_eq!(stats.pipeline_layouts_created, 1);
    assert_eq!(stats.descriptor_set_layouts_created, 2);
    assert_eq!(ctx.descriptors().layout_hit_counter().hits(), 1);
    assert_eq!(ctx.descriptors().allocator_count(), 2);
}

#[rstest]
fn test_second_bind_issues_no_writes(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let modules = mesh_modules(&mut ctx);
    let cmd = ctx.command_buffer();

    let mut builder = mesh_builder(&mut ctx, &modules);
    let bound = ctx
        .descriptors()
        .bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, &mut builder);
    assert_eq!(bound, 2);
    assert_eq!(device.stats().descriptor_writes, 4);

    let mut builder = mesh_builder(&mut ctx, &modules);
    ctx.descriptors()
        .bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, &mut builder);

    let stats = device.stats();
    assert_eq!(stats.descriptor_writes, 4);
    assert_eq!(stats.descriptor_sets_allocated, 2);
    assert_eq!(ctx.descriptors().set_hit_counter().hits(), 2);

    let binds = device.descriptor_binds();
    assert_eq!(binds.len(), 2);
    assert_eq!(binds[0].sets, binds[1].sets);
    assert_eq!(binds[0].first_set, 0);
    assert_eq!(binds[0].sets.len(), 2);
}

#[rstest]
fn test_sets_are_cached_per_command_buffer(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let modules = mesh_modules(&mut ctx);

    for raw in [1u64, 2] {
        let mut builder = mesh_builder(&mut ctx, &modules);
        ctx.descriptors().bind_descriptor_sets(
            vk::CommandBuffer::from_raw(0xc0de_0000 + raw),
            vk::PipelineBindPoint::GRAPHICS,
            &mut builder,
        );
    }

    assert_eq!(ctx.descriptors().set_count(), 4);
    assert_eq!(device.stats().descriptor_sets_allocated, 4);
}

#[rstest]
fn test_unused_set_splits_binding_runs(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let module = ctx.shader_module(&common::fragment(COMPOSE_FRAG));
    let cmd = ctx.command_buffer();

    let layout = ctx.descriptors().get_pipeline_layout(&[module.clone()]);
    assert_eq!(layout.set_layouts().len(), 3);
    assert!(layout.set_layouts()[1].bindings().is_empty());
    assert_eq!(ctx.descriptors().allocator_count(), 2);

    let mut builder = DescriptorBuilder::new();
    builder.bind_shaders(&[module]);
    ctx.descriptors().fill_requirements(&mut builder);
    assert!(!builder.get_params()[1].is_used());
    assert!(builder.bind_input_attachment(
        "gbuffer",
        vk::ImageView::from_raw(300),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    ));
    assert!(builder.bind_buffer("Frame", vk::Buffer::from_raw(301), 0, 16, 0));

    let bound = ctx
        .descriptors()
        .bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, &mut builder);
    assert_eq!(bound, 2);

    let binds = device.descriptor_binds();
    let first_sets: Vec<u32> = binds.iter().map(|b| b.first_set).collect();
    assert_eq!(first_sets, [0, 2]);
    assert!(binds.iter().all(|b| b.sets.len() == 1));
}

#[rstest]
fn test_dynamic_buffer_offsets(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let source = ShaderSource::new(MESH_VERT).with_update_mode("Globals", UpdateMode::Dynamic);
    let module = ctx.shader_module(&ShaderModuleParam::new(vk::ShaderStageFlags::VERTEX, source));
    let cmd = ctx.command_buffer();

    let layout = ctx.descriptors().get_pipeline_layout(&[module.clone()]);
    assert_eq!(
        layout.set_layouts()[0].binding(0).map(|b| b.descriptor_type),
        Some(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
    );

    let mut builder = DescriptorBuilder::new();
    builder.bind_shaders(&[module]);
    ctx.descriptors().fill_requirements(&mut builder);
    builder.bind_buffer("Globals", vk::Buffer::from_raw(400), 256, 64, 0);
    builder.bind_buffer("Light", vk::Buffer::from_raw(401), 0, 48, 0);
    ctx.descriptors()
        .bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, &mut builder);

    let binds = device.descriptor_binds();
    assert_eq!(binds[0].dynamic_offsets, [256]);

    // The offset is supplied at bind time, so the written descriptor starts at 0.
    let globals = device
        .descriptor_writes()
        .into_iter()
        .find(|write| write.binding == 0)
        .expect("write for Globals");
    assert!(matches!(
        globals.resource,
        redlilium_gpu_resources::backend::WriteResource::Buffer { offset: 0, range: 64, .. }
    ));
}

#[rstest]
fn test_update_after_bind_sampler(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let source =
        ShaderSource::new(MESH_FRAG).with_update_mode("albedo", UpdateMode::UpdateAfterBind);
    let module =
        ctx.shader_module(&ShaderModuleParam::new(vk::ShaderStageFlags::FRAGMENT, source));

    let limit = device.limits().max_update_after_bind_sampled_images;
    let layout = ctx.descriptors().get_pipeline_layout(&[module]);
    let set0 = &layout.set_layouts()[0];
    let albedo = set0.binding(1).expect("albedo binding");
    assert_eq!(albedo.descriptor_count, limit);
    assert!(albedo
        .binding_flags
        .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT));
    assert!(set0
        .pool_flags()
        .contains(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND));
}

#[rstest]
fn test_unknown_resource_is_reported(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);
    let modules = mesh_modules(&mut ctx);
    let mut builder = DescriptorBuilder::new();
    builder.bind_shaders(&modules);
    ctx.descriptors().fill_requirements(&mut builder);

    assert!(!builder.bind_buffer("Missing", vk::Buffer::from_raw(1), 0, 4, 0));
    // `albedo` is a sampler, not a buffer.
    assert!(!builder.bind_buffer("albedo", vk::Buffer::from_raw(1), 0, 4, 0));
}

#[rstest]
fn test_sets_survive_while_used_and_evict_after_period(
    device: Arc<DummyDevice>,
    config: CacheConfig,
) {
    let mut ctx = common::context(&device, config);
    let modules = mesh_modules(&mut ctx);
    let cmd = vk::CommandBuffer::from_raw(0xc0de);

    for _ in 0..10 {
        let mut builder = mesh_builder(&mut ctx, &modules);
        ctx.descriptors()
            .bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, &mut builder);
        ctx.descriptors().gc();
    }
    assert_eq!(ctx.descriptors().set_count(), 2);
    assert_eq!(ctx.descriptors().layout_count(), 1);
    assert_eq!(device.stats().descriptor_sets_allocated, 2);

    // The last touch was one tick ago; eviction comes `gc_period + 1` ticks after it.
    for _ in 0..config.gc_period - 1 {
        ctx.descriptors().gc();
    }
    assert_eq!(ctx.descriptors().set_count(), 2);

    ctx.descriptors().gc();
    assert_eq!(ctx.descriptors().set_count(), 0);
    assert_eq!(ctx.descriptors().layout_count(), 0);
    assert_eq!(ctx.descriptors().allocator_count(), 0);

    let stats = device.stats();
    assert_eq!(stats.pipeline_layouts_destroyed, 1);
    assert_eq!(stats.descriptor_set_layouts_destroyed, 2);
}

#[rstest]
#[should_panic]
fn test_conflicting_binding_types_are_fatal(device: Arc<DummyDevice>, config: CacheConfig) {
    let mut ctx = common::context(&device, config);

    let mut b = SpirvBuilder::fragment();
    b.combined_image_sampler("shadow_map", 0, 0, 1);
    ctx.store_mut().insert("shaders/conflict.frag.spv", b.build());

    let vertex = ctx.shader_module(&common::vertex(MESH_VERT));
    let fragment = ctx.shader_module(&common::fragment("shaders/conflict.frag.spv"));
    ctx.descriptors().get_pipeline_layout(&[vertex, fragment]);
}
