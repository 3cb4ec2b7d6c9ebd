//! Shader bytecode storage and the shader module cache.
//!
//! Compiled SPIR-V is registered with a [`ShaderContentStore`] per path and
//! macro set, one entry for each compiled variant. A
//! [`ShaderModuleParam`] names a stage plus a [`ShaderSource`] (path, macro
//! set, per-resource overrides); the [`ShaderModuleCache`] turns each distinct
//! parameter into exactly one reflected, natively created [`ShaderModule`].

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::GpuDevice;
use crate::cache::CacheHitCounter;
use crate::error::{GpuError, OrFatal};
use crate::reflection::{self, ShaderResource, UpdateMode};

/// Bytecode registered under one path.
#[derive(Debug, Clone)]
pub struct ShaderContent {
    code: Arc<[u32]>,
    hash: u64,
}

impl ShaderContent {
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    /// Hash of the bytecode words.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

/// Compiled shader bytecode, one entry per (path, macro set) variant, owned by
/// the render context.
#[derive(Debug, Default)]
pub struct ShaderContentStore {
    contents: HashMap<String, HashMap<BTreeMap<String, String>, ShaderContent>>,
}

impl ShaderContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the variant of `path` compiled without macros. Returns the content hash.
    pub fn insert(&mut self, path: impl Into<String>, code: Vec<u32>) -> u64 {
        self.insert_variant(path, BTreeMap::new(), code)
    }

    /// Register the variant of `path` compiled with `macros`, replacing any
    /// previous content for it. Returns the content hash.
    pub fn insert_variant(
        &mut self,
        path: impl Into<String>,
        macros: BTreeMap<String, String>,
        code: Vec<u32>,
    ) -> u64 {
        let mut hasher = DefaultHasher::new();
        code.hash(&mut hasher);
        let hash = hasher.finish();
        self.contents.entry(path.into()).or_default().insert(
            macros,
            ShaderContent {
                code: code.into(),
                hash,
            },
        );
        hash
    }

    /// Read a `.spv` file and register it as the macro-less variant of its path.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<u64, GpuError> {
        self.load_variant(path, BTreeMap::new())
    }

    /// Read a `.spv` file compiled with `macros` and register it under its path.
    pub fn load_variant(
        &mut self,
        path: impl AsRef<Path>,
        macros: BTreeMap<String, String>,
    ) -> Result<u64, GpuError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            GpuError::InvalidParameter(format!("Failed to read {}: {}", path.display(), e))
        })?;
        if bytes.len() % 4 != 0 {
            return Err(GpuError::InvalidParameter(format!(
                "{} is not a SPIR-V binary ({} bytes)",
                path.display(),
                bytes.len()
            )));
        }
        let code = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(self.insert_variant(path.to_string_lossy(), macros, code))
    }

    /// Bytecode of `path` compiled with exactly `macros`.
    pub fn get(&self, path: &str, macros: &BTreeMap<String, String>) -> Option<&ShaderContent> {
        self.contents.get(path)?.get(macros)
    }

    /// Whether any variant of `path` is registered.
    pub fn contains(&self, path: &str) -> bool {
        self.contents.contains_key(path)
    }

    /// Number of registered variants across all paths.
    pub fn len(&self) -> usize {
        self.contents.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a module's bytecode comes from and how its resources are tuned.
///
/// # Example
///
/// ```ignore
/// let source = ShaderSource::new("shaders/lighting.frag.spv")
///     .with_macro("SHADOWS", "1")
///     .with_dynamic_size("Lights", 64)
///     .with_update_mode("camera", UpdateMode::Dynamic);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    pub path: String,
    pub macros: BTreeMap<String, String>,
    /// Element count of a trailing runtime-sized array, by resource name.
    pub dynamic_sizes: BTreeMap<String, u32>,
    /// Update mode overrides, by resource name.
    pub update_modes: BTreeMap<String, UpdateMode>,
}

impl ShaderSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            macros: BTreeMap::new(),
            dynamic_sizes: BTreeMap::new(),
            update_modes: BTreeMap::new(),
        }
    }

    pub fn with_macro(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.insert(name.into(), value.into());
        self
    }

    pub fn with_dynamic_size(mut self, name: impl Into<String>, count: u32) -> Self {
        self.dynamic_sizes.insert(name.into(), count);
        self
    }

    pub fn with_update_mode(mut self, name: impl Into<String>, mode: UpdateMode) -> Self {
        self.update_modes.insert(name.into(), mode);
        self
    }
}

/// Key of the shader module cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderModuleParam {
    pub stage: vk::ShaderStageFlags,
    pub source: ShaderSource,
}

impl ShaderModuleParam {
    pub fn new(stage: vk::ShaderStageFlags, source: ShaderSource) -> Self {
        Self { stage, source }
    }
}

/// A reflected, natively created shader module.
pub struct ShaderModule {
    device: Arc<dyn GpuDevice>,
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    source: ShaderSource,
    code: Arc<[u32]>,
    resources: Vec<ShaderResource>,
    bytecode_hash: u64,
}

impl ShaderModule {
    /// Reflect the bytecode registered for `param` and create the native module.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        store: &ShaderContentStore,
        param: &ShaderModuleParam,
    ) -> Result<Self, GpuError> {
        let source = &param.source;
        let content = store.get(&source.path, &source.macros).ok_or_else(|| {
            GpuError::InvalidParameter(format!(
                "No bytecode registered for {} with macros {:?}",
                source.path, source.macros
            ))
        })?;

        let mut resources = reflection::reflect(content.code(), param.stage, &source.dynamic_sizes)
            .map_err(|e| {
                GpuError::InvalidParameter(format!("Reflection of {} failed: {}", source.path, e))
            })?;
        for resource in &mut resources {
            if let Some(&mode) = source.update_modes.get(&resource.name) {
                resource.update_mode = mode;
            }
        }

        let mut hasher = DefaultHasher::new();
        content.hash().hash(&mut hasher);
        source.macros.hash(&mut hasher);
        source.dynamic_sizes.hash(&mut hasher);
        source.update_modes.hash(&mut hasher);
        param.stage.hash(&mut hasher);
        let bytecode_hash = hasher.finish();

        let handle = device.create_shader_module(content.code())?;

        Ok(Self {
            device,
            handle,
            stage: param.stage,
            source: source.clone(),
            code: content.code.clone(),
            resources,
            bytecode_hash,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn path(&self) -> &str {
        &self.source.path
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }

    pub fn resources(&self) -> &[ShaderResource] {
        &self.resources
    }

    /// Hash over the bytecode and everything that changes its reflection.
    pub fn bytecode_hash(&self) -> u64 {
        self.bytecode_hash
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        log::trace!("Destroying shader module {}", self.source.path);
        self.device.destroy_shader_module(self.handle);
    }
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("handle", &self.handle)
            .field("stage", &self.stage)
            .field("path", &self.source.path)
            .field("resources", &self.resources.len())
            .finish()
    }
}

/// Cache of shader modules. Modules are never evicted, only dropped by [`reset`](Self::reset).
pub struct ShaderModuleCache {
    device: Arc<dyn GpuDevice>,
    modules: HashMap<ShaderModuleParam, Rc<ShaderModule>>,
    hit_counter: CacheHitCounter,
}

impl ShaderModuleCache {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            modules: HashMap::new(),
            hit_counter: CacheHitCounter::new("Shader Module Cache"),
        }
    }

    /// Get the module for `param`, creating it on first use.
    pub fn get(&mut self, store: &ShaderContentStore, param: &ShaderModuleParam) -> Rc<ShaderModule> {
        if let Some(module) = self.modules.get(param) {
            self.hit_counter.hit();
            return module.clone();
        }

        self.hit_counter.miss();
        log::debug!("Creating shader module for {} ({:?})", param.source.path, param.stage);
        let module = Rc::new(
            ShaderModule::new(self.device.clone(), store, param)
                .or_fatal("Failed to create shader module"),
        );
        self.modules.insert(param.clone(), module.clone());
        module
    }

    /// Drop every cached module.
    pub fn reset(&mut self) {
        self.modules.clear();
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn hit_counter(&self) -> &CacheHitCounter {
        &self.hit_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;

    fn inst(op: spirv::Op, word_count: u32) -> u32 {
        (word_count << 16) | op as u32
    }

    /// `void main() {}` as a compute shader.
    fn empty_module() -> Vec<u32> {
        use spirv::Op;
        vec![
            spirv::MAGIC_NUMBER,
            0x0001_0000,
            0,
            5,
            0,
            inst(Op::Capability, 2),
            spirv::Capability::Shader as u32,
            inst(Op::MemoryModel, 3),
            spirv::AddressingModel::Logical as u32,
            spirv::MemoryModel::GLSL450 as u32,
            inst(Op::EntryPoint, 5),
            spirv::ExecutionModel::GLCompute as u32,
            3,
            u32::from_le_bytes(*b"main"),
            0,
            inst(Op::ExecutionMode, 6),
            3,
            spirv::ExecutionMode::LocalSize as u32,
            1,
            1,
            1,
            inst(Op::TypeVoid, 2),
            1,
            inst(Op::TypeFunction, 3),
            2,
            1,
            inst(Op::Function, 5),
            1,
            3,
            0,
            2,
            inst(Op::Label, 2),
            4,
            inst(Op::Return, 1),
            inst(Op::FunctionEnd, 1),
        ]
    }

    fn macros(name: &str, value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(name.to_string(), value.to_string())])
    }

    #[test]
    fn test_store_hashes_content() {
        let mut store = ShaderContentStore::new();
        let a = store.insert("a.spv", empty_module());
        let b = store.insert("b.spv", empty_module());
        assert_eq!(a, b);
        assert_eq!(store.len(), 2);
        assert!(store.contains("a.spv"));
    }

    #[test]
    fn test_store_rejects_unaligned_file() {
        let path = std::env::temp_dir().join("redlilium_gpu_resources_unaligned.spv");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let mut store = ShaderContentStore::new();
        assert!(store.load(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_store_loads_file() {
        let path = std::env::temp_dir().join("redlilium_gpu_resources_empty.spv");
        let bytes: Vec<u8> = empty_module().iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();
        let mut store = ShaderContentStore::new();
        store.load(&path).unwrap();
        assert_eq!(
            store.get(&path.to_string_lossy(), &BTreeMap::new()).unwrap().code(),
            empty_module().as_slice()
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_module_cache_builds_once() {
        let device = Arc::new(DummyDevice::new());
        let mut store = ShaderContentStore::new();
        store.insert("empty.spv", empty_module());
        let mut cache = ShaderModuleCache::new(device.clone());

        let param = ShaderModuleParam::new(
            vk::ShaderStageFlags::VERTEX,
            ShaderSource::new("empty.spv"),
        );
        let a = cache.get(&store, &param);
        let b = cache.get(&store, &param.clone());
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(device.stats().shader_modules_created, 1);
        assert_eq!(cache.hit_counter().hits(), 1);
        assert!(a.resources().is_empty());
    }

    #[test]
    fn test_store_keys_variants_by_macros() {
        let mut store = ShaderContentStore::new();
        store.insert("light.spv", empty_module());
        store.insert_variant("light.spv", macros("SHADOWS", "1"), vec![spirv::MAGIC_NUMBER]);

        assert_eq!(store.len(), 2);
        let plain = store.get("light.spv", &BTreeMap::new()).unwrap();
        assert_eq!(plain.code(), empty_module().as_slice());
        let shadowed = store.get("light.spv", &macros("SHADOWS", "1")).unwrap();
        assert_eq!(shadowed.code(), &[spirv::MAGIC_NUMBER]);
        assert!(store.get("light.spv", &macros("SHADOWS", "0")).is_none());
    }

    #[test]
    fn test_macros_change_identity() {
        let device = Arc::new(DummyDevice::new());
        let mut store = ShaderContentStore::new();
        store.insert("empty.spv", empty_module());
        store.insert_variant("empty.spv", macros("FOO", "1"), empty_module());
        let mut cache = ShaderModuleCache::new(device.clone());

        let plain = ShaderSource::new("empty.spv");
        let defined = plain.clone().with_macro("FOO", "1");
        let a = cache.get(&store, &ShaderModuleParam::new(vk::ShaderStageFlags::COMPUTE, plain));
        let b = cache.get(&store, &ShaderModuleParam::new(vk::ShaderStageFlags::COMPUTE, defined));
        assert!(!Rc::ptr_eq(&a, &b));
        assert_ne!(a.bytecode_hash(), b.bytecode_hash());
        assert_eq!(device.stats().shader_modules_created, 2);
    }

    #[test]
    #[should_panic(expected = "Failed to create shader module")]
    fn test_missing_variant_is_fatal() {
        let device = Arc::new(DummyDevice::new());
        let mut store = ShaderContentStore::new();
        store.insert("empty.spv", empty_module());
        let mut cache = ShaderModuleCache::new(device);
        let source = ShaderSource::new("empty.spv").with_macro("FOO", "1");
        cache.get(&store, &ShaderModuleParam::new(vk::ShaderStageFlags::COMPUTE, source));
    }

    #[test]
    #[should_panic(expected = "Failed to create shader module")]
    fn test_malformed_bytecode_is_fatal() {
        let device = Arc::new(DummyDevice::new());
        let mut store = ShaderContentStore::new();
        store.insert("broken.spv", vec![0xdead_beef, 0x0001_0000, 0, 1, 0]);
        let mut cache = ShaderModuleCache::new(device);
        let source = ShaderSource::new("broken.spv");
        cache.get(&store, &ShaderModuleParam::new(vk::ShaderStageFlags::VERTEX, source));
    }

    #[test]
    fn test_reset_destroys_modules() {
        let device = Arc::new(DummyDevice::new());
        let mut store = ShaderContentStore::new();
        store.insert("empty.spv", empty_module());
        let mut cache = ShaderModuleCache::new(device.clone());
        let param = ShaderModuleParam::new(vk::ShaderStageFlags::COMPUTE, ShaderSource::new("empty.spv"));
        drop(cache.get(&store, &param));
        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(device.stats().shader_modules_destroyed, 1);
    }

    #[test]
    #[should_panic(expected = "Failed to create shader module")]
    fn test_missing_source_is_fatal() {
        let device = Arc::new(DummyDevice::new());
        let store = ShaderContentStore::new();
        let mut cache = ShaderModuleCache::new(device);
        let param = ShaderModuleParam::new(vk::ShaderStageFlags::VERTEX, ShaderSource::new("nope.spv"));
        cache.get(&store, &param);
    }
}
