//! Reflected resource descriptions.

use ash::vk;

/// Category of a reflected shader resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Stage input variable.
    Input,
    /// Subpass input (`subpassInput`).
    InputAttachment,
    /// Stage output variable.
    Output,
    /// Separate sampled image (`texture2D`).
    Image,
    /// Separate sampler.
    Sampler,
    /// Combined image sampler (`sampler2D`).
    ImageSampler,
    /// Storage image (`image2D`).
    ImageStorage,
    UniformBuffer,
    StorageBuffer,
    PushConstant,
    SpecializationConstant,
}

impl ResourceKind {
    /// Whether resources of this kind live in a descriptor set.
    pub fn is_descriptor(self) -> bool {
        !matches!(
            self,
            Self::Input | Self::Output | Self::PushConstant | Self::SpecializationConstant
        )
    }
}

/// Scalar base type of a reflected resource or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
    Struct,
    Unknown,
}

impl BaseType {
    /// Size in bytes of one scalar. Zero for structs and unknown types.
    pub fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::F16 => 2,
            Self::Bool | Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Struct | Self::Unknown => 0,
        }
    }
}

/// How a descriptor resource is expected to be updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateMode {
    #[default]
    Static,
    /// Uniform/storage buffers bound with a dynamic offset.
    Dynamic,
    /// Variable-count, partially bound image samplers updated after binding.
    UpdateAfterBind,
}

/// One member of a reflected block, with its nested members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMember {
    pub name: String,
    pub base_type: BaseType,
    pub offset: u32,
    pub size: u32,
    pub vec_size: u32,
    pub columns: u32,
    pub array_size: u32,
    pub members: Vec<ResourceMember>,
}

/// A resource declared by a shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResource {
    pub name: String,
    pub stages: vk::ShaderStageFlags,
    pub kind: ResourceKind,
    pub update_mode: UpdateMode,
    pub access: vk::AccessFlags,
    pub base_type: BaseType,
    pub set: u32,
    pub binding: u32,
    pub location: u32,
    pub input_attachment_index: u32,
    pub vec_size: u32,
    pub columns: u32,
    /// Outermost array length; 0 for runtime-sized arrays, 1 for non-arrays.
    pub array_size: u32,
    pub offset: u32,
    pub size: u32,
    pub constant_id: u32,
    pub members: Vec<ResourceMember>,
}

impl ShaderResource {
    /// A resource of `kind` visible to `stage`, every other field zeroed.
    pub fn new(name: impl Into<String>, kind: ResourceKind, stage: vk::ShaderStageFlags) -> Self {
        Self {
            name: name.into(),
            stages: stage,
            kind,
            update_mode: UpdateMode::Static,
            access: vk::AccessFlags::empty(),
            base_type: BaseType::Unknown,
            set: 0,
            binding: 0,
            location: 0,
            input_attachment_index: 0,
            vec_size: 0,
            columns: 0,
            array_size: 1,
            offset: 0,
            size: 0,
            constant_id: 0,
            members: Vec::new(),
        }
    }
}
