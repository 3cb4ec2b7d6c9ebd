//! SPIR-V reflection.
//!
//! [`reflect`] runs `spirq` over a module and maps the variables of its entry
//! point onto [`ShaderResource`]s: stage inputs/outputs, subpass inputs,
//! images, samplers, storage images, uniform and storage buffers, push constant
//! blocks and specialization constants.
//!
//! Block sizes are recomputed from member offsets and array strides rather than
//! taken from the parser, so a trailing runtime-sized array can hold the
//! caller's desired element count, looked up by resource name.

mod types;

use std::collections::BTreeMap;

use ash::vk;
use spirq::ReflectConfig;
use spirq::ty::{AccessType, DescriptorType, ScalarType, StructType, Type};
use spirq::var::Variable;

use crate::config::MAX_DESCRIPTOR_SETS;
use crate::error::ReflectionError;
use crate::profile_function;

pub use types::{BaseType, ResourceKind, ResourceMember, ShaderResource, UpdateMode};

/// Reflect `code` compiled for `stage`.
///
/// Resources are returned grouped by [`ResourceKind`]. A module without an
/// entry point reflects to an empty list. Failures are logged before being
/// returned.
pub fn reflect(
    code: &[u32],
    stage: vk::ShaderStageFlags,
    desired_sizes: &BTreeMap<String, u32>,
) -> Result<Vec<ShaderResource>, ReflectionError> {
    profile_function!();

    let result = entry_point_variables(code).and_then(|variables| {
        Reflector {
            stage,
            desired_sizes,
        }
        .resources(&variables)
    });
    if let Err(e) = &result {
        log::error!("SPIR-V reflection failed: {}", e);
    }
    result
}

fn entry_point_variables(code: &[u32]) -> Result<Vec<Variable>, ReflectionError> {
    let entry_points = ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| ReflectionError::Malformed(e.to_string()))?;

    let mut entry_points = entry_points.into_iter();
    let Some(entry_point) = entry_points.next() else {
        log::debug!("SPIR-V module declares no entry point");
        return Ok(Vec::new());
    };
    if entry_points.len() > 0 {
        log::warn!(
            "Module declares {} more entry points, reflecting only '{}'",
            entry_points.len(),
            entry_point.name
        );
    }
    Ok(entry_point.vars)
}

struct Reflector<'a> {
    stage: vk::ShaderStageFlags,
    desired_sizes: &'a BTreeMap<String, u32>,
}

impl Reflector<'_> {
    fn resources(&self, variables: &[Variable]) -> Result<Vec<ShaderResource>, ReflectionError> {
        let mut resources = Vec::new();
        for variable in variables {
            if let Some(resource) = self.variable(variable)? {
                resources.push(resource);
            }
        }
        resources.sort_by_key(|resource| resource.kind);
        Ok(resources)
    }

    fn variable(&self, variable: &Variable) -> Result<Option<ShaderResource>, ReflectionError> {
        match variable {
            Variable::Input { name, location, ty } => Ok(self.stage_variable(
                name_of(name),
                location.loc(),
                ty,
                ResourceKind::Input,
            )),
            Variable::Output { name, location, ty } => Ok(self.stage_variable(
                name_of(name),
                location.loc(),
                ty,
                ResourceKind::Output,
            )),
            Variable::Descriptor {
                name,
                desc_bind,
                desc_ty,
                ty,
                nbind,
            } => self.descriptor(
                name_of(name),
                (desc_bind.set(), desc_bind.bind()),
                desc_ty,
                ty,
                *nbind,
            ),
            Variable::PushConstant { name, ty } => self.push_constant(name_of(name), ty),
            Variable::SpecConstant { name, spec_id, ty } => {
                Ok(self.spec_constant(name_of(name), *spec_id, ty))
            }
            #[allow(unreachable_patterns)]
            _ => Ok(None),
        }
    }

    fn stage_variable(
        &self,
        name: Option<&str>,
        location: u32,
        ty: &Type,
        kind: ResourceKind,
    ) -> Option<ShaderResource> {
        let name = name.unwrap_or_default();
        let (inner, array_size) = strip_arrays(ty);
        let (base_type, vec_size, columns) = describe(inner);
        if base_type == BaseType::Unknown {
            log::warn!("Skipping {:?} '{}' with unsupported base type", kind, name);
            return None;
        }

        let mut resource = ShaderResource::new(name, kind, self.stage);
        resource.base_type = base_type;
        resource.vec_size = vec_size;
        resource.columns = columns;
        resource.array_size = array_size;
        resource.location = location;
        Some(resource)
    }

    fn descriptor(
        &self,
        name: Option<&str>,
        (set, binding): (u32, u32),
        desc_ty: &DescriptorType,
        ty: &Type,
        count: u32,
    ) -> Result<Option<ShaderResource>, ReflectionError> {
        let (inner, _) = strip_arrays(ty);
        let block = match inner {
            Type::Struct(block) => Some(block),
            _ => None,
        };
        let name = name
            .or_else(|| block.and_then(|block| block.name.as_deref()))
            .unwrap_or_default();

        let (kind, access) = match desc_ty {
            DescriptorType::InputAttachment(_) => {
                (ResourceKind::InputAttachment, vk::AccessFlags::SHADER_READ)
            }
            DescriptorType::SampledImage() => (ResourceKind::Image, vk::AccessFlags::SHADER_READ),
            DescriptorType::Sampler() => (ResourceKind::Sampler, vk::AccessFlags::SHADER_READ),
            DescriptorType::CombinedImageSampler() => {
                (ResourceKind::ImageSampler, vk::AccessFlags::SHADER_READ)
            }
            DescriptorType::StorageImage(access) => {
                (ResourceKind::ImageStorage, access_flags(access))
            }
            DescriptorType::UniformBuffer() => {
                (ResourceKind::UniformBuffer, vk::AccessFlags::UNIFORM_READ)
            }
            DescriptorType::StorageBuffer(access) => {
                (ResourceKind::StorageBuffer, access_flags(access))
            }
            other => {
                log::warn!("Skipping descriptor '{}' of unsupported type {:?}", name, other);
                return Ok(None);
            }
        };

        if set >= MAX_DESCRIPTOR_SETS {
            return Err(ReflectionError::SetOutOfRange {
                name: name.to_string(),
                set,
            });
        }

        let mut resource = ShaderResource::new(name, kind, self.stage);
        resource.access = access;
        resource.array_size = count;
        resource.set = set;
        resource.binding = binding;
        if let DescriptorType::InputAttachment(index) = desc_ty {
            resource.input_attachment_index = *index;
        }

        if matches!(kind, ResourceKind::UniformBuffer | ResourceKind::StorageBuffer) {
            let Some(block) = block else {
                log::warn!("Skipping buffer '{}' without a block type", name);
                return Ok(None);
            };
            resource.base_type = BaseType::Struct;
            resource.size = to_u32(struct_size(block, self.desired_count(name)), name)?;
            resource.members = members(block)?;
        }
        Ok(Some(resource))
    }

    fn push_constant(
        &self,
        name: Option<&str>,
        ty: &Type,
    ) -> Result<Option<ShaderResource>, ReflectionError> {
        let Type::Struct(block) = ty else {
            return Ok(None);
        };
        let name = name.or(block.name.as_deref()).unwrap_or_default();
        let offset = block.members.iter().map(member_offset).min().unwrap_or(0);
        let size = struct_size(block, self.desired_count(name))
            .and_then(|size| size.checked_sub(offset));

        let mut resource = ShaderResource::new(name, ResourceKind::PushConstant, self.stage);
        resource.base_type = BaseType::Struct;
        resource.offset = to_u32(Some(offset), name)?;
        resource.size = to_u32(size, name)?;
        resource.members = members(block)?;
        Ok(Some(resource))
    }

    fn spec_constant(&self, name: Option<&str>, constant_id: u32, ty: &Type) -> Option<ShaderResource> {
        let name = name.unwrap_or_default();
        let base_type = match ty {
            Type::Scalar(scalar_ty) => scalar(scalar_ty),
            _ => BaseType::Unknown,
        };
        if base_type == BaseType::Unknown {
            log::warn!("Skipping specialization constant '{}' with unsupported type", name);
            return None;
        }

        let mut resource =
            ShaderResource::new(name, ResourceKind::SpecializationConstant, self.stage);
        resource.constant_id = constant_id;
        resource.base_type = base_type;
        resource.size = base_type.size();
        Some(resource)
    }

    fn desired_count(&self, name: &str) -> u32 {
        self.desired_sizes.get(name).copied().unwrap_or(0)
    }
}

/// Empty debug names count as missing.
fn name_of(name: &Option<String>) -> Option<&str> {
    name.as_deref().filter(|name| !name.is_empty())
}

fn access_flags(access: &AccessType) -> vk::AccessFlags {
    match access {
        AccessType::ReadOnly => vk::AccessFlags::SHADER_READ,
        AccessType::WriteOnly => vk::AccessFlags::SHADER_WRITE,
        AccessType::ReadWrite => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
    }
}

fn to_u32(size: Option<u64>, name: &str) -> Result<u32, ReflectionError> {
    size.and_then(|size| u32::try_from(size).ok())
        .ok_or_else(|| ReflectionError::SizeOverflow(name.to_string()))
}

/// Peel array types off `ty`, returning the element type and the outermost
/// length (0 when runtime-sized, 1 when `ty` is not an array).
fn strip_arrays(mut ty: &Type) -> (&Type, u32) {
    let mut outermost = None;
    while let Type::Array(array) = ty {
        outermost.get_or_insert(array.nelement.unwrap_or(0));
        let element: &Type = &array.element_ty;
        ty = element;
    }
    (ty, outermost.unwrap_or(1))
}

fn scalar(ty: &ScalarType) -> BaseType {
    match ty {
        ScalarType::Boolean => BaseType::Bool,
        ScalarType::Integer { bits: 8, is_signed } => pick(*is_signed, BaseType::I8, BaseType::U8),
        ScalarType::Integer { bits: 16, is_signed } => {
            pick(*is_signed, BaseType::I16, BaseType::U16)
        }
        ScalarType::Integer { bits: 32, is_signed } => {
            pick(*is_signed, BaseType::I32, BaseType::U32)
        }
        ScalarType::Integer { bits: 64, is_signed } => {
            pick(*is_signed, BaseType::I64, BaseType::U64)
        }
        ScalarType::Float { bits: 16 } => BaseType::F16,
        ScalarType::Float { bits: 32 } => BaseType::F32,
        ScalarType::Float { bits: 64 } => BaseType::F64,
        _ => BaseType::Unknown,
    }
}

fn pick(signed: bool, if_signed: BaseType, if_unsigned: BaseType) -> BaseType {
    if signed { if_signed } else { if_unsigned }
}

/// Base type, vector size and column count of a non-array type.
fn describe(ty: &Type) -> (BaseType, u32, u32) {
    match ty {
        Type::Scalar(scalar_ty) => (scalar(scalar_ty), 1, 1),
        Type::Vector(vector) => (scalar(&vector.scalar_ty), vector.nscalar as u32, 1),
        Type::Matrix(matrix) => (
            scalar(&matrix.vector_ty.scalar_ty),
            matrix.vector_ty.nscalar as u32,
            matrix.nvector as u32,
        ),
        Type::Struct(_) => (BaseType::Struct, 1, 1),
        _ => (BaseType::Unknown, 0, 0),
    }
}

fn member_offset(member: &spirq::ty::StructMember) -> u64 {
    member.offset.map_or(0, |offset| offset as u64)
}

/// Declared size of a block; a trailing runtime array holds `runtime_count`
/// elements. `None` on overflow.
fn struct_size(block: &StructType, runtime_count: u32) -> Option<u64> {
    block.members.iter().try_fold(0u64, |size, member| {
        let end = member_offset(member).checked_add(type_size(&member.ty, runtime_count)?)?;
        Some(size.max(end))
    })
}

fn type_size(ty: &Type, runtime_count: u32) -> Option<u64> {
    match ty {
        Type::Scalar(scalar_ty) => Some(u64::from(scalar(scalar_ty).size())),
        Type::Vector(vector) => {
            u64::from(scalar(&vector.scalar_ty).size()).checked_mul(vector.nscalar as u64)
        }
        Type::Matrix(matrix) => match ty.nbyte() {
            // MatrixStride × columns when decorated.
            Some(size) => Some(size as u64),
            None => u64::from(scalar(&matrix.vector_ty.scalar_ty).size())
                .checked_mul(matrix.vector_ty.nscalar as u64)?
                .checked_mul(matrix.nvector as u64),
        },
        Type::Array(array) => {
            let stride = match array.stride {
                Some(stride) => stride as u64,
                None => type_size(&array.element_ty, 0)?,
            };
            let count = array.nelement.unwrap_or(runtime_count);
            stride.checked_mul(u64::from(count))
        }
        Type::Struct(block) => struct_size(block, 0),
        _ => Some(0),
    }
}

fn members(block: &StructType) -> Result<Vec<ResourceMember>, ReflectionError> {
    let mut out = Vec::with_capacity(block.members.len());
    for member in &block.members {
        let name = member.name.clone().unwrap_or_default();
        let (inner, array_size) = strip_arrays(&member.ty);
        let (base_type, vec_size, columns) = describe(inner);
        if base_type == BaseType::Unknown {
            continue;
        }
        out.push(ResourceMember {
            offset: to_u32(Some(member_offset(member)), &name)?,
            size: to_u32(type_size(&member.ty, 0), &name)?,
            base_type,
            vec_size,
            columns,
            array_size,
            members: match inner {
                Type::Struct(nested) => members(nested)?,
                _ => Vec::new(),
            },
            name,
        });
    }
    Ok(out)
}
