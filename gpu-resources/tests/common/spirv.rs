//! Minimal SPIR-V module writer for reflection tests.
//!
//! Emits the global declarations reflection reads (names, decorations, types,
//! constants and module-scope variables) around a single empty `main` entry
//! point.

use spirv::{
    AddressingModel, Capability, Decoration, Dim, ExecutionMode, ExecutionModel, MemoryModel, Op,
    StorageClass,
};

/// Incrementally assembled SPIR-V module.
#[derive(Debug)]
pub struct SpirvBuilder {
    model: ExecutionModel,
    next_id: u32,
    debug: Vec<u32>,
    annotations: Vec<u32>,
    globals: Vec<u32>,
    /// Stage inputs and outputs listed on the entry point.
    interface: Vec<u32>,
    float32: Option<u32>,
    uint32: Option<u32>,
}

fn emit(words: &mut Vec<u32>, op: Op, operands: &[u32]) {
    words.push(((operands.len() as u32 + 1) << 16) | op as u32);
    words.extend_from_slice(operands);
}

fn string_words(text: &str) -> Vec<u32> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl SpirvBuilder {
    pub fn new(model: ExecutionModel) -> Self {
        Self {
            model,
            next_id: 1,
            debug: Vec::new(),
            annotations: Vec::new(),
            globals: Vec::new(),
            interface: Vec::new(),
            float32: None,
            uint32: None,
        }
    }

    pub fn vertex() -> Self {
        Self::new(ExecutionModel::Vertex)
    }

    pub fn fragment() -> Self {
        Self::new(ExecutionModel::Fragment)
    }

    pub fn compute() -> Self {
        Self::new(ExecutionModel::GLCompute)
    }

    /// Allocate a result id without declaring anything.
    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn name(&mut self, id: u32, name: &str) {
        let mut operands = vec![id];
        operands.extend(string_words(name));
        emit(&mut self.debug, Op::Name, &operands);
    }

    pub fn member_name(&mut self, ty: u32, member: u32, name: &str) {
        let mut operands = vec![ty, member];
        operands.extend(string_words(name));
        emit(&mut self.debug, Op::MemberName, &operands);
    }

    pub fn decorate(&mut self, id: u32, decoration: Decoration, literals: &[u32]) {
        let mut operands = vec![id, decoration as u32];
        operands.extend_from_slice(literals);
        emit(&mut self.annotations, Op::Decorate, &operands);
    }

    pub fn member_decorate(&mut self, ty: u32, member: u32, decoration: Decoration, literals: &[u32]) {
        let mut operands = vec![ty, member, decoration as u32];
        operands.extend_from_slice(literals);
        emit(&mut self.annotations, Op::MemberDecorate, &operands);
    }

    /// Append an arbitrary instruction to the global section.
    pub fn global(&mut self, op: Op, operands: &[u32]) {
        emit(&mut self.globals, op, operands);
    }

    pub fn type_float(&mut self, width: u32) -> u32 {
        let id = self.id();
        self.global(Op::TypeFloat, &[id, width]);
        id
    }

    pub fn type_int(&mut self, width: u32, signed: bool) -> u32 {
        let id = self.id();
        self.global(Op::TypeInt, &[id, width, u32::from(signed)]);
        id
    }

    pub fn float(&mut self) -> u32 {
        match self.float32 {
            Some(id) => id,
            None => {
                let id = self.type_float(32);
                self.float32 = Some(id);
                id
            }
        }
    }

    pub fn uint(&mut self) -> u32 {
        match self.uint32 {
            Some(id) => id,
            None => {
                let id = self.type_int(32, false);
                self.uint32 = Some(id);
                id
            }
        }
    }

    pub fn type_vector(&mut self, component: u32, count: u32) -> u32 {
        let id = self.id();
        self.global(Op::TypeVector, &[id, component, count]);
        id
    }

    pub fn type_matrix(&mut self, column: u32, count: u32) -> u32 {
        let id = self.id();
        self.global(Op::TypeMatrix, &[id, column, count]);
        id
    }

    /// Fixed-size array; a zero `stride` leaves it undecorated.
    pub fn type_array(&mut self, element: u32, length: u32, stride: u32) -> u32 {
        let uint = self.uint();
        let length_id = self.constant(uint, length);
        let id = self.id();
        self.global(Op::TypeArray, &[id, element, length_id]);
        if stride > 0 {
            self.decorate(id, Decoration::ArrayStride, &[stride]);
        }
        id
    }

    pub fn type_runtime_array(&mut self, element: u32, stride: u32) -> u32 {
        let id = self.id();
        self.global(Op::TypeRuntimeArray, &[id, element]);
        self.decorate(id, Decoration::ArrayStride, &[stride]);
        id
    }

    /// Struct whose members are `(name, type, offset)`.
    pub fn type_struct(&mut self, members: &[(&str, u32, u32)]) -> u32 {
        let id = self.id();
        let mut operands = vec![id];
        operands.extend(members.iter().map(|&(_, ty, _)| ty));
        self.global(Op::TypeStruct, &operands);
        for (index, &(name, _, offset)) in members.iter().enumerate() {
            self.member_name(id, index as u32, name);
            self.member_decorate(id, index as u32, Decoration::Offset, &[offset]);
        }
        id
    }

    pub fn type_pointer(&mut self, storage: StorageClass, pointee: u32) -> u32 {
        let id = self.id();
        self.global(Op::TypePointer, &[id, storage as u32, pointee]);
        id
    }

    /// `sampled` is 1 for sampled images and 2 for storage images.
    pub fn type_image(&mut self, dim: Dim, sampled: u32) -> u32 {
        let float = self.float();
        let id = self.id();
        self.global(Op::TypeImage, &[id, float, dim as u32, 0, 0, 0, sampled, 0]);
        id
    }

    pub fn type_sampled_image(&mut self, image: u32) -> u32 {
        let id = self.id();
        self.global(Op::TypeSampledImage, &[id, image]);
        id
    }

    pub fn type_sampler(&mut self) -> u32 {
        let id = self.id();
        self.global(Op::TypeSampler, &[id]);
        id
    }

    pub fn constant(&mut self, ty: u32, value: u32) -> u32 {
        let id = self.id();
        self.global(Op::Constant, &[ty, id, value]);
        id
    }

    pub fn spec_constant(&mut self, name: &str, ty: u32, constant_id: u32, value: u32) -> u32 {
        let id = self.id();
        self.global(Op::SpecConstant, &[ty, id, value]);
        self.name(id, name);
        self.decorate(id, Decoration::SpecId, &[constant_id]);
        id
    }

    pub fn variable(&mut self, pointer: u32, storage: StorageClass) -> u32 {
        let id = self.id();
        self.global(Op::Variable, &[pointer, id, storage as u32]);
        id
    }

    fn bound(&mut self, id: u32, name: &str, set: u32, binding: u32) {
        self.name(id, name);
        self.decorate(id, Decoration::DescriptorSet, &[set]);
        self.decorate(id, Decoration::Binding, &[binding]);
    }

    /// Uniform buffer block at (`set`, `binding`).
    pub fn uniform_buffer(&mut self, name: &str, set: u32, binding: u32, block: u32) -> u32 {
        self.decorate(block, Decoration::Block, &[]);
        let pointer = self.type_pointer(StorageClass::Uniform, block);
        let id = self.variable(pointer, StorageClass::Uniform);
        self.bound(id, name, set, binding);
        id
    }

    /// Storage buffer block at (`set`, `binding`).
    pub fn storage_buffer(&mut self, name: &str, set: u32, binding: u32, block: u32) -> u32 {
        self.decorate(block, Decoration::Block, &[]);
        let pointer = self.type_pointer(StorageClass::StorageBuffer, block);
        let id = self.variable(pointer, StorageClass::StorageBuffer);
        self.bound(id, name, set, binding);
        id
    }

    /// `sampler2D` at (`set`, `binding`); `count` > 1 declares an array.
    pub fn combined_image_sampler(&mut self, name: &str, set: u32, binding: u32, count: u32) -> u32 {
        let image = self.type_image(Dim::Dim2D, 1);
        let mut ty = self.type_sampled_image(image);
        if count > 1 {
            ty = self.type_array(ty, count, 0);
        }
        let pointer = self.type_pointer(StorageClass::UniformConstant, ty);
        let id = self.variable(pointer, StorageClass::UniformConstant);
        self.bound(id, name, set, binding);
        id
    }

    pub fn storage_image(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.type_image(Dim::Dim2D, 2);
        let pointer = self.type_pointer(StorageClass::UniformConstant, image);
        let id = self.variable(pointer, StorageClass::UniformConstant);
        self.bound(id, name, set, binding);
        id
    }

    pub fn input_attachment(&mut self, name: &str, set: u32, binding: u32, index: u32) -> u32 {
        let image = self.type_image(Dim::DimSubpassData, 2);
        let pointer = self.type_pointer(StorageClass::UniformConstant, image);
        let id = self.variable(pointer, StorageClass::UniformConstant);
        self.bound(id, name, set, binding);
        self.decorate(id, Decoration::InputAttachmentIndex, &[index]);
        id
    }

    pub fn push_constant(&mut self, name: &str, block: u32) -> u32 {
        self.decorate(block, Decoration::Block, &[]);
        let pointer = self.type_pointer(StorageClass::PushConstant, block);
        let id = self.variable(pointer, StorageClass::PushConstant);
        self.name(id, name);
        id
    }

    /// Stage input or output at `location`.
    pub fn stage_variable(&mut self, name: &str, storage: StorageClass, ty: u32, location: u32) -> u32 {
        let pointer = self.type_pointer(storage, ty);
        let id = self.variable(pointer, storage);
        self.name(id, name);
        self.decorate(id, Decoration::Location, &[location]);
        self.interface.push(id);
        id
    }

    /// Header, entry point, debug, annotation and global sections, then `main`.
    pub fn build(mut self) -> Vec<u32> {
        let void = self.id();
        let function_type = self.id();
        let main = self.id();
        let label = self.id();

        let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0300, 0, self.next_id, 0];
        emit(&mut words, Op::Capability, &[Capability::Shader as u32]);
        emit(
            &mut words,
            Op::MemoryModel,
            &[AddressingModel::Logical as u32, MemoryModel::GLSL450 as u32],
        );

        let mut entry_point = vec![self.model as u32, main];
        entry_point.extend(string_words("main"));
        entry_point.extend_from_slice(&self.interface);
        emit(&mut words, Op::EntryPoint, &entry_point);
        match self.model {
            ExecutionModel::Fragment => emit(
                &mut words,
                Op::ExecutionMode,
                &[main, ExecutionMode::OriginUpperLeft as u32],
            ),
            ExecutionModel::GLCompute => emit(
                &mut words,
                Op::ExecutionMode,
                &[main, ExecutionMode::LocalSize as u32, 1, 1, 1],
            ),
            _ => {}
        }

        words.extend(self.debug);
        words.extend(self.annotations);
        words.extend(self.globals);

        emit(&mut words, Op::TypeVoid, &[void]);
        emit(&mut words, Op::TypeFunction, &[function_type, void]);
        emit(&mut words, Op::Function, &[void, main, 0, function_type]);
        emit(&mut words, Op::Label, &[label]);
        emit(&mut words, Op::Return, &[]);
        emit(&mut words, Op::FunctionEnd, &[]);
        words
    }
}
