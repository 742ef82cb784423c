#![cfg(test)]

//! Assembles binary modules directly as word streams. Tests cannot check in
//! compiled fixtures, so they build exactly the instructions they need.

use crate::ops::*;
use crate::parser::MAGIC;
use crate::Id;

#[derive(Debug, Default)]
pub(crate) struct ModuleBuilder {
    next_id: Id,
    entry_points: Vec<u32>,
    execution_modes: Vec<u32>,
    debug: Vec<u32>,
    annotations: Vec<u32>,
    globals: Vec<u32>,
}

fn push_inst(section: &mut Vec<u32>, op: u32, operands: &[u32]) {
    section.push(((operands.len() as u32 + 1) << 16) | op);
    section.extend_from_slice(operands);
}

fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl ModuleBuilder {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub(crate) fn id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn raw_inst(&mut self, op: u32, operands: &[u32]) {
        push_inst(&mut self.globals, op, operands);
    }

    fn type_inst(&mut self, op: Op, operands: &[u32]) -> Id {
        let result = self.id();
        let mut words = vec![result];
        words.extend_from_slice(operands);
        push_inst(&mut self.globals, op.into(), &words);
        result
    }

    pub(crate) fn type_float(&mut self, width: u32) -> Id {
        self.type_inst(Op::TypeFloat, &[width])
    }

    pub(crate) fn type_int(&mut self, width: u32, signed: bool) -> Id {
        self.type_inst(Op::TypeInt, &[width, signed as u32])
    }

    pub(crate) fn type_vector(&mut self, component: Id, count: u32) -> Id {
        self.type_inst(Op::TypeVector, &[component, count])
    }

    pub(crate) fn type_struct(&mut self, members: &[Id]) -> Id {
        self.type_inst(Op::TypeStruct, members)
    }

    pub(crate) fn type_array(&mut self, element: Id, length: Id) -> Id {
        self.type_inst(Op::TypeArray, &[element, length])
    }

    pub(crate) fn type_image(
        &mut self,
        sampled_type: Id,
        dim: Dim,
        arrayed: bool,
        multisampled: bool,
        sampled: u32,
    ) -> Id {
        // format operand is Unknown (0)
        self.type_inst(
            Op::TypeImage,
            &[sampled_type, dim.into(), 0, arrayed as u32, multisampled as u32, sampled, 0],
        )
    }

    pub(crate) fn type_sampler(&mut self) -> Id {
        self.type_inst(Op::TypeSampler, &[])
    }

    pub(crate) fn type_sampled_image(&mut self, image: Id) -> Id {
        self.type_inst(Op::TypeSampledImage, &[image])
    }

    pub(crate) fn type_pointer(&mut self, storage_class: StorageClass, pointee: Id) -> Id {
        self.type_inst(Op::TypePointer, &[storage_class.into(), pointee])
    }

    pub(crate) fn constant_u32(&mut self, ty: Id, value: u32) -> Id {
        let result = self.id();
        push_inst(&mut self.globals, Op::Constant.into(), &[ty, result, value]);
        result
    }

    pub(crate) fn spec_constant_u32(&mut self, ty: Id, value: u32) -> Id {
        let result = self.id();
        push_inst(&mut self.globals, Op::SpecConstant.into(), &[ty, result, value]);
        result
    }

    pub(crate) fn spec_constant_composite(&mut self, ty: Id, parts: &[Id]) -> Id {
        let result = self.id();
        let mut words = vec![ty, result];
        words.extend_from_slice(parts);
        push_inst(&mut self.globals, Op::SpecConstantComposite.into(), &words);
        result
    }

    pub(crate) fn variable(&mut self, pointer_ty: Id, storage_class: StorageClass) -> Id {
        let result = self.id();
        push_inst(
            &mut self.globals,
            Op::Variable.into(),
            &[pointer_ty, result, storage_class.into()],
        );
        result
    }

    pub(crate) fn name(&mut self, target: Id, name: &str) {
        let mut words = vec![target];
        words.extend(string_words(name));
        push_inst(&mut self.debug, Op::Name.into(), &words);
    }

    pub(crate) fn member_name(&mut self, target: Id, member: u32, name: &str) {
        let mut words = vec![target, member];
        words.extend(string_words(name));
        push_inst(&mut self.debug, Op::MemberName.into(), &words);
    }

    pub(crate) fn decorate(&mut self, target: Id, decoration: Decoration, literals: &[u32]) {
        let mut words = vec![target, decoration.into()];
        words.extend_from_slice(literals);
        push_inst(&mut self.annotations, Op::Decorate.into(), &words);
    }

    pub(crate) fn member_decorate(
        &mut self,
        target: Id,
        member: u32,
        decoration: Decoration,
        literals: &[u32],
    ) {
        let mut words = vec![target, member, decoration.into()];
        words.extend_from_slice(literals);
        push_inst(&mut self.annotations, Op::MemberDecorate.into(), &words);
    }

    pub(crate) fn entry_point(
        &mut self,
        model: ExecutionModel,
        function: Id,
        name: &str,
        interface: &[Id],
    ) {
        let mut words = vec![model.into(), function];
        words.extend(string_words(name));
        words.extend_from_slice(interface);
        push_inst(&mut self.entry_points, Op::EntryPoint.into(), &words);
    }

    pub(crate) fn execution_mode_local_size(&mut self, function: Id, size: [u32; 3]) {
        push_inst(
            &mut self.execution_modes,
            Op::ExecutionMode.into(),
            &[function, ExecutionMode::LocalSize.into(), size[0], size[1], size[2]],
        );
    }

    pub(crate) fn finish(self) -> Vec<u32> {
        let mut words = vec![MAGIC, 0x0001_0000, 0, self.next_id, 0];
        words.extend(self.entry_points);
        words.extend(self.execution_modes);
        words.extend(self.debug);
        words.extend(self.annotations);
        words.extend(self.globals);
        words
    }
}
