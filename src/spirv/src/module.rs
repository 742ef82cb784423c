use fnv::FnvHashMap;
use log::trace;

use crate::ops::*;
use crate::parser::{instructions, parse_header, Instruction, OperandReader, Version, HEADER_LEN};
use crate::{Id, ReflectError, Result};

/// Mapping from bounded small integer to value. Modules declare an ID bound
/// up front, so the common case is a dense table; absurd bounds fall back to
/// a hashed mapping rather than allocating proportionally.
#[derive(Debug)]
pub(crate) enum IdMap<T> {
    Dense(Vec<Option<T>>),
    Sparse(FnvHashMap<Id, T>),
}

const DENSE_ID_LIMIT: u32 = 1 << 20;

impl<T> IdMap<T> {
    pub(crate) fn with_bound(bound: u32) -> Self {
        if bound <= DENSE_ID_LIMIT {
            let mut vec = Vec::new();
            vec.resize_with(bound as usize, || None);
            Self::Dense(vec)
        } else {
            Self::Sparse(Default::default())
        }
    }

    pub(crate) fn get(&self, id: Id) -> Option<&T> {
        match self {
            Self::Dense(vec) => vec.get(id as usize)?.as_ref(),
            Self::Sparse(map) => map.get(&id),
        }
    }

    pub(crate) fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        match self {
            Self::Dense(vec) => vec.get_mut(id as usize)?.as_mut(),
            Self::Sparse(map) => map.get_mut(&id),
        }
    }

    pub(crate) fn insert(&mut self, id: Id, val: T) {
        match self {
            Self::Dense(vec) => {
                if id as usize >= vec.len() {
                    vec.resize_with(id as usize + 1, || None);
                }
                vec[id as usize] = Some(val);
            }
            Self::Sparse(map) => {
                map.insert(id, val);
            }
        }
    }

    pub(crate) fn remove(&mut self, id: Id) -> Option<T> {
        match self {
            Self::Dense(vec) => vec.get_mut(id as usize)?.take(),
            Self::Sparse(map) => map.remove(&id),
        }
    }

    pub(crate) fn iter(&self) -> Box<dyn Iterator<Item = (Id, &T)> + '_> {
        match self {
            Self::Dense(vec) => Box::new(
                vec.iter()
                    .enumerate()
                    .filter_map(|(id, val)| Some((id as Id, val.as_ref()?))),
            ),
            Self::Sparse(map) => Box::new(map.iter().map(|(&id, val)| (id, val))),
        }
    }
}

impl<T: Default> IdMap<T> {
    pub(crate) fn get_or_default(&mut self, id: Id) -> &mut T {
        match self {
            Self::Dense(vec) => {
                if id as usize >= vec.len() {
                    vec.resize_with(id as usize + 1, || None);
                }
                vec[id as usize].get_or_insert_with(Default::default)
            }
            Self::Sparse(map) => map.entry(id).or_default(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TypeNode {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Id, count: u32 },
    Matrix { column: Id, columns: u32 },
    Image {
        sampled_type: Id,
        dim: Dim,
        arrayed: bool,
        multisampled: bool,
        // 1 = used with a sampler, 2 = storage
        sampled: u32,
    },
    Sampler,
    SampledImage { image: Id },
    Array { element: Id, length: Id },
    RuntimeArray { element: Id },
    Struct { members: Vec<Id> },
    Pointer { storage_class: StorageClass, pointee: Id },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ConstantValue {
    Bool(bool),
    // Raw bits, up to 64 wide.
    Scalar(u64),
    Composite(Vec<Id>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Constant {
    pub(crate) ty: Id,
    pub(crate) value: ConstantValue,
    pub(crate) spec: bool,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Variable {
    // Pointer type of the variable.
    pub(crate) ty: Id,
    pub(crate) storage_class: StorageClass,
    #[allow(dead_code)]
    pub(crate) initializer: Option<Id>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct DecorationSet {
    pub(crate) location: Option<u32>,
    pub(crate) component: Option<u32>,
    pub(crate) set: Option<u32>,
    pub(crate) binding: Option<u32>,
    pub(crate) builtin: Option<BuiltIn>,
    pub(crate) spec_id: Option<u32>,
    pub(crate) offset: Option<u32>,
    pub(crate) array_stride: Option<u32>,
    pub(crate) matrix_stride: Option<u32>,
    pub(crate) input_attachment_index: Option<u32>,
    pub(crate) block: bool,
    pub(crate) buffer_block: bool,
    pub(crate) non_writable: bool,
    pub(crate) patch: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct EntryPoint {
    pub(crate) execution_model: ExecutionModel,
    pub(crate) function: Id,
    pub(crate) name: String,
    pub(crate) interface: Vec<Id>,
}

#[derive(Clone, Debug)]
pub(crate) struct SourceInfo {
    #[allow(dead_code)]
    pub(crate) language: SourceLanguage,
    #[allow(dead_code)]
    pub(crate) version: u32,
}

/// ID-indexed graph of a parsed binary module.
///
/// Built in two passes: a sizing pass that finds the maximum ID actually
/// used, then a single walk registering each instruction's effect. Individual
/// instructions can later be unregistered (and re-registered) to support
/// in-place rewriting without a full re-parse.
#[derive(Debug)]
pub struct Reflector {
    pub(crate) version: Version,
    pub(crate) bound: u32,
    pub(crate) types: IdMap<TypeNode>,
    pub(crate) constants: IdMap<Constant>,
    pub(crate) variables: IdMap<Variable>,
    pub(crate) names: IdMap<String>,
    pub(crate) member_names: FnvHashMap<(Id, u32), String>,
    pub(crate) decorations: IdMap<DecorationSet>,
    pub(crate) member_decorations: FnvHashMap<(Id, u32), DecorationSet>,
    pub(crate) entry_points: Vec<EntryPoint>,
    pub(crate) local_sizes: FnvHashMap<Id, [u32; 3]>,
    pub(crate) source: Option<SourceInfo>,
}

impl Reflector {
    /// Parses a word stream into the ID-indexed graph.
    pub fn parse(words: &[u32]) -> Result<Self> {
        let header = words
            .get(..HEADER_LEN)
            .ok_or(ReflectError::InvalidModule("truncated header"))?;
        let (version, bound) = parse_header(header)?;

        // Sizing pass: validate framing and find the maximum ID in use. The
        // header bound is advisory; the observed maximum wins if larger.
        let mut max_id = 0;
        for inst in instructions(words) {
            if let Some(id) = sizing_id(&inst?) {
                max_id = max_id.max(id);
            }
        }
        let table_bound = bound.max(max_id + 1);

        let mut reflector = Reflector {
            version,
            bound: table_bound,
            types: IdMap::with_bound(table_bound),
            constants: IdMap::with_bound(table_bound),
            variables: IdMap::with_bound(table_bound),
            names: IdMap::with_bound(table_bound),
            member_names: Default::default(),
            decorations: IdMap::with_bound(table_bound),
            member_decorations: Default::default(),
            entry_points: Default::default(),
            local_sizes: Default::default(),
            source: None,
        };

        for inst in instructions(words) {
            reflector.register_op(&inst?)?;
        }

        Ok(reflector)
    }

    /// Registers one instruction's effect into the graph.
    ///
    /// Opcodes outside the supported set are skipped; that is the
    /// forward-compatibility path, not an error.
    pub fn register_op(&mut self, inst: &Instruction<'_>) -> Result<()> {
        let op = match inst.op() {
            Some(op) => op,
            None => {
                trace!("skipping unknown opcode {}", inst.raw_op());
                return Ok(());
            }
        };

        let mut ops = inst.reader();
        match op {
            Op::Source => {
                let language = ops.parse_enum()?;
                let version = ops.consume()?;
                self.source = Some(SourceInfo { language, version });
            }
            Op::Name => {
                let target = ops.consume()?;
                self.names.insert(target, ops.parse_string()?);
            }
            Op::MemberName => {
                let target = ops.consume()?;
                let member = ops.consume()?;
                self.member_names.insert((target, member), ops.parse_string()?);
            }
            Op::EntryPoint => {
                let execution_model = ops.parse_enum()?;
                let function = ops.consume()?;
                let name = ops.parse_string()?;
                let interface = ops.remaining().to_owned();
                self.entry_points.push(EntryPoint {
                    execution_model,
                    function,
                    name,
                    interface,
                });
            }
            Op::ExecutionMode => {
                let function = ops.consume()?;
                // Only a few modes matter; unknown mode values are skipped
                // like unknown opcodes.
                match ExecutionMode::try_from(ops.consume()?) {
                    Ok(ExecutionMode::LocalSize) => {
                        let size = [ops.consume()?, ops.consume()?, ops.consume()?];
                        self.local_sizes.insert(function, size);
                    }
                    Ok(_) => {}
                    Err(InvalidEnumValue(mode)) => {
                        trace!("skipping unknown execution mode {}", mode);
                    }
                }
            }
            Op::TypeVoid => self.register_type(&mut ops, |_| Ok(TypeNode::Void))?,
            Op::TypeBool => self.register_type(&mut ops, |_| Ok(TypeNode::Bool))?,
            Op::TypeInt => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Int {
                    width: ops.consume()?,
                    signed: ops.consume()? != 0,
                })
            })?,
            Op::TypeFloat => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Float { width: ops.consume()? })
            })?,
            Op::TypeVector => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Vector {
                    component: ops.consume()?,
                    count: ops.consume()?,
                })
            })?,
            Op::TypeMatrix => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Matrix {
                    column: ops.consume()?,
                    columns: ops.consume()?,
                })
            })?,
            Op::TypeImage => self.register_type(&mut ops, |ops| {
                let sampled_type = ops.consume()?;
                let dim = ops.parse_enum()?;
                let _depth = ops.consume()?;
                let arrayed = ops.consume()? != 0;
                let multisampled = ops.consume()? != 0;
                let sampled = ops.consume()?;
                Ok(TypeNode::Image {
                    sampled_type,
                    dim,
                    arrayed,
                    multisampled,
                    sampled,
                })
            })?,
            Op::TypeSampler => self.register_type(&mut ops, |_| Ok(TypeNode::Sampler))?,
            Op::TypeSampledImage => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::SampledImage { image: ops.consume()? })
            })?,
            Op::TypeArray => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Array {
                    element: ops.consume()?,
                    length: ops.consume()?,
                })
            })?,
            Op::TypeRuntimeArray => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::RuntimeArray { element: ops.consume()? })
            })?,
            Op::TypeStruct => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Struct {
                    members: ops.remaining().to_owned(),
                })
            })?,
            Op::TypePointer => self.register_type(&mut ops, |ops| {
                Ok(TypeNode::Pointer {
                    storage_class: ops.parse_enum()?,
                    pointee: ops.consume()?,
                })
            })?,
            Op::ConstantTrue | Op::SpecConstantTrue => {
                self.register_constant(&mut ops, op, ConstantValue::Bool(true))?;
            }
            Op::ConstantFalse | Op::SpecConstantFalse => {
                self.register_constant(&mut ops, op, ConstantValue::Bool(false))?;
            }
            Op::Constant | Op::SpecConstant => {
                let ty = ops.consume()?;
                let result = ops.consume()?;
                let lo = ops.consume()? as u64;
                let hi = ops.consume_option().unwrap_or(0) as u64;
                self.constants.insert(
                    result,
                    Constant {
                        ty,
                        value: ConstantValue::Scalar((hi << 32) | lo),
                        spec: op == Op::SpecConstant,
                    },
                );
            }
            Op::ConstantComposite | Op::SpecConstantComposite => {
                let ty = ops.consume()?;
                let result = ops.consume()?;
                self.constants.insert(
                    result,
                    Constant {
                        ty,
                        value: ConstantValue::Composite(ops.remaining().to_owned()),
                        spec: op == Op::SpecConstantComposite,
                    },
                );
            }
            Op::Variable => {
                let ty = ops.consume()?;
                let result = ops.consume()?;
                let storage_class = ops.parse_enum()?;
                let initializer = ops.consume_option();
                // Function-local variables carry no module-level interface.
                if storage_class != StorageClass::Function {
                    self.variables.insert(
                        result,
                        Variable {
                            ty,
                            storage_class,
                            initializer,
                        },
                    );
                }
            }
            Op::Decorate => {
                let target = ops.consume()?;
                let set = self.decorations.get_or_default(target);
                apply_decoration(set, &mut ops)?;
            }
            Op::MemberDecorate => {
                let target = ops.consume()?;
                let member = ops.consume()?;
                let set = self.member_decorations.entry((target, member)).or_default();
                apply_decoration(set, &mut ops)?;
            }
            // Structural opcodes with no reflection effect.
            Op::Capability | Op::TypeOpaque | Op::TypeFunction | Op::Function | Op::FunctionEnd => {}
        }
        Ok(())
    }

    /// Removes a previously registered instruction's effect, so an
    /// instrumentation pass can rewrite the instruction and re-register it
    /// without re-parsing the whole module.
    pub fn unregister_op(&mut self, inst: &Instruction<'_>) -> Result<()> {
        let op = match inst.op() {
            Some(op) => op,
            None => return Ok(()),
        };

        let mut ops = inst.reader();
        match op {
            Op::Source => self.source = None,
            Op::Name => {
                self.names.remove(ops.consume()?);
            }
            Op::MemberName => {
                let target = ops.consume()?;
                let member = ops.consume()?;
                self.member_names.remove(&(target, member));
            }
            Op::EntryPoint => {
                let _model: ExecutionModel = ops.parse_enum()?;
                let function = ops.consume()?;
                let name = ops.parse_string()?;
                self.entry_points
                    .retain(|ep| ep.function != function || ep.name != name);
            }
            Op::ExecutionMode => {
                let function = ops.consume()?;
                if let Ok(ExecutionMode::LocalSize) = ExecutionMode::try_from(ops.consume()?) {
                    self.local_sizes.remove(&function);
                }
            }
            Op::TypeVoid | Op::TypeBool | Op::TypeInt | Op::TypeFloat | Op::TypeVector
            | Op::TypeMatrix | Op::TypeImage | Op::TypeSampler | Op::TypeSampledImage
            | Op::TypeArray | Op::TypeRuntimeArray | Op::TypeStruct | Op::TypePointer => {
                self.types.remove(ops.consume()?);
            }
            Op::ConstantTrue | Op::ConstantFalse | Op::Constant | Op::ConstantComposite
            | Op::SpecConstantTrue | Op::SpecConstantFalse | Op::SpecConstant
            | Op::SpecConstantComposite => {
                let _ty = ops.consume()?;
                self.constants.remove(ops.consume()?);
            }
            Op::Variable => {
                let _ty = ops.consume()?;
                self.variables.remove(ops.consume()?);
            }
            Op::Decorate => {
                let target = ops.consume()?;
                if let Some(set) = self.decorations.get_mut(target) {
                    clear_decoration(set, &mut ops)?;
                }
            }
            Op::MemberDecorate => {
                let target = ops.consume()?;
                let member = ops.consume()?;
                if let Some(set) = self.member_decorations.get_mut(&(target, member)) {
                    clear_decoration(set, &mut ops)?;
                }
            }
            Op::Capability | Op::TypeOpaque | Op::TypeFunction | Op::Function | Op::FunctionEnd => {}
        }
        Ok(())
    }

    fn register_type(
        &mut self,
        ops: &mut OperandReader<'_>,
        f: impl FnOnce(&mut OperandReader<'_>) -> Result<TypeNode>,
    ) -> Result<()> {
        let result = ops.consume()?;
        let node = f(ops)?;
        self.types.insert(result, node);
        Ok(())
    }

    fn register_constant(
        &mut self,
        ops: &mut OperandReader<'_>,
        op: Op,
        value: ConstantValue,
    ) -> Result<()> {
        let ty = ops.consume()?;
        let result = ops.consume()?;
        let spec = matches!(op, Op::SpecConstantTrue | Op::SpecConstantFalse);
        self.constants.insert(result, Constant { ty, value, spec });
        Ok(())
    }

    pub(crate) fn type_node(&self, id: Id) -> Result<&TypeNode> {
        self.types.get(id).ok_or(ReflectError::MalformedType(id))
    }

    /// Dereferences a pointer type to its pointee; non-pointers pass through.
    pub(crate) fn strip_pointer(&self, id: Id) -> Result<Id> {
        match self.type_node(id)? {
            TypeNode::Pointer { pointee, .. } => Ok(*pointee),
            _ => Ok(id),
        }
    }

    pub(crate) fn decoration_set(&self, id: Id) -> DecorationSet {
        self.decorations.get(id).cloned().unwrap_or_default()
    }

    pub(crate) fn member_decoration_set(&self, id: Id, member: u32) -> DecorationSet {
        self.member_decorations
            .get(&(id, member))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn name_of(&self, id: Id) -> Option<&str> {
        self.names.get(id).map(String::as_str).filter(|s| !s.is_empty())
    }
}

fn apply_decoration(set: &mut DecorationSet, ops: &mut OperandReader<'_>) -> Result<()> {
    let raw = ops.consume()?;
    let dec = match Decoration::try_from(raw) {
        Ok(dec) => dec,
        Err(_) => {
            trace!("skipping unknown decoration {}", raw);
            return Ok(());
        }
    };
    match dec {
        Decoration::SpecId => set.spec_id = Some(ops.consume()?),
        Decoration::Block => set.block = true,
        Decoration::BufferBlock => set.buffer_block = true,
        Decoration::ArrayStride => set.array_stride = Some(ops.consume()?),
        Decoration::MatrixStride => set.matrix_stride = Some(ops.consume()?),
        Decoration::BuiltIn => match BuiltIn::try_from(ops.consume()?) {
            Ok(builtin) => set.builtin = Some(builtin),
            Err(InvalidEnumValue(val)) => trace!("skipping unknown builtin {}", val),
        },
        Decoration::Patch => set.patch = true,
        Decoration::NonWritable => set.non_writable = true,
        Decoration::Location => set.location = Some(ops.consume()?),
        Decoration::Component => set.component = Some(ops.consume()?),
        Decoration::Binding => set.binding = Some(ops.consume()?),
        Decoration::DescriptorSet => set.set = Some(ops.consume()?),
        Decoration::Offset => set.offset = Some(ops.consume()?),
        Decoration::InputAttachmentIndex => set.input_attachment_index = Some(ops.consume()?),
        Decoration::RowMajor
        | Decoration::ColMajor
        | Decoration::NoPerspective
        | Decoration::Flat
        | Decoration::NonReadable => {}
    }
    Ok(())
}

fn clear_decoration(set: &mut DecorationSet, ops: &mut OperandReader<'_>) -> Result<()> {
    let dec = match Decoration::try_from(ops.consume()?) {
        Ok(dec) => dec,
        Err(_) => return Ok(()),
    };
    match dec {
        Decoration::SpecId => set.spec_id = None,
        Decoration::Block => set.block = false,
        Decoration::BufferBlock => set.buffer_block = false,
        Decoration::ArrayStride => set.array_stride = None,
        Decoration::MatrixStride => set.matrix_stride = None,
        Decoration::BuiltIn => set.builtin = None,
        Decoration::Patch => set.patch = false,
        Decoration::NonWritable => set.non_writable = false,
        Decoration::Location => set.location = None,
        Decoration::Component => set.component = None,
        Decoration::Binding => set.binding = None,
        Decoration::DescriptorSet => set.set = None,
        Decoration::Offset => set.offset = None,
        Decoration::InputAttachmentIndex => set.input_attachment_index = None,
        Decoration::RowMajor
        | Decoration::ColMajor
        | Decoration::NoPerspective
        | Decoration::Flat
        | Decoration::NonReadable => {}
    }
    Ok(())
}

// The IDs an instruction contributes to the table-sizing pass: result IDs
// plus annotation targets, which may precede their definitions.
fn sizing_id(inst: &Instruction<'_>) -> Option<Id> {
    let op = inst.op()?;
    let operands = inst.operands();
    match op {
        Op::Name | Op::MemberName | Op::Decorate | Op::MemberDecorate => operands.first().copied(),
        Op::TypeVoid | Op::TypeBool | Op::TypeInt | Op::TypeFloat | Op::TypeVector
        | Op::TypeMatrix | Op::TypeImage | Op::TypeSampler | Op::TypeSampledImage
        | Op::TypeArray | Op::TypeRuntimeArray | Op::TypeStruct | Op::TypeOpaque
        | Op::TypePointer | Op::TypeFunction => operands.first().copied(),
        Op::ConstantTrue | Op::ConstantFalse | Op::Constant | Op::ConstantComposite
        | Op::SpecConstantTrue | Op::SpecConstantFalse | Op::SpecConstant
        | Op::SpecConstantComposite | Op::Variable | Op::Function => operands.get(1).copied(),
        Op::EntryPoint | Op::ExecutionMode | Op::Source | Op::Capability | Op::FunctionEnd => None,
    }
}
