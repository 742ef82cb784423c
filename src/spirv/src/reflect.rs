use log::trace;
use smallvec::SmallVec;

use crate::is_interface_storage;
use crate::module::{ConstantValue, DecorationSet, EntryPoint, Reflector, TypeNode};
use crate::ops::{BuiltIn, Dim, ExecutionModel, SourceLanguage, StorageClass};
use crate::reflection::*;
use crate::{Id, ReflectError, Result};

/// Source API the module was captured from. Decides how missing binding
/// decorations are treated: Vulkan modules normally carry explicit
/// set/binding pairs, GL modules never do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GraphicsApi {
    Vulkan,
    OpenGl,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BindCategory {
    ReadOnly,
    ReadWrite,
    Sampler,
    ConstantBlock,
}

struct SigTarget<'a> {
    sig: &'a mut Vec<SigParameter>,
    patch: Option<&'a mut Vec<InterfaceAccess>>,
    slot: u32,
}

impl Reflector {
    /// Names of every entry point in the module.
    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.entry_points.iter().map(|ep| ep.name.as_str())
    }

    pub fn stage_for_entry(&self, name: &str) -> Option<ExecutionModel> {
        self.entry_points
            .iter()
            .find(|ep| ep.name == name)
            .map(|ep| ep.execution_model)
    }

    pub fn version(&self) -> crate::Version {
        self.version
    }

    /// The ID bound the lookup tables were sized to; instrumentation uses
    /// this when appending new IDs.
    pub fn id_bound(&self) -> u32 {
        self.bound
    }

    pub fn source_language(&self) -> Option<SourceLanguage> {
        self.source.as_ref().map(|s| s.language)
    }

    /// Produces the full reflection artifacts for one entry point.
    ///
    /// Fails with [`ReflectError::EntryPointNotFound`] if no entry point
    /// matches both name and stage; that indicates a capture-format defect
    /// upstream, not a recoverable condition.
    pub fn make_reflection(
        &self,
        api: GraphicsApi,
        stage: ExecutionModel,
        entry_point: &str,
        spec_overrides: &[SpecConstant],
    ) -> Result<ReflectionArtifacts> {
        let ep = self
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point && ep.execution_model == stage)
            .ok_or_else(|| ReflectError::EntryPointNotFound(entry_point.to_owned()))?;

        let mut art = ReflectionArtifacts::default();
        art.reflection.entry_point = ep.name.clone();
        art.reflection.stage = Some(stage);

        self.reflect_interface(ep, &mut art, spec_overrides)?;
        self.reflect_resources(api, &mut art, spec_overrides)?;
        self.reflect_spec_constants(&mut art)?;

        if stage == ExecutionModel::GLCompute {
            art.reflection.workgroup_size = self.resolve_workgroup_size(ep, spec_overrides)?;
        }

        Ok(art)
    }

    // Flattens the entry point's interface variables into the input, output
    // and patch-constant signatures, emitting patch data alongside.
    fn reflect_interface(
        &self,
        ep: &EntryPoint,
        art: &mut ReflectionArtifacts,
        overrides: &[SpecConstant],
    ) -> Result<()> {
        let mut in_slot = 0;
        let mut out_slot = 0;
        let mut patch_slot = 0;

        for &id in &ep.interface {
            // Newer modules list every global here, not just I/O.
            let var = match self.variables.get(id) {
                Some(var) if is_interface_storage(var.storage_class) => var,
                _ => continue,
            };
            let decos = self.decoration_set(id);
            let pointee = self.strip_pointer(var.ty)?;
            let name = self
                .name_of(id)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("_{}", id));

            let access = InterfaceAccess {
                id,
                struct_id: 0,
                struct_member_index: 0,
                access_chain: SmallVec::new(),
                array_subsequent_element: false,
            };

            let is_input = var.storage_class == StorageClass::Input;
            let refl = &mut art.reflection;
            let mut target = if decos.patch {
                SigTarget {
                    sig: &mut refl.patch_constant_sig,
                    patch: None,
                    slot: patch_slot,
                }
            } else if is_input {
                SigTarget {
                    sig: &mut refl.input_sig,
                    patch: Some(&mut art.patch_data.inputs),
                    slot: in_slot,
                }
            } else {
                SigTarget {
                    sig: &mut refl.output_sig,
                    patch: Some(&mut art.patch_data.outputs),
                    slot: out_slot,
                }
            };

            // An explicit location on the variable starts its slot run there,
            // including for aggregates that flatten into several entries.
            if let Some(location) = decos.location {
                target.slot = location;
            }

            self.add_signature_parameter(&name, pointee, &decos, access, &mut target, overrides)?;

            if decos.patch {
                patch_slot = target.slot;
            } else if is_input {
                in_slot = target.slot;
            } else {
                out_slot = target.slot;
            }
        }
        Ok(())
    }

    // One call per interface variable, recursing through structs and
    // exploded arrays down to leaf signature entries.
    fn add_signature_parameter(
        &self,
        name: &str,
        type_id: Id,
        decos: &DecorationSet,
        access: InterfaceAccess,
        target: &mut SigTarget<'_>,
        overrides: &[SpecConstant],
    ) -> Result<()> {
        match self.type_node(type_id)? {
            TypeNode::Struct { members } => {
                let members = members.clone();
                for (i, &member_ty) in members.iter().enumerate() {
                    let i = i as u32;
                    let member_name = match self.member_names.get(&(type_id, i)) {
                        Some(m) => format!("{}.{}", name, m),
                        None => format!("{}._child{}", name, i),
                    };
                    let mdecos = self.member_decoration_set(type_id, i);

                    let mut chain = access.access_chain.clone();
                    chain.push(i);
                    let member_access = InterfaceAccess {
                        id: access.id,
                        struct_id: type_id,
                        struct_member_index: i,
                        access_chain: chain,
                        array_subsequent_element: access.array_subsequent_element,
                    };
                    self.add_signature_parameter(
                        &member_name,
                        member_ty,
                        &mdecos,
                        member_access,
                        target,
                        overrides,
                    )?;
                }
                Ok(())
            }
            TypeNode::Array { element, length } => {
                let element = *element;
                let count = self.evaluate_constant(*length, overrides)? as u32;
                // An explicit location starts the element run there; the
                // elements themselves take consecutive slots from it.
                if let Some(location) = decos.location {
                    target.slot = location;
                }
                let elem_decos = DecorationSet {
                    location: None,
                    ..decos.clone()
                };
                for e in 0..count {
                    let mut chain = access.access_chain.clone();
                    chain.push(e);
                    let elem_access = InterfaceAccess {
                        access_chain: chain,
                        array_subsequent_element: e > 0 || access.array_subsequent_element,
                        ..access.clone()
                    };
                    self.add_signature_parameter(
                        &format!("{}[{}]", name, e),
                        element,
                        &elem_decos,
                        elem_access,
                        target,
                        overrides,
                    )?;
                }
                Ok(())
            }
            TypeNode::RuntimeArray { .. } => {
                trace!("skipping runtime array in interface: {}", name);
                Ok(())
            }
            _ => {
                let (comp_type, comp_count, cols) = self.leaf_format(type_id)?;
                let builtin = decos.builtin.map(map_builtin);
                let reg_index = if builtin.is_some() {
                    None
                } else {
                    if let Some(location) = decos.location {
                        target.slot = location;
                    }
                    let index = target.slot;
                    target.slot += cols;
                    Some(index)
                };

                target.sig.push(SigParameter {
                    name: name.to_owned(),
                    reg_index,
                    builtin,
                    comp_type,
                    comp_count,
                    cols,
                });
                if let Some(patch) = target.patch.as_deref_mut() {
                    patch.push(access);
                }
                Ok(())
            }
        }
    }

    fn leaf_format(&self, type_id: Id) -> Result<(ComponentType, u32, u32)> {
        match self.type_node(type_id)? {
            TypeNode::Bool => Ok((ComponentType::Bool, 1, 1)),
            TypeNode::Int { signed: true, .. } => Ok((ComponentType::SInt, 1, 1)),
            TypeNode::Int { signed: false, .. } => Ok((ComponentType::UInt, 1, 1)),
            TypeNode::Float { width: 64 } => Ok((ComponentType::Double, 1, 1)),
            TypeNode::Float { .. } => Ok((ComponentType::Float, 1, 1)),
            TypeNode::Vector { component, count } => {
                let (comp_type, _, _) = self.leaf_format(*component)?;
                Ok((comp_type, *count, 1))
            }
            TypeNode::Matrix { column, columns } => {
                let (comp_type, rows, _) = self.leaf_format(*column)?;
                Ok((comp_type, rows, *columns))
            }
            _ => Err(ReflectError::MalformedType(type_id)),
        }
    }

    // Classifies every bindable global into its category and records its
    // physical binding, or an implicit one when undecorated.
    fn reflect_resources(
        &self,
        api: GraphicsApi,
        art: &mut ReflectionArtifacts,
        overrides: &[SpecConstant],
    ) -> Result<()> {
        struct Entry {
            category: BindCategory,
            resource: Option<ShaderResource>,
            block: Option<ConstantBlock>,
            bindpoint: Bindpoint,
        }

        let mut entries = Vec::new();
        let mut next_implicit = 0u32;

        for (id, var) in self.variables.iter() {
            let decos = self.decoration_set(id);
            let pointee = self.strip_pointer(var.ty)?;
            // Arrays of bindings flatten into one resource with a count.
            let (inner_ty, bind_count) = self.strip_binding_arrays(pointee, overrides)?;
            let name = self
                .name_of(id)
                .or_else(|| self.name_of(inner_ty))
                .map(str::to_owned)
                .unwrap_or_else(|| format!("_{}", id));

            let classified = match var.storage_class {
                StorageClass::Uniform | StorageClass::StorageBuffer => {
                    self.classify_buffer_backed(var.storage_class, inner_ty, &decos)?
                }
                StorageClass::PushConstant => Some(BindCategory::ConstantBlock),
                StorageClass::UniformConstant => {
                    self.classify_opaque(inner_ty).map(|kind| match kind {
                        ResourceKind::Sampler => BindCategory::Sampler,
                        ResourceKind::Image(_) | ResourceKind::RwTexelBuffer => {
                            BindCategory::ReadWrite
                        }
                        _ => BindCategory::ReadOnly,
                    })
                }
                StorageClass::AtomicCounter => Some(BindCategory::ReadWrite),
                _ => None,
            };
            let Some(category) = classified else { continue };

            let push_constant = var.storage_class == StorageClass::PushConstant;
            let bindpoint = if push_constant {
                Bindpoint {
                    set: PUSH_CONSTANT_BIND_SET,
                    bind: 0,
                    implicit: false,
                }
            } else {
                let implicit =
                    api == GraphicsApi::OpenGl || decos.set.is_none() || decos.binding.is_none();
                let bind = match decos.binding {
                    Some(bind) => bind,
                    None => {
                        let bind = next_implicit;
                        next_implicit += 1;
                        bind
                    }
                };
                Bindpoint {
                    set: decos.set.unwrap_or(0),
                    bind,
                    implicit,
                }
            };

            let (resource, block) = if category == BindCategory::ConstantBlock {
                let block = ConstantBlock {
                    name,
                    byte_size: self.type_byte_size(inner_ty, overrides)?,
                    buffer_backed: !push_constant,
                    push_constant,
                    compile_constants: false,
                    variables: self.make_constant_block_variables(inner_ty, overrides)?,
                };
                (None, Some(block))
            } else {
                let kind = match (var.storage_class, category) {
                    (StorageClass::AtomicCounter, _) => ResourceKind::AtomicCounter,
                    (StorageClass::Uniform | StorageClass::StorageBuffer, _) => {
                        ResourceKind::Buffer
                    }
                    _ => self.classify_opaque(inner_ty).unwrap_or(ResourceKind::Sampler),
                };
                (
                    Some(ShaderResource {
                        name,
                        kind,
                        bind_count,
                    }),
                    None,
                )
            };

            entries.push(Entry {
                category,
                resource,
                block,
                bindpoint,
            });
        }

        entries.sort_by_key(|e| (e.bindpoint.set, e.bindpoint.bind));

        for entry in entries {
            let refl = &mut art.reflection;
            let map = &mut art.bindpoints;
            match entry.category {
                BindCategory::ReadOnly => {
                    refl.read_only_resources.push(entry.resource.unwrap());
                    map.read_only_resources.push(entry.bindpoint);
                }
                BindCategory::ReadWrite => {
                    refl.read_write_resources.push(entry.resource.unwrap());
                    map.read_write_resources.push(entry.bindpoint);
                }
                BindCategory::Sampler => {
                    refl.samplers.push(entry.resource.unwrap());
                    map.samplers.push(entry.bindpoint);
                }
                BindCategory::ConstantBlock => {
                    refl.constant_blocks.push(entry.block.unwrap());
                    map.constant_blocks.push(entry.bindpoint);
                }
            }
        }
        Ok(())
    }

    fn classify_buffer_backed(
        &self,
        storage_class: StorageClass,
        type_id: Id,
        var_decos: &DecorationSet,
    ) -> Result<Option<BindCategory>> {
        let type_decos = self.decoration_set(type_id);
        let category = if storage_class == StorageClass::Uniform && type_decos.block {
            Some(BindCategory::ConstantBlock)
        } else if type_decos.buffer_block || storage_class == StorageClass::StorageBuffer {
            if var_decos.non_writable || type_decos.non_writable {
                Some(BindCategory::ReadOnly)
            } else {
                Some(BindCategory::ReadWrite)
            }
        } else {
            None
        };
        Ok(category)
    }

    fn classify_opaque(&self, type_id: Id) -> Option<ResourceKind> {
        match self.types.get(type_id)? {
            TypeNode::Sampler => Some(ResourceKind::Sampler),
            TypeNode::SampledImage { image } => match self.types.get(*image)? {
                TypeNode::Image { dim: Dim::Buffer, .. } => Some(ResourceKind::TexelBuffer),
                TypeNode::Image { dim, .. } => Some(ResourceKind::CombinedSampler((*dim).into())),
                _ => None,
            },
            TypeNode::Image {
                dim: Dim::SubpassData,
                ..
            } => Some(ResourceKind::InputAttachment),
            TypeNode::Image {
                dim: Dim::Buffer,
                sampled,
                ..
            } => Some(if *sampled == 2 {
                ResourceKind::RwTexelBuffer
            } else {
                ResourceKind::TexelBuffer
            }),
            TypeNode::Image { dim, sampled, .. } => Some(if *sampled == 2 {
                ResourceKind::Image((*dim).into())
            } else {
                ResourceKind::Texture((*dim).into())
            }),
            _ => None,
        }
    }

    // Unwraps arrays around a binding type, multiplying out the flattened
    // binding count. Runtime arrays reflect as count 0 (bindless).
    fn strip_binding_arrays(&self, type_id: Id, overrides: &[SpecConstant]) -> Result<(Id, u32)> {
        let mut id = type_id;
        let mut count = 1u32;
        loop {
            match self.type_node(id)? {
                TypeNode::Array { element, length } => {
                    count = count.saturating_mul(self.evaluate_constant(*length, overrides)? as u32);
                    id = *element;
                }
                TypeNode::RuntimeArray { element } => {
                    count = 0;
                    id = *element;
                }
                _ => return Ok((id, count)),
            }
        }
    }

    fn make_constant_block_variables(
        &self,
        struct_id: Id,
        overrides: &[SpecConstant],
    ) -> Result<Vec<ShaderConstant>> {
        let members = match self.type_node(struct_id)? {
            TypeNode::Struct { members } => members.clone(),
            // A non-aggregate block body reflects as a single unnamed value.
            _ => {
                return Ok(vec![ShaderConstant {
                    name: "_".to_owned(),
                    byte_offset: 0,
                    ty: self.constant_type(struct_id, overrides)?,
                    spec_id: None,
                    default_value: 0,
                }])
            }
        };

        let mut vars = Vec::with_capacity(members.len());
        let mut running_offset = 0;
        for (i, &member_ty) in members.iter().enumerate() {
            let i = i as u32;
            let name = self
                .member_names
                .get(&(struct_id, i))
                .cloned()
                .unwrap_or_else(|| format!("_child{}", i));
            let mdecos = self.member_decoration_set(struct_id, i);
            let byte_offset = mdecos.offset.unwrap_or(running_offset);
            let ty = self.constant_type(member_ty, overrides)?;
            running_offset = byte_offset + self.type_byte_size(member_ty, overrides)?;
            vars.push(ShaderConstant {
                name,
                byte_offset,
                ty,
                spec_id: None,
                default_value: 0,
            });
        }
        Ok(vars)
    }

    fn constant_type(&self, type_id: Id, overrides: &[SpecConstant]) -> Result<ConstantType> {
        let node = self.type_node(type_id)?;
        let mut ty = ConstantType {
            elements: 1,
            ..Default::default()
        };
        match node {
            TypeNode::Bool | TypeNode::Int { .. } | TypeNode::Float { .. } => {
                let (comp_type, _, _) = self.leaf_format(type_id)?;
                ty.comp_type = Some(comp_type);
                ty.rows = 1;
                ty.cols = 1;
            }
            TypeNode::Vector { component, count } => {
                let (comp_type, _, _) = self.leaf_format(*component)?;
                ty.comp_type = Some(comp_type);
                ty.rows = 1;
                ty.cols = *count;
            }
            TypeNode::Matrix { column, columns } => {
                let (comp_type, rows, _) = self.leaf_format(*column)?;
                ty.comp_type = Some(comp_type);
                ty.rows = rows;
                ty.cols = *columns;
            }
            TypeNode::Array { element, length } => {
                let inner = self.constant_type(*element, overrides)?;
                let elements = self.evaluate_constant(*length, overrides)? as u32;
                let array_stride = self
                    .decoration_set(type_id)
                    .array_stride
                    .unwrap_or_else(|| {
                        self.type_byte_size(*element, overrides).unwrap_or(0)
                    });
                ty = ConstantType {
                    elements,
                    array_stride,
                    ..inner
                };
            }
            TypeNode::RuntimeArray { element } => {
                let inner = self.constant_type(*element, overrides)?;
                let array_stride = self.decoration_set(type_id).array_stride.unwrap_or(0);
                ty = ConstantType {
                    elements: 0,
                    array_stride,
                    ..inner
                };
            }
            TypeNode::Struct { .. } => {
                ty.members = self.make_constant_block_variables(type_id, overrides)?;
            }
            TypeNode::Pointer { .. } => {
                // Physical pointers reflect as raw 64-bit values.
                trace!("physical pointer member at type {}", type_id);
                ty.comp_type = Some(ComponentType::UInt);
                ty.rows = 1;
                ty.cols = 1;
            }
            _ => return Err(ReflectError::MalformedType(type_id)),
        }
        Ok(ty)
    }

    fn type_byte_size(&self, type_id: Id, overrides: &[SpecConstant]) -> Result<u32> {
        Ok(match self.type_node(type_id)? {
            TypeNode::Void | TypeNode::Sampler | TypeNode::SampledImage { .. }
            | TypeNode::Image { .. } => 0,
            TypeNode::Bool => 4,
            TypeNode::Int { width, .. } | TypeNode::Float { width } => width / 8,
            TypeNode::Vector { component, count } => {
                count * self.type_byte_size(*component, overrides)?
            }
            TypeNode::Matrix { column, columns } => {
                let stride = match self.decoration_set(type_id).matrix_stride {
                    Some(stride) => stride,
                    None => self.type_byte_size(*column, overrides)?,
                };
                columns * stride
            }
            TypeNode::Array { element, length } => {
                let count = self.evaluate_constant(*length, overrides)? as u32;
                let stride = match self.decoration_set(type_id).array_stride {
                    Some(stride) => stride,
                    None => self.type_byte_size(*element, overrides)?,
                };
                count * stride
            }
            TypeNode::RuntimeArray { .. } => 0,
            TypeNode::Struct { members } => {
                let mut size = 0;
                let mut running = 0;
                for (i, &member) in members.iter().enumerate() {
                    let offset = self
                        .member_decoration_set(type_id, i as u32)
                        .offset
                        .unwrap_or(running);
                    let member_size = self.type_byte_size(member, overrides)?;
                    running = offset + member_size;
                    size = size.max(running);
                }
                size
            }
            TypeNode::Pointer { .. } => 8,
        })
    }

    // Gathers SpecId-decorated constants into the synthetic "compile-time"
    // constant block so specialization state shows up like any other
    // constant storage.
    fn reflect_spec_constants(&self, art: &mut ReflectionArtifacts) -> Result<()> {
        let mut members = Vec::new();
        for (id, constant) in self.constants.iter() {
            if !constant.spec {
                continue;
            }
            let Some(spec_id) = self.decoration_set(id).spec_id else {
                continue;
            };
            let default_value = match &constant.value {
                ConstantValue::Bool(b) => *b as u64,
                ConstantValue::Scalar(v) => *v,
                // Composite spec constants (e.g. WorkgroupSize) are not
                // independently specializable members.
                ConstantValue::Composite(_) => continue,
            };
            members.push(ShaderConstant {
                name: self
                    .name_of(id)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("spec{}", spec_id)),
                byte_offset: spec_id,
                ty: self.constant_type(constant.ty, &[])?,
                spec_id: Some(spec_id),
                default_value,
            });
        }
        if members.is_empty() {
            return Ok(());
        }
        members.sort_by_key(|m| m.spec_id);

        art.reflection.constant_blocks.push(ConstantBlock {
            name: "Specialization Constants".to_owned(),
            byte_size: 0,
            buffer_backed: false,
            push_constant: false,
            compile_constants: true,
            variables: members,
        });
        art.bindpoints.constant_blocks.push(Bindpoint {
            set: SPEC_CONSTANT_BIND_SET,
            bind: 0,
            implicit: false,
        });
        Ok(())
    }

    /// Evaluates a scalar constant, honoring specialization overrides for
    /// SpecId-decorated constants; unresolved overrides fall back to the
    /// declared default.
    pub(crate) fn evaluate_constant(&self, id: Id, overrides: &[SpecConstant]) -> Result<u64> {
        let constant = self
            .constants
            .get(id)
            .ok_or(ReflectError::UnresolvableConstant(id))?;
        if constant.spec {
            if let Some(spec_id) = self.decoration_set(id).spec_id {
                if let Some(over) = overrides.iter().find(|o| o.spec_id == spec_id) {
                    return Ok(over.value);
                }
            }
        }
        match &constant.value {
            ConstantValue::Bool(b) => Ok(*b as u64),
            ConstantValue::Scalar(v) => Ok(*v),
            ConstantValue::Composite(_) => Err(ReflectError::UnresolvableConstant(id)),
        }
    }

    // The WorkgroupSize builtin constant takes precedence over the LocalSize
    // execution mode when both are present.
    fn resolve_workgroup_size(
        &self,
        ep: &EntryPoint,
        overrides: &[SpecConstant],
    ) -> Result<[u32; 3]> {
        for (id, constant) in self.constants.iter() {
            if self.decoration_set(id).builtin != Some(BuiltIn::WorkgroupSize) {
                continue;
            }
            if let ConstantValue::Composite(parts) = &constant.value {
                if parts.len() < 3 {
                    return Err(ReflectError::MalformedType(id));
                }
                let mut size = [1; 3];
                for (out, &part) in size.iter_mut().zip(parts.iter()) {
                    *out = self.evaluate_constant(part, overrides)? as u32;
                }
                return Ok(size);
            }
        }
        Ok(self.local_sizes.get(&ep.function).copied().unwrap_or([1, 1, 1]))
    }
}

fn map_builtin(builtin: BuiltIn) -> ShaderBuiltin {
    match builtin {
        BuiltIn::Position => ShaderBuiltin::Position,
        BuiltIn::PointSize => ShaderBuiltin::PointSize,
        BuiltIn::ClipDistance => ShaderBuiltin::ClipDistance,
        BuiltIn::CullDistance => ShaderBuiltin::CullDistance,
        BuiltIn::VertexId | BuiltIn::VertexIndex => ShaderBuiltin::VertexIndex,
        BuiltIn::InstanceId | BuiltIn::InstanceIndex => ShaderBuiltin::InstanceIndex,
        BuiltIn::PrimitiveId => ShaderBuiltin::PrimitiveIndex,
        BuiltIn::InvocationId => ShaderBuiltin::InvocationIndex,
        BuiltIn::Layer => ShaderBuiltin::RenderTargetArrayIndex,
        BuiltIn::ViewportIndex => ShaderBuiltin::ViewportIndex,
        BuiltIn::TessLevelOuter => ShaderBuiltin::OuterTessFactor,
        BuiltIn::TessLevelInner => ShaderBuiltin::InnerTessFactor,
        BuiltIn::TessCoord => ShaderBuiltin::DomainLocation,
        BuiltIn::PatchVertices => ShaderBuiltin::PatchVertexCount,
        BuiltIn::FragCoord => ShaderBuiltin::FragCoord,
        BuiltIn::PointCoord => ShaderBuiltin::PointCoord,
        BuiltIn::FrontFacing => ShaderBuiltin::IsFrontFace,
        BuiltIn::SampleId => ShaderBuiltin::SampleIndex,
        BuiltIn::SamplePosition => ShaderBuiltin::SamplePosition,
        BuiltIn::SampleMask => ShaderBuiltin::CoverageMask,
        BuiltIn::FragDepth => ShaderBuiltin::DepthOutput,
        BuiltIn::HelperInvocation => ShaderBuiltin::IsHelperInvocation,
        BuiltIn::NumWorkgroups => ShaderBuiltin::GroupCount,
        BuiltIn::WorkgroupSize => ShaderBuiltin::GroupSize,
        BuiltIn::WorkgroupId => ShaderBuiltin::GroupIndex,
        BuiltIn::LocalInvocationId => ShaderBuiltin::ThreadIndexInGroup,
        BuiltIn::GlobalInvocationId => ShaderBuiltin::DispatchThreadIndex,
        BuiltIn::LocalInvocationIndex => ShaderBuiltin::ThreadFlatIndexInGroup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Decoration;
    use crate::testing::ModuleBuilder;

    fn reflect(
        words: &[u32],
        stage: ExecutionModel,
        overrides: &[SpecConstant],
    ) -> ReflectionArtifacts {
        let refl = Reflector::parse(words).unwrap();
        refl.make_reflection(GraphicsApi::Vulkan, stage, "main", overrides)
            .unwrap()
    }

    #[test]
    fn minimal_round_trip() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let in_ptr = b.type_pointer(StorageClass::Input, float);
        let out_ptr = b.type_pointer(StorageClass::Output, float);
        let input = b.variable(in_ptr, StorageClass::Input);
        let output = b.variable(out_ptr, StorageClass::Output);
        b.name(input, "in_value");
        b.name(output, "out_value");
        b.decorate(input, Decoration::Location, &[0]);
        b.decorate(output, Decoration::Location, &[0]);
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[input, output]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::Vertex, &[]);
        let refl = &art.reflection;
        assert_eq!(refl.input_sig.len(), 1);
        assert_eq!(refl.output_sig.len(), 1);
        assert_eq!(refl.input_sig[0].name, "in_value");
        assert_eq!(refl.input_sig[0].reg_index, Some(0));
        assert_eq!(refl.input_sig[0].comp_type, ComponentType::Float);
        assert_eq!(refl.output_sig[0].reg_index, Some(0));
        assert_eq!(art.patch_data.inputs.len(), 1);
        assert_eq!(art.patch_data.inputs[0].id, input);
    }

    #[test]
    fn missing_entry_point_fails() {
        let mut b = ModuleBuilder::new();
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[]);
        let words = b.finish();

        let refl = Reflector::parse(&words).unwrap();
        let err = refl
            .make_reflection(GraphicsApi::Vulkan, ExecutionModel::Vertex, "missing", &[])
            .unwrap_err();
        assert_eq!(err, ReflectError::EntryPointNotFound("missing".to_owned()));
        // A name match with the wrong stage is still not found.
        assert!(refl
            .make_reflection(GraphicsApi::Vulkan, ExecutionModel::Fragment, "main", &[])
            .is_err());
    }

    #[test]
    fn array_explosion_flags_subsequent_elements() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let uint = b.type_int(32, false);
        let three = b.constant_u32(uint, 3);
        let arr = b.type_array(float, three);
        let ptr = b.type_pointer(StorageClass::Output, arr);
        let var = b.variable(ptr, StorageClass::Output);
        b.name(var, "values");
        b.decorate(var, Decoration::Location, &[0]);
        let scalar_ptr = b.type_pointer(StorageClass::Output, float);
        let tail = b.variable(scalar_ptr, StorageClass::Output);
        b.name(tail, "tail");
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[var, tail]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::Vertex, &[]);
        assert_eq!(art.reflection.output_sig.len(), 4);
        assert_eq!(art.reflection.output_sig[1].name, "values[1]");
        assert_eq!(
            art.reflection.output_sig.iter().map(|s| s.reg_index).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2), Some(3)],
        );

        let patch = &art.patch_data.outputs;
        assert_eq!(patch.len(), 4);
        assert!(!patch[0].array_subsequent_element);
        assert!(patch[1].array_subsequent_element);
        assert!(patch[2].array_subsequent_element);
        assert_eq!(&patch[2].access_chain[..], &[2]);
        assert!(!patch[3].array_subsequent_element);
    }

    #[test]
    fn spec_constant_array_length_override() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let uint = b.type_int(32, false);
        let len = b.spec_constant_u32(uint, 2);
        b.decorate(len, Decoration::SpecId, &[7]);
        let arr = b.type_array(float, len);
        let ptr = b.type_pointer(StorageClass::Output, arr);
        let var = b.variable(ptr, StorageClass::Output);
        b.decorate(var, Decoration::Location, &[0]);
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[var]);
        let words = b.finish();

        // Default length applies without an override.
        let art = reflect(&words, ExecutionModel::Vertex, &[]);
        assert_eq!(art.reflection.output_sig.len(), 2);

        let art = reflect(&words, ExecutionModel::Vertex, &[SpecConstant::new(7, 5, 4)]);
        assert_eq!(art.reflection.output_sig.len(), 5);
        // An override for a different spec id falls back to the default.
        let art = reflect(&words, ExecutionModel::Vertex, &[SpecConstant::new(8, 9, 4)]);
        assert_eq!(art.reflection.output_sig.len(), 2);
    }

    #[test]
    fn struct_flattening_and_builtins() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let vec4 = b.type_vector(float, 4);
        let per_vertex = b.type_struct(&[vec4, float]);
        b.name(per_vertex, "gl_PerVertex");
        b.member_name(per_vertex, 0, "gl_Position");
        b.member_name(per_vertex, 1, "gl_PointSize");
        b.member_decorate(per_vertex, 0, Decoration::BuiltIn, &[u32::from(BuiltIn::Position)]);
        b.member_decorate(per_vertex, 1, Decoration::BuiltIn, &[u32::from(BuiltIn::PointSize)]);
        let ptr = b.type_pointer(StorageClass::Output, per_vertex);
        let var = b.variable(ptr, StorageClass::Output);
        b.name(var, "");
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[var]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::Vertex, &[]);
        let sig = &art.reflection.output_sig;
        assert_eq!(sig.len(), 2);
        assert_eq!(sig[0].builtin, Some(ShaderBuiltin::Position));
        assert_eq!(sig[0].reg_index, None);
        assert_eq!(sig[1].builtin, Some(ShaderBuiltin::PointSize));
        assert!(sig[0].name.ends_with("gl_Position"));

        let patch = &art.patch_data.outputs;
        assert_eq!(patch[0].struct_id, per_vertex);
        assert_eq!(patch[0].struct_member_index, 0);
        assert_eq!(&patch[1].access_chain[..], &[1]);
    }

    #[test]
    fn resource_classification_and_bindpoints() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let vec4 = b.type_vector(float, 4);
        let block_ty = b.type_struct(&[vec4]);
        b.decorate(block_ty, Decoration::Block, &[]);
        b.member_name(block_ty, 0, "color");
        b.member_decorate(block_ty, 0, Decoration::Offset, &[0]);
        let block_ptr = b.type_pointer(StorageClass::Uniform, block_ty);
        let ubo = b.variable(block_ptr, StorageClass::Uniform);
        b.name(ubo, "Globals");
        b.decorate(ubo, Decoration::DescriptorSet, &[0]);
        b.decorate(ubo, Decoration::Binding, &[2]);

        let image = b.type_image(float, Dim::Tex2D, false, false, 1);
        let sampled = b.type_sampled_image(image);
        let tex_ptr = b.type_pointer(StorageClass::UniformConstant, sampled);
        let tex = b.variable(tex_ptr, StorageClass::UniformConstant);
        b.name(tex, "albedo");
        b.decorate(tex, Decoration::DescriptorSet, &[1]);
        b.decorate(tex, Decoration::Binding, &[0]);

        // Storage image with no binding decorations at all.
        let storage_image = b.type_image(float, Dim::Tex2D, false, false, 2);
        let img_ptr = b.type_pointer(StorageClass::UniformConstant, storage_image);
        let img = b.variable(img_ptr, StorageClass::UniformConstant);
        b.name(img, "out_image");

        let main = b.id();
        b.entry_point(ExecutionModel::Fragment, main, "main", &[]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::Fragment, &[]);
        let refl = &art.reflection;

        assert_eq!(refl.constant_blocks.len(), 1);
        assert_eq!(refl.constant_blocks[0].name, "Globals");
        assert_eq!(refl.constant_blocks[0].byte_size, 16);
        assert_eq!(refl.constant_blocks[0].variables[0].name, "color");
        assert_eq!(art.bindpoints.constant_blocks[0], Bindpoint { set: 0, bind: 2, implicit: false });

        assert_eq!(refl.read_only_resources.len(), 1);
        assert_eq!(
            refl.read_only_resources[0].kind,
            ResourceKind::CombinedSampler(TextureDim::Tex2D),
        );
        assert_eq!(art.bindpoints.read_only_resources[0], Bindpoint { set: 1, bind: 0, implicit: false });

        assert_eq!(refl.read_write_resources.len(), 1);
        assert_eq!(refl.read_write_resources[0].kind, ResourceKind::Image(TextureDim::Tex2D));
        assert!(art.bindpoints.read_write_resources[0].implicit);
    }

    #[test]
    fn separate_sampler_classified() {
        let mut b = ModuleBuilder::new();
        let sampler_ty = b.type_sampler();
        let ptr = b.type_pointer(StorageClass::UniformConstant, sampler_ty);
        let samp = b.variable(ptr, StorageClass::UniformConstant);
        b.name(samp, "point_sampler");
        b.decorate(samp, Decoration::DescriptorSet, &[0]);
        b.decorate(samp, Decoration::Binding, &[1]);
        let main = b.id();
        b.entry_point(ExecutionModel::Fragment, main, "main", &[]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::Fragment, &[]);
        assert_eq!(art.reflection.samplers.len(), 1);
        assert_eq!(art.reflection.samplers[0].kind, ResourceKind::Sampler);
        assert_eq!(art.bindpoints.samplers[0], Bindpoint { set: 0, bind: 1, implicit: false });
    }

    #[test]
    fn workgroup_size_with_overrides() {
        let mut b = ModuleBuilder::new();
        let uint = b.type_int(32, false);
        let x = b.spec_constant_u32(uint, 64);
        b.decorate(x, Decoration::SpecId, &[0]);
        let y = b.constant_u32(uint, 1);
        let z = b.constant_u32(uint, 1);
        let uvec3 = b.type_vector(uint, 3);
        let wg = b.spec_constant_composite(uvec3, &[x, y, z]);
        b.decorate(wg, Decoration::BuiltIn, &[u32::from(BuiltIn::WorkgroupSize)]);
        let main = b.id();
        b.entry_point(ExecutionModel::GLCompute, main, "main", &[]);
        b.execution_mode_local_size(main, [8, 8, 1]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::GLCompute, &[]);
        // The builtin constant wins over the execution mode.
        assert_eq!(art.reflection.workgroup_size, [64, 1, 1]);

        let art = reflect(&words, ExecutionModel::GLCompute, &[SpecConstant::new(0, 128, 4)]);
        assert_eq!(art.reflection.workgroup_size, [128, 1, 1]);
    }

    #[test]
    fn local_size_fallback() {
        let mut b = ModuleBuilder::new();
        let main = b.id();
        b.entry_point(ExecutionModel::GLCompute, main, "main", &[]);
        b.execution_mode_local_size(main, [4, 2, 1]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::GLCompute, &[]);
        assert_eq!(art.reflection.workgroup_size, [4, 2, 1]);
    }

    #[test]
    fn spec_constants_form_synthetic_block() {
        let mut b = ModuleBuilder::new();
        let uint = b.type_int(32, false);
        let c = b.spec_constant_u32(uint, 16);
        b.decorate(c, Decoration::SpecId, &[3]);
        b.name(c, "BLOCK_SIZE");
        let main = b.id();
        b.entry_point(ExecutionModel::GLCompute, main, "main", &[]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::GLCompute, &[]);
        let block = art
            .reflection
            .constant_blocks
            .iter()
            .find(|b| b.compile_constants)
            .unwrap();
        assert_eq!(block.variables.len(), 1);
        assert_eq!(block.variables[0].name, "BLOCK_SIZE");
        assert_eq!(block.variables[0].spec_id, Some(3));
        assert_eq!(block.variables[0].default_value, 16);

        let idx = art
            .reflection
            .constant_blocks
            .iter()
            .position(|b| b.compile_constants)
            .unwrap();
        assert_eq!(art.bindpoints.constant_blocks[idx].set, SPEC_CONSTANT_BIND_SET);
    }

    #[test]
    fn push_constants_use_reserved_set() {
        let mut b = ModuleBuilder::new();
        let float = b.type_float(32);
        let pc_ty = b.type_struct(&[float]);
        b.decorate(pc_ty, Decoration::Block, &[]);
        b.member_decorate(pc_ty, 0, Decoration::Offset, &[0]);
        let pc_ptr = b.type_pointer(StorageClass::PushConstant, pc_ty);
        let pc = b.variable(pc_ptr, StorageClass::PushConstant);
        b.name(pc, "push");
        let main = b.id();
        b.entry_point(ExecutionModel::Vertex, main, "main", &[]);
        let words = b.finish();

        let art = reflect(&words, ExecutionModel::Vertex, &[]);
        let block = &art.reflection.constant_blocks[0];
        assert!(block.push_constant);
        assert!(!block.buffer_backed);
        assert_eq!(art.bindpoints.constant_blocks[0].set, PUSH_CONSTANT_BIND_SET);
    }
}
