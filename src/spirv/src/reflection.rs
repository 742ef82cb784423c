//! API-agnostic reflection output consumed by the replay serializer and the
//! introspection UI. Everything here is plain data; the graph that produced
//! it is free to be discarded.

use smallvec::SmallVec;

use crate::ops::{Dim, ExecutionModel};
use crate::Id;

/// Bind set reserved for the synthetic specialization-constant block.
pub const SPEC_CONSTANT_BIND_SET: u32 = 1234567;
/// Bind set reserved for push-constant blocks.
pub const PUSH_CONSTANT_BIND_SET: u32 = 1234568;

/// Abstract builtin semantic, decoupled from any one API's numbering.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ShaderBuiltin {
    Position,
    PointSize,
    ClipDistance,
    CullDistance,
    VertexIndex,
    InstanceIndex,
    PrimitiveIndex,
    InvocationIndex,
    RenderTargetArrayIndex,
    ViewportIndex,
    OuterTessFactor,
    InnerTessFactor,
    DomainLocation,
    PatchVertexCount,
    FragCoord,
    PointCoord,
    IsFrontFace,
    SampleIndex,
    SamplePosition,
    CoverageMask,
    DepthOutput,
    IsHelperInvocation,
    GroupCount,
    GroupSize,
    GroupIndex,
    ThreadIndexInGroup,
    DispatchThreadIndex,
    ThreadFlatIndexInGroup,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ComponentType {
    Float,
    Double,
    SInt,
    UInt,
    Bool,
}

/// One flattened entry in an input/output/patch-constant signature.
#[derive(Clone, Debug, PartialEq)]
pub struct SigParameter {
    pub name: String,
    /// Semantic slot; `None` for builtin-decorated entries.
    pub reg_index: Option<u32>,
    pub builtin: Option<ShaderBuiltin>,
    pub comp_type: ComponentType,
    /// Components per register (vector width).
    pub comp_count: u32,
    /// Column count for matrix parameters, 1 otherwise. A matrix consumes
    /// this many consecutive slots.
    pub cols: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextureDim {
    Tex1D,
    Tex2D,
    Tex3D,
    Cube,
    Rect,
    Buffer,
    Subpass,
}

impl From<Dim> for TextureDim {
    fn from(dim: Dim) -> Self {
        match dim {
            Dim::Tex1D => Self::Tex1D,
            Dim::Tex2D => Self::Tex2D,
            Dim::Tex3D => Self::Tex3D,
            Dim::Cube => Self::Cube,
            Dim::Rect => Self::Rect,
            Dim::Buffer => Self::Buffer,
            Dim::SubpassData => Self::Subpass,
        }
    }
}

/// What kind of view a resource binding refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    Sampler,
    CombinedSampler(TextureDim),
    Texture(TextureDim),
    TexelBuffer,
    /// Storage image.
    Image(TextureDim),
    RwTexelBuffer,
    /// Storage buffer.
    Buffer,
    InputAttachment,
    AtomicCounter,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShaderResource {
    pub name: String,
    pub kind: ResourceKind,
    /// Flattened array element count of the binding (1 for non-arrays).
    pub bind_count: u32,
}

/// A leaf or aggregate member of a constant block.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderConstant {
    pub name: String,
    pub byte_offset: u32,
    pub ty: ConstantType,
    /// Specialization constant ID for members of the synthetic
    /// specialization block.
    pub spec_id: Option<u32>,
    /// Default value bits for specialization constants.
    pub default_value: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantType {
    pub comp_type: Option<ComponentType>,
    pub rows: u32,
    pub cols: u32,
    /// Array element count; 0 for runtime arrays, 1 for non-arrays.
    pub elements: u32,
    pub array_stride: u32,
    pub members: Vec<ShaderConstant>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantBlock {
    pub name: String,
    pub byte_size: u32,
    /// Backed by a buffer binding, as opposed to push or specialization
    /// storage.
    pub buffer_backed: bool,
    pub push_constant: bool,
    /// The synthetic block holding specialization constants.
    pub compile_constants: bool,
    pub variables: Vec<ShaderConstant>,
}

/// Structured description of one entry point's interface.
#[derive(Clone, Debug, Default)]
pub struct ShaderReflection {
    pub entry_point: String,
    pub stage: Option<ExecutionModel>,
    pub input_sig: Vec<SigParameter>,
    pub output_sig: Vec<SigParameter>,
    pub patch_constant_sig: Vec<SigParameter>,
    pub read_only_resources: Vec<ShaderResource>,
    pub read_write_resources: Vec<ShaderResource>,
    pub samplers: Vec<ShaderResource>,
    pub constant_blocks: Vec<ConstantBlock>,
    /// Compute workgroup size, after specialization overrides.
    pub workgroup_size: [u32; 3],
}

/// Physical binding location for one reflected resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Bindpoint {
    pub set: u32,
    pub bind: u32,
    /// No explicit binding decoration was present; the location was assigned
    /// implicitly and must be remapped before use.
    pub implicit: bool,
}

/// Parallel to the resource lists in [`ShaderReflection`]: every resource has
/// exactly one entry in its category's array, at the same index.
#[derive(Clone, Debug, Default)]
pub struct BindpointMapping {
    pub read_only_resources: Vec<Bindpoint>,
    pub read_write_resources: Vec<Bindpoint>,
    pub samplers: Vec<Bindpoint>,
    pub constant_blocks: Vec<Bindpoint>,
}

/// Where a flattened signature entry physically came from, so later
/// instrumentation can locate the value without re-deriving the flattening.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceAccess {
    /// ID of the base variable.
    pub id: Id,
    /// ID of the struct parent, or 0 when the entry is not a struct member.
    pub struct_id: Id,
    /// Member index in the parent struct.
    pub struct_member_index: u32,
    /// The access chain of indices from the base variable to the value.
    pub access_chain: SmallVec<[u32; 4]>,
    /// Set on elements [1], [2], ... of an exploded array, never on element
    /// [0] or on non-arrays.
    pub array_subsequent_element: bool,
}

/// Matches the input/output signature arrays entry for entry.
#[derive(Clone, Debug, Default)]
pub struct PatchData {
    pub inputs: Vec<InterfaceAccess>,
    pub outputs: Vec<InterfaceAccess>,
}

/// A specialization override applied at pipeline-creation time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SpecConstant {
    pub spec_id: u32,
    /// Value bits; never wider than 64.
    pub value: u64,
    pub data_size: usize,
}

impl SpecConstant {
    pub fn new(spec_id: u32, value: u64, data_size: usize) -> Self {
        Self {
            spec_id,
            value,
            data_size,
        }
    }
}

/// Everything `make_reflection` produces for one entry point.
#[derive(Clone, Debug, Default)]
pub struct ReflectionArtifacts {
    pub reflection: ShaderReflection,
    pub bindpoints: BindpointMapping,
    pub patch_data: PatchData,
}
