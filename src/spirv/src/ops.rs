//! Enum layer for the subset of the instruction set that reflection cares
//! about. Discriminants match the published binary encoding; anything not
//! listed here decodes to `None` and takes the skip path in the parser.

use std::convert::TryFrom;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InvalidEnumValue(pub u32);

impl std::fmt::Display for InvalidEnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid enum value: {}", self.0)
    }
}

impl std::error::Error for InvalidEnumValue {}

macro_rules! impl_enum {
    (
        $name:ident {
            $($member:ident = $value:expr,)*
        }
    ) => {
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $($member = $value,)*
        }

        impl From<$name> for u32 {
            fn from(val: $name) -> Self {
                val as _
            }
        }

        impl TryFrom<u32> for $name {
            type Error = InvalidEnumValue;
            fn try_from(val: u32) -> Result<Self, Self::Error> {
                match val {
                    $($value => Ok(Self::$member),)*
                    _ => Err(InvalidEnumValue(val)),
                }
            }
        }
    };
}

macro_rules! impl_enums {
    ($($name:ident $body:tt)*) => {
        $(impl_enum! { $name $body })*
    }
}

impl_enums! {
    Op {
        Source = 3,
        Name = 5,
        MemberName = 6,
        EntryPoint = 15,
        ExecutionMode = 16,
        Capability = 17,
        TypeVoid = 19,
        TypeBool = 20,
        TypeInt = 21,
        TypeFloat = 22,
        TypeVector = 23,
        TypeMatrix = 24,
        TypeImage = 25,
        TypeSampler = 26,
        TypeSampledImage = 27,
        TypeArray = 28,
        TypeRuntimeArray = 29,
        TypeStruct = 30,
        TypeOpaque = 31,
        TypePointer = 32,
        TypeFunction = 33,
        ConstantTrue = 41,
        ConstantFalse = 42,
        Constant = 43,
        ConstantComposite = 44,
        SpecConstantTrue = 48,
        SpecConstantFalse = 49,
        SpecConstant = 50,
        SpecConstantComposite = 51,
        Function = 54,
        FunctionEnd = 56,
        Variable = 59,
        Decorate = 71,
        MemberDecorate = 72,
    }
    StorageClass {
        UniformConstant = 0,
        Input = 1,
        Uniform = 2,
        Output = 3,
        Workgroup = 4,
        CrossWorkgroup = 5,
        Private = 6,
        Function = 7,
        Generic = 8,
        PushConstant = 9,
        AtomicCounter = 10,
        Image = 11,
        StorageBuffer = 12,
    }
    ExecutionModel {
        Vertex = 0,
        TessellationControl = 1,
        TessellationEvaluation = 2,
        Geometry = 3,
        Fragment = 4,
        GLCompute = 5,
        Kernel = 6,
    }
    ExecutionMode {
        Invocations = 0,
        LocalSize = 17,
        LocalSizeHint = 18,
        OutputVertices = 26,
    }
    Decoration {
        SpecId = 1,
        Block = 2,
        BufferBlock = 3,
        RowMajor = 4,
        ColMajor = 5,
        ArrayStride = 6,
        MatrixStride = 7,
        BuiltIn = 11,
        NoPerspective = 13,
        Flat = 14,
        Patch = 19,
        NonWritable = 24,
        NonReadable = 25,
        Location = 30,
        Component = 31,
        Binding = 33,
        DescriptorSet = 34,
        Offset = 35,
        InputAttachmentIndex = 43,
    }
    BuiltIn {
        Position = 0,
        PointSize = 1,
        ClipDistance = 3,
        CullDistance = 4,
        VertexId = 5,
        InstanceId = 6,
        PrimitiveId = 7,
        InvocationId = 8,
        Layer = 9,
        ViewportIndex = 10,
        TessLevelOuter = 11,
        TessLevelInner = 12,
        TessCoord = 13,
        PatchVertices = 14,
        FragCoord = 15,
        PointCoord = 16,
        FrontFacing = 17,
        SampleId = 18,
        SamplePosition = 19,
        SampleMask = 20,
        FragDepth = 22,
        HelperInvocation = 23,
        NumWorkgroups = 24,
        WorkgroupSize = 25,
        WorkgroupId = 26,
        LocalInvocationId = 27,
        GlobalInvocationId = 28,
        LocalInvocationIndex = 29,
        VertexIndex = 42,
        InstanceIndex = 43,
    }
    Dim {
        Tex1D = 0,
        Tex2D = 1,
        Tex3D = 2,
        Cube = 3,
        Rect = 4,
        Buffer = 5,
        SubpassData = 6,
    }
    SourceLanguage {
        Unknown = 0,
        Essl = 1,
        Glsl = 2,
        OpenClC = 3,
        OpenClCpp = 4,
        Hlsl = 5,
    }
}
