use ash::vk;
use enum_map::Enum;

use spv::ExecutionModel;

/// Pipeline-bindable shader stage. Declaration order matches the native
/// stage-bit numbering, so `1 << index` is the stage's flag bit.
#[derive(Clone, Copy, Debug, Enum, Eq, Hash, PartialEq)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as usize
    }
}

impl From<ShaderStage> for vk::ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        use ShaderStage as Stage;
        match stage {
            Stage::Vertex => Self::VERTEX,
            Stage::TessControl => Self::TESSELLATION_CONTROL,
            Stage::TessEval => Self::TESSELLATION_EVALUATION,
            Stage::Geometry => Self::GEOMETRY,
            Stage::Fragment => Self::FRAGMENT,
            Stage::Compute => Self::COMPUTE,
        }
    }
}

impl TryFrom<ExecutionModel> for ShaderStage {
    type Error = ();
    fn try_from(val: ExecutionModel) -> Result<Self, Self::Error> {
        Ok(match val {
            ExecutionModel::Vertex => Self::Vertex,
            ExecutionModel::TessellationControl => Self::TessControl,
            ExecutionModel::TessellationEvaluation => Self::TessEval,
            ExecutionModel::Geometry => Self::Geometry,
            ExecutionModel::Fragment => Self::Fragment,
            ExecutionModel::GLCompute => Self::Compute,
            _ => return Err(()),
        })
    }
}

/// Source language a compile request is written in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InputLanguage {
    VulkanGlsl,
    Hlsl,
}

/// What to hand the external compiler, and half of the cache key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CompileSettings {
    pub stage: ShaderStage,
    pub lang: InputLanguage,
}

impl CompileSettings {
    pub fn new(stage: ShaderStage, lang: InputLanguage) -> Self {
        Self { stage, lang }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_bits_match_declaration_order() {
        assert_eq!(
            vk::ShaderStageFlags::from(ShaderStage::Vertex),
            vk::ShaderStageFlags::from_raw(1 << ShaderStage::Vertex.index()),
        );
        assert_eq!(
            vk::ShaderStageFlags::from_raw(1 << ShaderStage::Compute.index()),
            vk::ShaderStageFlags::COMPUTE,
        );
    }
}
