use ash::vk;
use enum_map::{Enum, EnumMap};
use log::error;

use crate::cache::{ShaderCache, ShaderCompiler, SpirvBlob};
use crate::capability::DeviceCapabilities;
use crate::stage::{CompileSettings, InputLanguage, ShaderStage};

/// The fixed catalog of internal utility shaders, provisioned once at
/// device initialization.
#[derive(Clone, Copy, Debug, Enum, Eq, Hash, PartialEq)]
pub enum BuiltinShader {
    BlitVs,
    CheckerboardFs,
    TexDisplayFs,
    FixedColFs,
    TextVs,
    TextFs,
    MeshVs,
    MeshGs,
    MeshFs,
    MeshCs,
    QuadResolveFs,
    QuadWriteFs,
    Ms2ArrayCs,
    Array2MsCs,
    DepthMs2ArrayFs,
    DepthArray2MsFs,
    TexRemapFloatFs,
    TexRemapUintFs,
    TexRemapSintFs,
}

/// A named capability requirement, checked by a pure predicate against the
/// live device's flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeatureCheck {
    ShaderMsaaStorage,
    FragmentStores,
    NonMetalBackend,
    FormatlessWrite,
}

impl FeatureCheck {
    pub fn satisfied(self, caps: &DeviceCapabilities) -> bool {
        let features = &caps.features;
        let workarounds = &caps.workarounds;
        match self {
            Self::ShaderMsaaStorage => {
                features.shader_storage_image_multisample
                    && !workarounds.texel_fetch_broken
                    && !workarounds.amd_storage_msaa_broken
            }
            Self::FragmentStores => features.fragment_stores_and_atomics,
            Self::NonMetalBackend => !workarounds.metal_backend,
            Self::FormatlessWrite => features.shader_storage_image_write_without_format,
        }
    }
}

#[derive(Debug)]
pub struct BuiltinShaderConfig {
    pub builtin: BuiltinShader,
    pub source: &'static str,
    pub stage: ShaderStage,
    pub checks: &'static [FeatureCheck],
    /// Whether the shader binds uniform storage; drives descriptor layout
    /// selection for internal pipelines.
    pub uniforms: bool,
}

mod sources {
    macro_rules! include_shaders {
        ($($ident:ident = $name:expr;)*) => {
            $(pub(super) const $ident: &str =
                include_str!(concat!("shaders/", $name));)*
        }
    }

    include_shaders! {
        BLIT_VERT = "blit.vert";
        CHECKERBOARD_FRAG = "checkerboard.frag";
        TEXDISPLAY_FRAG = "texdisplay.frag";
        FIXEDCOL_FRAG = "fixedcol.frag";
        TEXT_VERT = "text.vert";
        TEXT_FRAG = "text.frag";
        MESH_VERT = "mesh.vert";
        MESH_GEOM = "mesh.geom";
        MESH_FRAG = "mesh.frag";
        MESH_COMP = "mesh.comp";
        QUADRESOLVE_FRAG = "quadresolve.frag";
        QUADWRITE_FRAG = "quadwrite.frag";
        MS2ARRAY_COMP = "ms2array.comp";
        ARRAY2MS_COMP = "array2ms.comp";
        DEPTHMS2ARRAY_FRAG = "depthms2array.frag";
        DEPTHARRAY2MS_FRAG = "deptharray2ms.frag";
        TEXREMAP_FRAG = "texremap.frag";
    }
}

use FeatureCheck::*;

static BUILTIN_SHADERS: [BuiltinShaderConfig; 19] = [
    BuiltinShaderConfig {
        builtin: BuiltinShader::BlitVs,
        source: sources::BLIT_VERT,
        stage: ShaderStage::Vertex,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::CheckerboardFs,
        source: sources::CHECKERBOARD_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::TexDisplayFs,
        source: sources::TEXDISPLAY_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::FixedColFs,
        source: sources::FIXEDCOL_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: false,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::TextVs,
        source: sources::TEXT_VERT,
        stage: ShaderStage::Vertex,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::TextFs,
        source: sources::TEXT_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::MeshVs,
        source: sources::MESH_VERT,
        stage: ShaderStage::Vertex,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::MeshGs,
        source: sources::MESH_GEOM,
        stage: ShaderStage::Geometry,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::MeshFs,
        source: sources::MESH_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::MeshCs,
        source: sources::MESH_COMP,
        stage: ShaderStage::Compute,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::QuadResolveFs,
        source: sources::QUADRESOLVE_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[FragmentStores],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::QuadWriteFs,
        source: sources::QUADWRITE_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[FragmentStores, NonMetalBackend],
        uniforms: false,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::Ms2ArrayCs,
        source: sources::MS2ARRAY_COMP,
        stage: ShaderStage::Compute,
        checks: &[FormatlessWrite, NonMetalBackend],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::Array2MsCs,
        source: sources::ARRAY2MS_COMP,
        stage: ShaderStage::Compute,
        checks: &[ShaderMsaaStorage, FormatlessWrite, NonMetalBackend],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::DepthMs2ArrayFs,
        source: sources::DEPTHMS2ARRAY_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[NonMetalBackend],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::DepthArray2MsFs,
        source: sources::DEPTHARRAY2MS_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[NonMetalBackend],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::TexRemapFloatFs,
        source: sources::TEXREMAP_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::TexRemapUintFs,
        source: sources::TEXREMAP_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
    BuiltinShaderConfig {
        builtin: BuiltinShader::TexRemapSintFs,
        source: sources::TEXREMAP_FRAG,
        stage: ShaderStage::Fragment,
        checks: &[],
        uniforms: true,
    },
];

/// The driver seam that turns compiled words into a live module object and
/// registers it as internal, non-user-visible state.
pub trait ShaderModuleFactory {
    fn create_internal_module(&self, code: &[u32]) -> Option<vk::ShaderModule>;
}

/// Capability-gated slot table of provisioned builtin shaders.
///
/// An empty slot is a normal outcome: the requirement was unmet on this
/// device, or the compile failed and was logged. Lookups never fail.
#[derive(Debug, Default)]
pub struct BuiltinShaderRegistry {
    blobs: EnumMap<BuiltinShader, Option<SpirvBlob>>,
    modules: EnumMap<BuiltinShader, Option<vk::ShaderModule>>,
}

impl BuiltinShaderRegistry {
    pub fn provision(
        cache: &mut ShaderCache,
        compiler: &dyn ShaderCompiler,
        factory: &dyn ShaderModuleFactory,
        caps: &DeviceCapabilities,
    ) -> Self {
        let mut registry = Self::default();
        let global_defines = global_defines(caps);

        cache.set_caching(true);

        for (i, config) in BUILTIN_SHADERS.iter().enumerate() {
            debug_assert_eq!(config.builtin, BuiltinShader::from_usize(i));

            if !config.checks.iter().all(|check| check.satisfied(caps)) {
                continue;
            }
            if config.stage == ShaderStage::Geometry && !caps.features.geometry_shader {
                continue;
            }

            let mut defines = global_defines.clone();
            match config.builtin {
                BuiltinShader::TexRemapFloatFs => {
                    defines += "#define UINT_TEX 0\n#define SINT_TEX 0\n";
                }
                BuiltinShader::TexRemapUintFs => {
                    defines += "#define UINT_TEX 1\n#define SINT_TEX 0\n";
                }
                BuiltinShader::TexRemapSintFs => {
                    defines += "#define UINT_TEX 0\n#define SINT_TEX 1\n";
                }
                _ => {}
            }

            let source = assemble_glsl(&defines, config.source);
            let settings = CompileSettings::new(config.stage, InputLanguage::VulkanGlsl);

            match cache.get_or_compile(compiler, settings, &source) {
                Ok(blob) => {
                    registry.modules[config.builtin] = factory.create_internal_module(&blob);
                    registry.blobs[config.builtin] = Some(blob);
                }
                Err(err) => {
                    error!("error compiling builtin {:?}: {}", config.builtin, err);
                }
            }
        }

        cache.set_caching(false);
        registry
    }

    pub fn blob(&self, which: BuiltinShader) -> Option<&SpirvBlob> {
        self.blobs[which].as_ref()
    }

    pub fn module(&self, which: BuiltinShader) -> Option<vk::ShaderModule> {
        self.modules[which]
    }

    pub fn configs() -> &'static [BuiltinShaderConfig] {
        &BUILTIN_SHADERS
    }
}

// Workaround defines derived from driver identity apply to every builtin.
fn global_defines(caps: &DeviceCapabilities) -> String {
    let mut defines = String::from("#define HAS_BIT_CONVERSION 1\n");
    if caps.workarounds.texel_fetch_broken {
        defines += "#define NO_TEXEL_FETCH 1\n";
    }
    if caps.workarounds.metal_backend {
        defines += "#define METAL_BACKEND 1\n";
    }
    defines
}

fn assemble_glsl(defines: &str, body: &str) -> String {
    format!("#version 430 core\n{}{}", defines, body)
}
