//! Capability flags reported by the device layer. Consumed, never mutated:
//! the builtin registry gates its catalog on them and the descriptor builder
//! drops extension blocks the device cannot accept.

/// Feature bits relevant to internal shader provisioning.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceFeatures {
    pub fragment_stores_and_atomics: bool,
    pub shader_storage_image_multisample: bool,
    pub shader_storage_image_write_without_format: bool,
    pub geometry_shader: bool,
}

/// Known-driver workaround flags, derived from driver identity at device
/// init by the capture layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DriverWorkarounds {
    /// texelFetch miscompiles on this driver; shaders take the sampling path.
    pub texel_fetch_broken: bool,
    /// MSAA storage-image writes are broken on this driver.
    pub amd_storage_msaa_broken: bool,
    /// Running through a Metal translation layer.
    pub metal_backend: bool,
}

/// The device extension set the replay device was created with.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceExtensions {
    pub vertex_attribute_divisor: bool,
    /// Gates the tessellation-domain-origin sub-structure.
    pub maintenance2: bool,
    pub conservative_rasterization: bool,
    pub transform_feedback: bool,
    pub depth_clip_enable: bool,
    pub line_rasterization: bool,
    pub sample_locations: bool,
    pub discard_rectangles: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceCapabilities {
    pub features: DeviceFeatures,
    pub workarounds: DriverWorkarounds,
    pub extensions: DeviceExtensions,
}

impl DeviceCapabilities {
    /// Everything on, nothing broken. Useful as a test baseline.
    pub fn all() -> Self {
        Self {
            features: DeviceFeatures {
                fragment_stores_and_atomics: true,
                shader_storage_image_multisample: true,
                shader_storage_image_write_without_format: true,
                geometry_shader: true,
            },
            workarounds: Default::default(),
            extensions: DeviceExtensions {
                vertex_attribute_divisor: true,
                maintenance2: true,
                conservative_rasterization: true,
                transform_feedback: true,
                depth_clip_enable: true,
                line_rasterization: true,
                sample_locations: true,
                discard_rectangles: true,
            },
        }
    }
}
