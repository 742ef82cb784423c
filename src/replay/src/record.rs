//! The abstracted, API-version-independent description of a captured
//! pipeline, written once by the capture layer and read during replay to
//! reconstruct the native creation descriptor.

use ash::vk;
use enum_map::{Enum, EnumMap};

pub use spv::SpecConstant;

use crate::stage::ShaderStage;

/// Opaque identifier for a captured resource; resolved to a live native
/// handle through [`HandleResolver`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Resource-handle virtualization seam: maps captured identifiers to the
/// live objects created earlier in the replay.
pub trait HandleResolver {
    fn shader_module(&self, id: ResourceId) -> vk::ShaderModule;
    fn pipeline_layout(&self, id: ResourceId) -> vk::PipelineLayout;
    fn render_pass(&self, id: ResourceId) -> vk::RenderPass;
}

#[derive(Clone, Debug, Default)]
pub struct ShaderStageRecord {
    /// Null when the stage is absent from the pipeline.
    pub module: ResourceId,
    pub entry_point: String,
    pub specialization: Vec<SpecConstant>,
}

impl ShaderStageRecord {
    pub fn is_present(&self) -> bool {
        !self.module.is_null()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub byte_offset: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct VertexBinding {
    pub binding: u32,
    pub byte_stride: u32,
    pub per_instance: bool,
    /// Advance rate divisor when the divisor extension is in use.
    pub instance_divisor: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SampleLocationsState {
    pub enabled: bool,
    pub grid_size: vk::Extent2D,
    pub locations: Vec<vk::SampleLocationEXT>,
}

/// Indices into the record's dynamic-state enable table.
#[derive(Clone, Copy, Debug, Enum, Eq, Hash, PartialEq)]
pub enum DynamicStateIndex {
    Viewport,
    Scissor,
    LineWidth,
    DepthBias,
    BlendConstants,
    DepthBounds,
    StencilCompareMask,
    StencilWriteMask,
    StencilReference,
    SampleLocations,
    DiscardRectangle,
    LineStipple,
}

impl From<DynamicStateIndex> for vk::DynamicState {
    fn from(index: DynamicStateIndex) -> Self {
        use DynamicStateIndex as Dyn;
        match index {
            Dyn::Viewport => Self::VIEWPORT,
            Dyn::Scissor => Self::SCISSOR,
            Dyn::LineWidth => Self::LINE_WIDTH,
            Dyn::DepthBias => Self::DEPTH_BIAS,
            Dyn::BlendConstants => Self::BLEND_CONSTANTS,
            Dyn::DepthBounds => Self::DEPTH_BOUNDS,
            Dyn::StencilCompareMask => Self::STENCIL_COMPARE_MASK,
            Dyn::StencilWriteMask => Self::STENCIL_WRITE_MASK,
            Dyn::StencilReference => Self::STENCIL_REFERENCE,
            Dyn::SampleLocations => Self::SAMPLE_LOCATIONS_EXT,
            Dyn::DiscardRectangle => Self::DISCARD_RECTANGLE_EXT,
            Dyn::LineStipple => Self::LINE_STIPPLE_EXT,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BlendEquation {
    pub source: vk::BlendFactor,
    pub destination: vk::BlendFactor,
    pub operation: vk::BlendOp,
}

impl Default for BlendEquation {
    fn default() -> Self {
        Self {
            source: vk::BlendFactor::ONE,
            destination: vk::BlendFactor::ZERO,
            operation: vk::BlendOp::ADD,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AttachmentBlend {
    pub blend_enable: bool,
    pub blend: BlendEquation,
    pub alpha_blend: BlendEquation,
    pub channel_write_mask: vk::ColorComponentFlags,
}

/// Everything captured about one pipeline, graphics or compute.
#[derive(Clone, Debug)]
pub struct PipelineRecord {
    pub flags: vk::PipelineCreateFlags,
    pub stages: EnumMap<ShaderStage, ShaderStageRecord>,

    // Vertex input
    pub vertex_attrs: Vec<VertexAttribute>,
    pub vertex_bindings: Vec<VertexBinding>,

    // Input assembly
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,

    // Tessellation
    pub patch_control_points: u32,
    pub domain_origin: vk::TessellationDomainOrigin,

    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,

    // Rasterization
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
    pub conservative_rasterization_mode: vk::ConservativeRasterizationModeEXT,
    pub extra_primitive_overestimation_size: f32,
    pub rasterization_stream: u32,
    pub depth_clip_enable: bool,
    pub line_raster_mode: vk::LineRasterizationModeEXT,
    pub stipple_enabled: bool,
    pub stipple_factor: u32,
    pub stipple_pattern: u16,

    // Multisampling
    pub rasterization_samples: vk::SampleCountFlags,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub sample_mask: u32,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
    pub sample_locations: SampleLocationsState,

    // Depth/stencil
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub depth_bounds_enable: bool,
    pub stencil_test_enable: bool,
    pub front: vk::StencilOpState,
    pub back: vk::StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,

    // Color blend
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub blend_constants: [f32; 4],
    pub attachments: Vec<AttachmentBlend>,

    pub dynamic_states: EnumMap<DynamicStateIndex, bool>,

    pub discard_rectangle_mode: vk::DiscardRectangleModeEXT,
    pub discard_rectangles: Vec<vk::Rect2D>,

    pub layout: ResourceId,
    pub render_pass: ResourceId,
    pub subpass: u32,
}

impl Default for PipelineRecord {
    fn default() -> Self {
        Self {
            flags: Default::default(),
            stages: Default::default(),
            vertex_attrs: Default::default(),
            vertex_bindings: Default::default(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: 0,
            domain_origin: vk::TessellationDomainOrigin::UPPER_LEFT,
            viewports: Default::default(),
            scissors: Default::default(),
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
            conservative_rasterization_mode: vk::ConservativeRasterizationModeEXT::DISABLED,
            extra_primitive_overestimation_size: 0.0,
            rasterization_stream: 0,
            depth_clip_enable: true,
            line_raster_mode: vk::LineRasterizationModeEXT::DEFAULT,
            stipple_enabled: false,
            stipple_factor: 1,
            stipple_pattern: !0,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: false,
            min_sample_shading: 0.0,
            sample_mask: !0,
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
            sample_locations: Default::default(),
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::ALWAYS,
            depth_bounds_enable: false,
            stencil_test_enable: false,
            front: Default::default(),
            back: Default::default(),
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
            logic_op_enable: false,
            logic_op: vk::LogicOp::CLEAR,
            blend_constants: [0.0; 4],
            attachments: Default::default(),
            dynamic_states: Default::default(),
            discard_rectangle_mode: vk::DiscardRectangleModeEXT::INCLUSIVE,
            discard_rectangles: Default::default(),
            layout: Default::default(),
            render_pass: Default::default(),
            subpass: 0,
        }
    }
}
