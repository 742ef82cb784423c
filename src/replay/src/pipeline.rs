use std::ffi::{c_void, CString};
use std::ptr;

use ash::vk;
use derive_more::Display;
use log::trace;

use crate::capability::{DeviceCapabilities, DeviceExtensions};
use crate::record::{HandleResolver, PipelineRecord};
use crate::stage::ShaderStage;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum BuildError {
    /// The record carries no compute stage; the capture is malformed.
    #[display(fmt = "pipeline record has no compute stage")]
    MissingComputeStage,
}

impl std::error::Error for BuildError {}

fn bool32(val: bool) -> vk::Bool32 {
    if val {
        vk::TRUE
    } else {
        vk::FALSE
    }
}

/// One optional extension sub-structure, tagged with where it chains.
///
/// Blocks are assembled from the record unconditionally, then filtered by
/// their presence predicate before linearization; a dropped block is the
/// expected outcome on devices without the extension.
#[derive(Debug)]
enum ExtensionBlock {
    VertexDivisor(vk::PipelineVertexInputDivisorStateCreateInfoEXT<'static>),
    TessellationDomainOrigin(vk::PipelineTessellationDomainOriginStateCreateInfo<'static>),
    ConservativeRasterization(vk::PipelineRasterizationConservativeStateCreateInfoEXT<'static>),
    RasterizationStream(vk::PipelineRasterizationStateStreamCreateInfoEXT<'static>),
    DepthClip(vk::PipelineRasterizationDepthClipStateCreateInfoEXT<'static>),
    LineRasterization(vk::PipelineRasterizationLineStateCreateInfoEXT<'static>),
    SampleLocations(vk::PipelineSampleLocationsStateCreateInfoEXT<'static>),
    DiscardRectangles(vk::PipelineDiscardRectangleStateCreateInfoEXT<'static>),
}

impl ExtensionBlock {
    /// Presence predicate: which device extension this block requires.
    fn supported(&self, exts: &DeviceExtensions) -> bool {
        match self {
            Self::VertexDivisor(_) => exts.vertex_attribute_divisor,
            Self::TessellationDomainOrigin(_) => exts.maintenance2,
            Self::ConservativeRasterization(_) => exts.conservative_rasterization,
            Self::RasterizationStream(_) => exts.transform_feedback,
            Self::DepthClip(_) => exts.depth_clip_enable,
            Self::LineRasterization(_) => exts.line_rasterization,
            Self::SampleLocations(_) => exts.sample_locations,
            Self::DiscardRectangles(_) => exts.discard_rectangles,
        }
    }
}

/// Rebuilds native pipeline-creation descriptors from captured records.
///
/// The builder owns all the backing storage the returned descriptor points
/// into, so the descriptor borrows the builder: the borrow checker serializes
/// construction against use, and a second build simply reuses the storage.
#[derive(Debug, Default)]
pub struct PipelineDescriptorBuilder {
    entry_names: Vec<CString>,
    spec_entries: Vec<vk::SpecializationMapEntry>,
    // One u64 slot per specialization value, the widest representation.
    spec_data: Vec<u64>,
    spec_infos: Vec<vk::SpecializationInfo<'static>>,
    stages: Vec<vk::PipelineShaderStageCreateInfo<'static>>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attrs: Vec<vk::VertexInputAttributeDescription>,
    vertex_divisors: Vec<vk::VertexInputBindingDivisorDescriptionEXT>,
    viewports: Vec<vk::Viewport>,
    scissors: Vec<vk::Rect2D>,
    sample_mask: [u32; 1],
    sample_locations: Vec<vk::SampleLocationEXT>,
    attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    dynamic_states: Vec<vk::DynamicState>,
    discard_rects: Vec<vk::Rect2D>,
    vertex_input: vk::PipelineVertexInputStateCreateInfo<'static>,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    tessellation: vk::PipelineTessellationStateCreateInfo<'static>,
    viewport_state: vk::PipelineViewportStateCreateInfo<'static>,
    rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    color_blend: vk::PipelineColorBlendStateCreateInfo<'static>,
    dynamic: vk::PipelineDynamicStateCreateInfo<'static>,
    extensions: Vec<ExtensionBlock>,
}

impl PipelineDescriptorBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    fn clear(&mut self) {
        self.entry_names.clear();
        self.spec_entries.clear();
        self.spec_data.clear();
        self.spec_infos.clear();
        self.stages.clear();
        self.vertex_bindings.clear();
        self.vertex_attrs.clear();
        self.vertex_divisors.clear();
        self.viewports.clear();
        self.scissors.clear();
        self.sample_locations.clear();
        self.attachments.clear();
        self.dynamic_states.clear();
        self.discard_rects.clear();
        self.extensions.clear();
    }

    // Flattens every stage's specialization tuples into the shared u64-slot
    // buffer and builds per-stage infos pointing into it.
    fn build_specialization(&mut self, record: &PipelineRecord) {
        for (_, rec) in record.stages.iter().filter(|(_, rec)| rec.is_present()) {
            for sc in &rec.specialization {
                self.spec_entries.push(vk::SpecializationMapEntry {
                    constant_id: sc.spec_id,
                    offset: (self.spec_data.len() * std::mem::size_of::<u64>()) as u32,
                    size: sc.data_size,
                });
                self.spec_data.push(sc.value);
            }
        }

        let data_size = self.spec_data.len() * std::mem::size_of::<u64>();
        let mut cursor = 0;
        for (_, rec) in record.stages.iter().filter(|(_, rec)| rec.is_present()) {
            let count = rec.specialization.len();
            if count != 0 {
                self.spec_infos.push(vk::SpecializationInfo {
                    map_entry_count: count as u32,
                    p_map_entries: self.spec_entries[cursor..].as_ptr(),
                    data_size,
                    p_data: self.spec_data.as_ptr() as *const c_void,
                    ..Default::default()
                });
            }
            cursor += count;
        }
    }

    fn build_stages(&mut self, record: &PipelineRecord, resolver: &dyn HandleResolver) {
        let mut spec_index = 0;
        for (stage, rec) in record.stages.iter().filter(|(_, rec)| rec.is_present()) {
            self.entry_names
                .push(CString::new(rec.entry_point.as_str()).unwrap_or_default());
            let p_name = self
                .entry_names
                .last()
                .map(|name| name.as_ptr())
                .unwrap_or(ptr::null());

            let p_specialization_info = if rec.specialization.is_empty() {
                ptr::null()
            } else {
                let info = &self.spec_infos[spec_index] as *const vk::SpecializationInfo<'static>;
                spec_index += 1;
                info
            };

            self.stages.push(vk::PipelineShaderStageCreateInfo {
                stage: stage.into(),
                module: resolver.shader_module(rec.module),
                p_name,
                p_specialization_info,
                ..Default::default()
            });
        }
    }

    /// Reconstructs the full graphics creation descriptor for a captured
    /// record. Extension state the device cannot accept is dropped silently;
    /// the capture may well predate the replay device's limitations.
    pub fn build_graphics<'a>(
        &'a mut self,
        record: &PipelineRecord,
        caps: &DeviceCapabilities,
        resolver: &dyn HandleResolver,
    ) -> vk::GraphicsPipelineCreateInfo<'a> {
        self.clear();
        trace!("rebuilding graphics pipeline descriptor");

        self.build_specialization(record);
        self.build_stages(record, resolver);

        // All array storage is filled before anything takes pointers into it.
        self.vertex_attrs.extend(record.vertex_attrs.iter().map(|attr| {
            vk::VertexInputAttributeDescription {
                location: attr.location,
                binding: attr.binding,
                format: attr.format,
                offset: attr.byte_offset,
            }
        }));
        self.vertex_bindings.extend(record.vertex_bindings.iter().map(|bind| {
            vk::VertexInputBindingDescription {
                binding: bind.binding,
                stride: bind.byte_stride,
                input_rate: if bind.per_instance {
                    vk::VertexInputRate::INSTANCE
                } else {
                    vk::VertexInputRate::VERTEX
                },
            }
        }));
        self.vertex_divisors.extend(record.vertex_bindings.iter().map(|bind| {
            vk::VertexInputBindingDivisorDescriptionEXT {
                binding: bind.binding,
                divisor: bind.instance_divisor,
            }
        }));
        self.viewports.extend_from_slice(&record.viewports);
        self.scissors.extend_from_slice(&record.scissors);
        self.sample_mask = [record.sample_mask];
        self.sample_locations
            .extend_from_slice(&record.sample_locations.locations);
        self.attachments.extend(record.attachments.iter().map(|att| {
            vk::PipelineColorBlendAttachmentState {
                blend_enable: bool32(att.blend_enable),
                src_color_blend_factor: att.blend.source,
                dst_color_blend_factor: att.blend.destination,
                color_blend_op: att.blend.operation,
                src_alpha_blend_factor: att.alpha_blend.source,
                dst_alpha_blend_factor: att.alpha_blend.destination,
                alpha_blend_op: att.alpha_blend.operation,
                color_write_mask: att.channel_write_mask,
            }
        }));
        self.dynamic_states.extend(
            record
                .dynamic_states
                .iter()
                .filter(|(_, &enabled)| enabled)
                .map(|(index, _)| vk::DynamicState::from(index)),
        );
        self.discard_rects.extend_from_slice(&record.discard_rectangles);

        self.vertex_input = vk::PipelineVertexInputStateCreateInfo {
            vertex_binding_description_count: self.vertex_bindings.len() as u32,
            p_vertex_binding_descriptions: self.vertex_bindings.as_ptr(),
            vertex_attribute_description_count: self.vertex_attrs.len() as u32,
            p_vertex_attribute_descriptions: self.vertex_attrs.as_ptr(),
            ..Default::default()
        };

        self.input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            topology: record.topology,
            primitive_restart_enable: bool32(record.primitive_restart),
            ..Default::default()
        };

        self.tessellation = vk::PipelineTessellationStateCreateInfo {
            patch_control_points: record.patch_control_points,
            ..Default::default()
        };

        self.viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: self.viewports.len() as u32,
            p_viewports: self.viewports.as_ptr(),
            scissor_count: self.scissors.len() as u32,
            p_scissors: self.scissors.as_ptr(),
            ..Default::default()
        };

        self.rasterization = vk::PipelineRasterizationStateCreateInfo {
            depth_clamp_enable: bool32(record.depth_clamp_enable),
            rasterizer_discard_enable: bool32(record.rasterizer_discard_enable),
            polygon_mode: record.polygon_mode,
            cull_mode: record.cull_mode,
            front_face: record.front_face,
            depth_bias_enable: bool32(record.depth_bias_enable),
            depth_bias_constant_factor: record.depth_bias_constant_factor,
            depth_bias_clamp: record.depth_bias_clamp,
            depth_bias_slope_factor: record.depth_bias_slope_factor,
            line_width: record.line_width,
            ..Default::default()
        };

        self.multisample = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: record.rasterization_samples,
            sample_shading_enable: bool32(record.sample_shading_enable),
            min_sample_shading: record.min_sample_shading,
            p_sample_mask: self.sample_mask.as_ptr(),
            alpha_to_coverage_enable: bool32(record.alpha_to_coverage_enable),
            alpha_to_one_enable: bool32(record.alpha_to_one_enable),
            ..Default::default()
        };

        self.depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
            depth_test_enable: bool32(record.depth_test_enable),
            depth_write_enable: bool32(record.depth_write_enable),
            depth_compare_op: record.depth_compare_op,
            depth_bounds_test_enable: bool32(record.depth_bounds_enable),
            stencil_test_enable: bool32(record.stencil_test_enable),
            front: record.front,
            back: record.back,
            min_depth_bounds: record.min_depth_bounds,
            max_depth_bounds: record.max_depth_bounds,
            ..Default::default()
        };

        self.color_blend = vk::PipelineColorBlendStateCreateInfo {
            logic_op_enable: bool32(record.logic_op_enable),
            logic_op: record.logic_op,
            attachment_count: self.attachments.len() as u32,
            p_attachments: self.attachments.as_ptr(),
            blend_constants: record.blend_constants,
            ..Default::default()
        };

        self.dynamic = vk::PipelineDynamicStateCreateInfo {
            dynamic_state_count: self.dynamic_states.len() as u32,
            p_dynamic_states: self.dynamic_states.as_ptr(),
            ..Default::default()
        };

        self.assemble_extension_blocks(record);
        self.extensions.retain(|block| block.supported(&caps.extensions));

        let mut info = vk::GraphicsPipelineCreateInfo {
            // Never recreate as a derivative; the parent may not exist.
            flags: record.flags & !vk::PipelineCreateFlags::DERIVATIVE,
            stage_count: self.stages.len() as u32,
            p_stages: self.stages.as_ptr(),
            p_vertex_input_state: &self.vertex_input,
            p_input_assembly_state: &self.input_assembly,
            p_tessellation_state: &self.tessellation,
            p_viewport_state: &self.viewport_state,
            p_rasterization_state: &self.rasterization,
            p_multisample_state: &self.multisample,
            p_depth_stencil_state: &self.depth_stencil,
            p_color_blend_state: &self.color_blend,
            p_dynamic_state: &self.dynamic,
            layout: resolver.pipeline_layout(record.layout),
            render_pass: resolver.render_pass(record.render_pass),
            subpass: record.subpass,
            base_pipeline_handle: vk::Pipeline::null(),
            base_pipeline_index: 0,
            ..Default::default()
        };

        unsafe {
            link_extension_chain(
                &mut self.extensions,
                &mut self.vertex_input,
                &mut self.tessellation,
                &mut self.rasterization,
                &mut self.multisample,
                &mut info,
            );
        }

        info
    }

    /// Reconstructs the compute creation descriptor.
    pub fn build_compute<'a>(
        &'a mut self,
        record: &PipelineRecord,
        resolver: &dyn HandleResolver,
    ) -> Result<vk::ComputePipelineCreateInfo<'a>, BuildError> {
        self.clear();

        let rec = &record.stages[ShaderStage::Compute];
        if !rec.is_present() {
            return Err(BuildError::MissingComputeStage);
        }

        self.build_specialization(record);
        self.build_stages(record, resolver);

        // Records written by a graphics capture can carry other stages; only
        // the compute stage reaches the descriptor.
        let stage = self
            .stages
            .iter()
            .copied()
            .find(|stage| stage.stage == vk::ShaderStageFlags::COMPUTE)
            .unwrap_or_default();

        Ok(vk::ComputePipelineCreateInfo {
            flags: record.flags & !vk::PipelineCreateFlags::DERIVATIVE,
            stage,
            layout: resolver.pipeline_layout(record.layout),
            base_pipeline_handle: vk::Pipeline::null(),
            base_pipeline_index: 0,
            ..Default::default()
        })
    }

    // Builds every candidate block from the record; filtering against the
    // device's extension set happens afterwards.
    fn assemble_extension_blocks(&mut self, record: &PipelineRecord) {
        if !self.vertex_divisors.is_empty() {
            self.extensions.push(ExtensionBlock::VertexDivisor(
                vk::PipelineVertexInputDivisorStateCreateInfoEXT {
                    vertex_binding_divisor_count: self.vertex_divisors.len() as u32,
                    p_vertex_binding_divisors: self.vertex_divisors.as_ptr(),
                    ..Default::default()
                },
            ));
        }

        self.extensions.push(ExtensionBlock::TessellationDomainOrigin(
            vk::PipelineTessellationDomainOriginStateCreateInfo {
                domain_origin: record.domain_origin,
                ..Default::default()
            },
        ));

        self.extensions.push(ExtensionBlock::ConservativeRasterization(
            vk::PipelineRasterizationConservativeStateCreateInfoEXT {
                conservative_rasterization_mode: record.conservative_rasterization_mode,
                extra_primitive_overestimation_size: record.extra_primitive_overestimation_size,
                ..Default::default()
            },
        ));

        self.extensions.push(ExtensionBlock::RasterizationStream(
            vk::PipelineRasterizationStateStreamCreateInfoEXT {
                rasterization_stream: record.rasterization_stream,
                ..Default::default()
            },
        ));

        self.extensions.push(ExtensionBlock::DepthClip(
            vk::PipelineRasterizationDepthClipStateCreateInfoEXT {
                depth_clip_enable: bool32(record.depth_clip_enable),
                ..Default::default()
            },
        ));

        self.extensions.push(ExtensionBlock::LineRasterization(
            vk::PipelineRasterizationLineStateCreateInfoEXT {
                line_rasterization_mode: record.line_raster_mode,
                stippled_line_enable: bool32(record.stipple_enabled),
                line_stipple_factor: record.stipple_factor,
                line_stipple_pattern: record.stipple_pattern,
                ..Default::default()
            },
        ));

        self.extensions.push(ExtensionBlock::SampleLocations(
            vk::PipelineSampleLocationsStateCreateInfoEXT {
                sample_locations_enable: bool32(record.sample_locations.enabled),
                sample_locations_info: vk::SampleLocationsInfoEXT {
                    sample_locations_per_pixel: record.rasterization_samples,
                    sample_location_grid_size: record.sample_locations.grid_size,
                    sample_locations_count: self.sample_locations.len() as u32,
                    p_sample_locations: self.sample_locations.as_ptr(),
                    ..Default::default()
                },
                ..Default::default()
            },
        ));

        self.extensions.push(ExtensionBlock::DiscardRectangles(
            vk::PipelineDiscardRectangleStateCreateInfoEXT {
                discard_rectangle_mode: record.discard_rectangle_mode,
                discard_rectangle_count: self.discard_rects.len() as u32,
                p_discard_rectangles: self.discard_rects.as_ptr(),
                ..Default::default()
            },
        ));
    }
}

// The one place raw pointer-chain mechanics live: prepends each surviving
// block onto its parent structure's chain, in assembly order.
//
// Safety: every block and parent must stay in place until the device call
// that consumes the descriptor returns; the builder's borrow enforces this
// for everything reachable from the returned create info.
unsafe fn link_extension_chain(
    extensions: &mut [ExtensionBlock],
    vertex_input: &mut vk::PipelineVertexInputStateCreateInfo<'static>,
    tessellation: &mut vk::PipelineTessellationStateCreateInfo<'static>,
    rasterization: &mut vk::PipelineRasterizationStateCreateInfo<'static>,
    multisample: &mut vk::PipelineMultisampleStateCreateInfo<'static>,
    base: &mut vk::GraphicsPipelineCreateInfo<'_>,
) {
    macro_rules! chain {
        ($parent:expr, $block:expr) => {{
            $block.p_next = $parent.p_next;
            $parent.p_next = $block as *mut _ as *const c_void;
        }};
    }

    for block in extensions.iter_mut() {
        match block {
            ExtensionBlock::VertexDivisor(s) => chain!(vertex_input, s),
            ExtensionBlock::TessellationDomainOrigin(s) => chain!(tessellation, s),
            ExtensionBlock::ConservativeRasterization(s) => chain!(rasterization, s),
            ExtensionBlock::RasterizationStream(s) => chain!(rasterization, s),
            ExtensionBlock::DepthClip(s) => chain!(rasterization, s),
            ExtensionBlock::LineRasterization(s) => chain!(rasterization, s),
            ExtensionBlock::SampleLocations(s) => chain!(multisample, s),
            ExtensionBlock::DiscardRectangles(s) => chain!(base, s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{
        AttachmentBlend, DynamicStateIndex, ResourceId, ShaderStageRecord, VertexAttribute,
        VertexBinding,
    };
    use spv::SpecConstant;

    struct IdentityResolver;

    impl HandleResolver for IdentityResolver {
        fn shader_module(&self, id: ResourceId) -> vk::ShaderModule {
            vk::ShaderModule::from_raw(id.0)
        }
        fn pipeline_layout(&self, id: ResourceId) -> vk::PipelineLayout {
            vk::PipelineLayout::from_raw(id.0)
        }
        fn render_pass(&self, id: ResourceId) -> vk::RenderPass {
            vk::RenderPass::from_raw(id.0)
        }
    }

    unsafe fn chain_types(mut p_next: *const c_void) -> Vec<vk::StructureType> {
        let mut types = Vec::new();
        while !p_next.is_null() {
            let base = &*(p_next as *const vk::BaseInStructure);
            types.push(base.s_type);
            p_next = base.p_next as *const c_void;
        }
        types
    }

    fn graphics_record() -> PipelineRecord {
        let mut record = PipelineRecord::default();
        record.stages[ShaderStage::Vertex] = ShaderStageRecord {
            module: ResourceId(101),
            entry_point: "main".to_owned(),
            specialization: Vec::new(),
        };
        record.stages[ShaderStage::Fragment] = ShaderStageRecord {
            module: ResourceId(102),
            entry_point: "main".to_owned(),
            specialization: Vec::new(),
        };
        record.vertex_attrs.push(VertexAttribute {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            byte_offset: 0,
        });
        record.vertex_bindings.push(VertexBinding {
            binding: 0,
            byte_stride: 16,
            per_instance: true,
            instance_divisor: 4,
        });
        record.viewports.push(vk::Viewport {
            width: 1920.0,
            height: 1080.0,
            max_depth: 1.0,
            ..Default::default()
        });
        record.scissors.push(vk::Rect2D {
            extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        });
        record.attachments.push(AttachmentBlend {
            channel_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        });
        record.sample_locations.enabled = true;
        record.sample_locations.grid_size = vk::Extent2D { width: 1, height: 1 };
        record.sample_locations.locations.push(vk::SampleLocationEXT { x: 0.5, y: 0.5 });
        record.layout = ResourceId(201);
        record.render_pass = ResourceId(202);
        record
    }

    #[test]
    fn base_state_translated() {
        let mut builder = PipelineDescriptorBuilder::new();
        let record = graphics_record();
        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);

        assert_eq!(info.stage_count, 2);
        assert_eq!(info.layout, vk::PipelineLayout::from_raw(201));
        assert_eq!(info.render_pass, vk::RenderPass::from_raw(202));

        unsafe {
            let stages = std::slice::from_raw_parts(info.p_stages, info.stage_count as usize);
            assert_eq!(stages[0].stage, vk::ShaderStageFlags::VERTEX);
            assert_eq!(stages[0].module, vk::ShaderModule::from_raw(101));
            assert_eq!(std::ffi::CStr::from_ptr(stages[0].p_name).to_str(), Ok("main"));

            let vi = &*info.p_vertex_input_state;
            assert_eq!(vi.vertex_attribute_description_count, 1);
            assert_eq!(
                (*vi.p_vertex_binding_descriptions).input_rate,
                vk::VertexInputRate::INSTANCE,
            );

            let vp = &*info.p_viewport_state;
            assert_eq!(vp.viewport_count, 1);
            assert_eq!((*vp.p_viewports).width, 1920.0);

            let cb = &*info.p_color_blend_state;
            assert_eq!(cb.attachment_count, 1);
            assert_eq!((*cb.p_attachments).color_write_mask, vk::ColorComponentFlags::RGBA);
        }
    }

    #[test]
    fn derivative_flag_stripped() {
        let mut builder = PipelineDescriptorBuilder::new();
        let mut record = graphics_record();
        record.flags = vk::PipelineCreateFlags::DERIVATIVE | vk::PipelineCreateFlags::DISABLE_OPTIMIZATION;

        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);
        assert!(!info.flags.contains(vk::PipelineCreateFlags::DERIVATIVE));
        assert!(info.flags.contains(vk::PipelineCreateFlags::DISABLE_OPTIMIZATION));
    }

    #[test]
    fn unsupported_extension_blocks_dropped() {
        let mut builder = PipelineDescriptorBuilder::new();
        let record = graphics_record();

        let mut caps = DeviceCapabilities::all();
        caps.extensions.sample_locations = false;
        caps.extensions.vertex_attribute_divisor = false;

        let info = builder.build_graphics(&record, &caps, &IdentityResolver);

        unsafe {
            let msaa_chain = chain_types((*info.p_multisample_state).p_next);
            assert!(!msaa_chain
                .contains(&vk::StructureType::PIPELINE_SAMPLE_LOCATIONS_STATE_CREATE_INFO_EXT));

            let vi_chain = chain_types((*info.p_vertex_input_state).p_next);
            assert!(vi_chain.is_empty());
        }
    }

    #[test]
    fn supported_extension_blocks_chained() {
        let mut builder = PipelineDescriptorBuilder::new();
        let record = graphics_record();
        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);

        unsafe {
            let msaa_chain = chain_types((*info.p_multisample_state).p_next);
            assert!(msaa_chain
                .contains(&vk::StructureType::PIPELINE_SAMPLE_LOCATIONS_STATE_CREATE_INFO_EXT));

            let rs_chain = chain_types((*info.p_rasterization_state).p_next);
            assert_eq!(rs_chain.len(), 4);

            let tess_chain = chain_types((*info.p_tessellation_state).p_next);
            assert!(tess_chain.contains(
                &vk::StructureType::PIPELINE_TESSELLATION_DOMAIN_ORIGIN_STATE_CREATE_INFO,
            ));

            let base_chain = chain_types(info.p_next);
            assert!(base_chain
                .contains(&vk::StructureType::PIPELINE_DISCARD_RECTANGLE_STATE_CREATE_INFO_EXT));
        }
    }

    #[test]
    fn no_extensions_at_all_yields_bare_descriptor() {
        let mut builder = PipelineDescriptorBuilder::new();
        let record = graphics_record();
        let info =
            builder.build_graphics(&record, &DeviceCapabilities::default(), &IdentityResolver);

        unsafe {
            assert!(info.p_next.is_null());
            assert!((*info.p_multisample_state).p_next.is_null());
            assert!((*info.p_rasterization_state).p_next.is_null());
            assert!((*info.p_vertex_input_state).p_next.is_null());
        }
    }

    #[test]
    fn specialization_flattened_into_u64_slots() {
        let mut builder = PipelineDescriptorBuilder::new();
        let mut record = graphics_record();
        record.stages[ShaderStage::Vertex].specialization = vec![
            SpecConstant::new(0, 7, 4),
            SpecConstant::new(3, u64::MAX, 8),
        ];
        record.stages[ShaderStage::Fragment].specialization = vec![SpecConstant::new(1, 1, 1)];

        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);

        unsafe {
            let stages = std::slice::from_raw_parts(info.p_stages, info.stage_count as usize);
            let vert_spec = &*stages[0].p_specialization_info;
            assert_eq!(vert_spec.map_entry_count, 2);
            let entries = std::slice::from_raw_parts(vert_spec.p_map_entries, 2);
            assert_eq!(entries[0].constant_id, 0);
            assert_eq!(entries[0].offset, 0);
            assert_eq!(entries[0].size, 4);
            assert_eq!(entries[1].constant_id, 3);
            assert_eq!(entries[1].offset, 8);

            let frag_spec = &*stages[1].p_specialization_info;
            assert_eq!(frag_spec.map_entry_count, 1);
            let entries = std::slice::from_raw_parts(frag_spec.p_map_entries, 1);
            assert_eq!(entries[0].offset, 16);

            // One shared backing buffer, sized for the widest value.
            assert_eq!(vert_spec.data_size, 24);
            assert_eq!(vert_spec.p_data, frag_spec.p_data);
            let data = std::slice::from_raw_parts(vert_spec.p_data as *const u64, 3);
            assert_eq!(data, &[7, u64::MAX, 1]);
        }
    }

    #[test]
    fn stage_without_specialization_gets_null_info() {
        let mut builder = PipelineDescriptorBuilder::new();
        let mut record = graphics_record();
        record.stages[ShaderStage::Fragment].specialization = vec![SpecConstant::new(0, 1, 4)];

        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);
        unsafe {
            let stages = std::slice::from_raw_parts(info.p_stages, info.stage_count as usize);
            assert!(stages[0].p_specialization_info.is_null());
            assert!(!stages[1].p_specialization_info.is_null());
        }
    }

    #[test]
    fn dynamic_states_converted() {
        let mut builder = PipelineDescriptorBuilder::new();
        let mut record = graphics_record();
        record.dynamic_states[DynamicStateIndex::Viewport] = true;
        record.dynamic_states[DynamicStateIndex::Scissor] = true;
        record.dynamic_states[DynamicStateIndex::StencilReference] = true;

        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);
        unsafe {
            let dynamic = &*info.p_dynamic_state;
            let states = std::slice::from_raw_parts(
                dynamic.p_dynamic_states,
                dynamic.dynamic_state_count as usize,
            );
            assert_eq!(
                states,
                &[
                    vk::DynamicState::VIEWPORT,
                    vk::DynamicState::SCISSOR,
                    vk::DynamicState::STENCIL_REFERENCE,
                ],
            );
        }
    }

    #[test]
    fn compute_descriptor_built() {
        let mut builder = PipelineDescriptorBuilder::new();
        let mut record = PipelineRecord::default();
        record.stages[ShaderStage::Compute] = ShaderStageRecord {
            module: ResourceId(55),
            entry_point: "main".to_owned(),
            specialization: vec![SpecConstant::new(2, 9, 4)],
        };
        record.layout = ResourceId(77);

        let info = builder.build_compute(&record, &IdentityResolver).unwrap();
        assert_eq!(info.stage.stage, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(info.stage.module, vk::ShaderModule::from_raw(55));
        assert_eq!(info.layout, vk::PipelineLayout::from_raw(77));
        unsafe {
            let spec = &*info.stage.p_specialization_info;
            assert_eq!(spec.map_entry_count, 1);
            assert_eq!((*spec.p_map_entries).constant_id, 2);
        }
    }

    #[test]
    fn compute_without_stage_fails() {
        let mut builder = PipelineDescriptorBuilder::new();
        let record = PipelineRecord::default();
        assert_eq!(
            builder.build_compute(&record, &IdentityResolver).unwrap_err(),
            BuildError::MissingComputeStage,
        );
    }

    #[test]
    fn builder_reuse_resets_state() {
        let mut builder = PipelineDescriptorBuilder::new();
        let record = graphics_record();

        let info = builder.build_graphics(&record, &DeviceCapabilities::all(), &IdentityResolver);
        let first_stage_count = info.stage_count;

        let mut record2 = PipelineRecord::default();
        record2.stages[ShaderStage::Vertex] = ShaderStageRecord {
            module: ResourceId(1),
            entry_point: "main".to_owned(),
            specialization: Vec::new(),
        };
        let info2 =
            builder.build_graphics(&record2, &DeviceCapabilities::default(), &IdentityResolver);

        assert_eq!(first_stage_count, 2);
        assert_eq!(info2.stage_count, 1);
        unsafe {
            let vi = &*info2.p_vertex_input_state;
            assert_eq!(vi.vertex_binding_description_count, 0);
        }
    }
}
