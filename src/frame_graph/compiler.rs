use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::vk;

use super::physical::{PhysicalResource, PhysicalStage};
use super::resource::{RenderResource, TextureUsage};
use super::stage::{GraphicsStage, RenderStage, StageContext};
use super::{FrameGraphError, FrameGraphOptions, ResourceId, Result, StageId};
use crate::device::{CommandBuffer, GpuDevice, SwapchainInfo};

enum Visit {
    Enter(StageId),
    Exit(StageId),
}

/// Maps every written resource to the stages that write it, in declaration order.
pub(crate) fn writer_index(stages: &[RenderStage]) -> HashMap<ResourceId, Vec<StageId>> {
    let mut writers: HashMap<ResourceId, Vec<StageId>> = HashMap::new();
    for (index, stage) in stages.iter().enumerate() {
        for &resource in stage.writes() {
            writers.entry(resource).or_default().push(StageId::new(index));
        }
    }
    writers
}

/// Post-order traversal from the single writer of `target`: every stage lands after all
/// stages writing the resources it reads. Stages the target does not depend on are left
/// out.
pub(crate) fn order_stages(
    stages: &[RenderStage],
    resources: &[RenderResource],
    target: ResourceId,
) -> Result<Vec<StageId>> {
    let target_resource = resources
        .get(target.index())
        .ok_or(FrameGraphError::InvalidResourceId(target))?;
    let writers = writer_index(stages);

    let root = match writers.get(&target).map(Vec::as_slice) {
        None | Some([]) => {
            return Err(FrameGraphError::MissingWriter {
                name: target_resource.name().to_string(),
            });
        }
        Some([root]) => *root,
        Some(all) => {
            return Err(FrameGraphError::AmbiguousTarget {
                name: target_resource.name().to_string(),
                count: all.len(),
            });
        }
    };

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();
    let mut path = Vec::new();
    let mut stack = vec![Visit::Enter(root)];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(id) => {
                if visiting.contains(&id) {
                    return Err(cycle_error(stages, &path, id));
                }
                if !visited.insert(id) {
                    continue;
                }
                visiting.insert(id);
                path.push(id);
                stack.push(Visit::Exit(id));

                let producers: Vec<StageId> = stages[id.index()]
                    .reads()
                    .iter()
                    .filter_map(|resource| writers.get(resource))
                    .flatten()
                    .copied()
                    .collect();
                // Reversed so producers are entered in read order.
                stack.extend(producers.into_iter().rev().map(Visit::Enter));
            }
            Visit::Exit(id) => {
                visiting.remove(&id);
                path.pop();
                order.push(id);
            }
        }
    }

    Ok(order)
}

fn cycle_error(stages: &[RenderStage], path: &[StageId], repeated: StageId) -> FrameGraphError {
    let start = path.iter().position(|&id| id == repeated).unwrap_or(0);
    let cycle = path[start..].to_vec();

    let mut names: Vec<String> = cycle
        .iter()
        .map(|id| format!("'{}'", stages[id.index()].name()))
        .collect();
    names.push(format!("'{}'", stages[repeated.index()].name()));

    FrameGraphError::DependencyCycle {
        stages: cycle,
        message: format!("Cycle detected in stages: {}", names.join(" → ")),
    }
}

/// Render pass attachments of one stage. Buffer writes are skipped and the remaining
/// texture writes are numbered densely in write order.
#[derive(Debug, Default)]
pub(crate) struct AttachmentLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_refs: Vec<vk::AttachmentReference>,
    pub depth_ref: Option<vk::AttachmentReference>,
    pub resources: Vec<ResourceId>,
}

pub(crate) fn attachment_layout(
    stage_name: &str,
    writes: &[ResourceId],
    resources: &[RenderResource],
) -> Result<AttachmentLayout> {
    let mut layout = AttachmentLayout::default();

    for &id in writes {
        let Some(texture) = resources[id.index()].as_texture() else {
            continue;
        };

        let index = layout.attachments.len() as u32;
        let (final_layout, reference_layout) = match texture.usage() {
            TextureUsage::BackBuffer => (
                vk::ImageLayout::PRESENT_SRC_KHR,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
            TextureUsage::DepthStencilBuffer => (
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            TextureUsage::ColorAttachment | TextureUsage::Invalid => (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
        };

        let reference = vk::AttachmentReference {
            attachment: index,
            layout: reference_layout,
        };
        if texture.usage() == TextureUsage::DepthStencilBuffer {
            if layout.depth_ref.is_some() {
                return Err(FrameGraphError::MultipleDepthAttachments {
                    stage: stage_name.to_string(),
                });
            }
            layout.depth_ref = Some(reference);
        } else {
            layout.color_refs.push(reference);
        }

        layout.attachments.push(
            vk::AttachmentDescription::default()
                .format(texture.format())
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(final_layout),
        );
        layout.resources.push(id);
    }

    Ok(layout)
}

/// One clear value per attachment, colour or depth stencil depending on its reference.
pub(crate) fn clear_values(
    layout: &AttachmentLayout,
    options: &FrameGraphOptions,
) -> Vec<vk::ClearValue> {
    let depth_index = layout.depth_ref.map(|reference| reference.attachment);
    (0..layout.attachments.len() as u32)
        .map(|index| {
            if Some(index) == depth_index {
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: options.clear_depth,
                        stencil: options.clear_stencil,
                    },
                }
            } else {
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: options.clear_color,
                    },
                }
            }
        })
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct VertexInputLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub buffers: Vec<(u32, ResourceId)>,
}

/// Vertex input state from the stage's read buffers that have a binding slot.
/// Every bound buffer must be one the stage reads, and each slot takes one buffer.
pub(crate) fn validate_buffer_bindings(
    stage: &GraphicsStage,
    resources: &[RenderResource],
) -> Result<()> {
    let mut slots: HashMap<u32, ResourceId> = HashMap::new();
    for (buffer, binding) in stage.buffer_bindings() {
        if !stage.reads().contains(&buffer) {
            let resource = resources
                .get(buffer.index())
                .ok_or(FrameGraphError::InvalidResourceId(buffer))?;
            return Err(FrameGraphError::UnreadBufferBinding {
                stage: stage.name().to_string(),
                name: resource.name().to_string(),
            });
        }
        if slots.insert(binding, buffer).is_some() {
            return Err(FrameGraphError::DuplicateBindingSlot {
                stage: stage.name().to_string(),
                slot: binding,
            });
        }
    }
    Ok(())
}

pub(crate) fn vertex_input_layout(
    stage: &GraphicsStage,
    resources: &[RenderResource],
) -> Result<VertexInputLayout> {
    let mut layout = VertexInputLayout::default();

    for &id in stage.reads() {
        let Some(binding) = stage.buffer_binding(id) else {
            continue;
        };
        let resource = &resources[id.index()];
        let buffer = resource
            .as_buffer()
            .ok_or_else(|| FrameGraphError::NotABuffer {
                name: resource.name().to_string(),
            })?;

        layout.attributes.extend(
            buffer
                .vertex_attributes()
                .iter()
                .copied()
                .map(|attribute| attribute.binding(binding)),
        );
        layout.bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride: buffer.element_size(),
            input_rate: vk::VertexInputRate::VERTEX,
        });
        layout.buffers.push((binding, id));
    }

    Ok(layout)
}

fn build_render_pass<D: GpuDevice>(device: &D, layout: &AttachmentLayout) -> Result<vk::RenderPass> {
    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&layout.color_refs);
    if let Some(depth_ref) = layout.depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }

    let (stage_mask, access_mask) = if layout.depth_ref.is_some() {
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
    } else {
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
    };
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stage_mask)
        .dst_stage_mask(stage_mask)
        .dst_access_mask(access_mask);

    let subpasses = [subpass];
    let dependencies = [dependency];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&layout.attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device.create_render_pass(&render_pass_info)
}

fn build_pipeline<D: GpuDevice>(
    device: &D,
    stage: &GraphicsStage,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    vertex_input: &VertexInputLayout,
    color_attachment_count: usize,
    extent: vk::Extent2D,
) -> Result<vk::Pipeline> {
    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo<'_>> = stage
        .shaders()
        .iter()
        .map(|shader| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(shader.stage)
                .module(shader.module)
                .name(&shader.entry_point)
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_input.bindings)
        .vertex_attribute_descriptions(&vertex_input.attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

    let blend_attachments = vec![
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        color_attachment_count
    ];
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0);

    device.create_graphics_pipeline(&pipeline_info)
}

/// Render pass, pipeline layout, pipeline and one framebuffer per swapchain image.
/// Anything created before a failure is released when the returned error drops the
/// half built stage.
pub(crate) fn build_physical_stage<D: GpuDevice>(
    device: &Arc<D>,
    stage: &RenderStage,
    resources: &[RenderResource],
    physical_resources: &[PhysicalResource<D>],
    swapchain: &SwapchainInfo,
    options: &FrameGraphOptions,
) -> Result<PhysicalStage<D>> {
    let RenderStage::Graphics(graphics) = stage;

    let attachments = attachment_layout(graphics.name(), graphics.writes(), resources)?;
    let vertex_input = vertex_input_layout(graphics, resources)?;

    let mut physical = PhysicalStage::new(device);
    physical.render_pass = build_render_pass(device.as_ref(), &attachments)?;

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(graphics.descriptor_layouts())
        .push_constant_ranges(graphics.push_constant_ranges());
    physical.pipeline_layout = device.create_pipeline_layout(&layout_info)?;

    physical.pipeline = build_pipeline(
        device.as_ref(),
        graphics,
        physical.render_pass,
        physical.pipeline_layout,
        &vertex_input,
        attachments.color_refs.len(),
        swapchain.extent,
    )?;

    for image_index in 0..swapchain.image_count() {
        let views: Vec<vk::ImageView> = attachments
            .resources
            .iter()
            .filter_map(|id| physical_resources[id.index()].attachment_view(image_index))
            .collect();
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(physical.render_pass)
            .attachments(&views)
            .width(swapchain.extent.width)
            .height(swapchain.extent.height)
            .layers(1);
        physical
            .framebuffers
            .push(device.create_framebuffer(&framebuffer_info)?);
    }

    physical.clear_values = clear_values(&attachments, options);
    physical.vertex_buffers = vertex_input
        .buffers
        .iter()
        .filter_map(|&(binding, id)| {
            physical_resources[id.index()]
                .as_buffer()
                .map(|buffer| (binding, buffer.buffer()))
        })
        .collect();

    Ok(physical)
}

/// Allocates one command buffer per swapchain image and records the stage into each.
pub(crate) fn record_command_buffers<D: GpuDevice>(
    device: &D,
    stage: &RenderStage,
    physical: &mut PhysicalStage<D>,
    swapchain: &SwapchainInfo,
) -> Result<()> {
    log::trace!("Allocating command buffers for stage '{}'", stage.name());
    physical.command_buffers = device.allocate_command_buffers(swapchain.image_count() as u32)?;

    log::trace!("Recording command buffers for stage '{}'", stage.name());
    let render_area = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: swapchain.extent,
    };
    let is_graphics = matches!(stage, RenderStage::Graphics(_));

    for (image_index, &handle) in physical.command_buffers.iter().enumerate() {
        let cmd = CommandBuffer::new(device, handle);
        cmd.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;

        if is_graphics {
            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(physical.render_pass)
                .framebuffer(physical.framebuffers[image_index])
                .render_area(render_area)
                .clear_values(&physical.clear_values);
            cmd.begin_render_pass(&begin_info);
        }

        for &(binding, buffer) in &physical.vertex_buffers {
            cmd.bind_vertex_buffer(binding, buffer);
        }
        cmd.bind_graphics_pipeline(physical.pipeline);

        stage.record(&StageContext {
            cmd,
            pipeline_layout: physical.pipeline_layout,
            image_index,
        });

        if is_graphics {
            cmd.end_render_pass();
        }
        cmd.end()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;
    use crate::frame_graph::resource::{BufferResource, BufferUsage, TextureResource};

    fn stage(name: &str, reads: &[usize], writes: &[usize]) -> RenderStage {
        let mut stage = GraphicsStage::new(name, |_| {});
        for &read in reads {
            stage.reads_from(ResourceId::new(read));
        }
        for &write in writes {
            stage.writes_to(ResourceId::new(write));
        }
        stage.into()
    }

    fn textures(count: usize) -> Vec<RenderResource> {
        (0..count)
            .map(|index| {
                TextureResource::new(
                    &format!("texture {index}"),
                    TextureUsage::ColorAttachment,
                    vk::Format::R8G8B8A8_UNORM,
                )
                .into()
            })
            .collect()
    }

    fn names(stages: &[RenderStage], order: &[StageId]) -> Vec<String> {
        order
            .iter()
            .map(|id| stages[id.index()].name().to_string())
            .collect()
    }

    #[test]
    fn test_producer_runs_before_consumer() {
        let resources = textures(2);
        let stages = vec![stage("b", &[0], &[1]), stage("a", &[], &[0])];

        let order = order_stages(&stages, &resources, ResourceId::new(1)).unwrap();

        assert_eq!(names(&stages, &order), vec!["a", "b"]);
    }

    #[test]
    fn test_sibling_declaration_order_keeps_dependencies() {
        let resources = textures(3);
        let forward = vec![
            stage("shadow", &[], &[0]),
            stage("gbuffer", &[], &[1]),
            stage("lighting", &[0, 1], &[2]),
        ];
        let reversed = vec![
            stage("gbuffer", &[], &[1]),
            stage("shadow", &[], &[0]),
            stage("lighting", &[0, 1], &[2]),
        ];

        for stages in [forward, reversed] {
            let order = names(
                &stages,
                &order_stages(&stages, &resources, ResourceId::new(2)).unwrap(),
            );
            assert_eq!(order.len(), 3);
            assert_eq!(order[2], "lighting");
            assert_eq!(order[0], "shadow");
            assert_eq!(order[1], "gbuffer");
        }
    }

    #[test]
    fn test_shared_producer_appears_once() {
        let resources = textures(4);
        let stages = vec![
            stage("top", &[1, 2], &[3]),
            stage("left", &[0], &[1]),
            stage("right", &[0], &[2]),
            stage("base", &[], &[0]),
        ];

        let order = order_stages(&stages, &resources, ResourceId::new(3)).unwrap();

        assert_eq!(names(&stages, &order), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_unreachable_stages_are_skipped() {
        let resources = textures(3);
        let stages = vec![
            stage("unused", &[], &[2]),
            stage("final", &[], &[0]),
        ];

        let order = order_stages(&stages, &resources, ResourceId::new(0)).unwrap();

        assert_eq!(names(&stages, &order), vec!["final"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let resources = textures(3);
        let stages = vec![
            stage("a", &[1], &[0]),
            stage("b", &[2], &[1]),
            stage("c", &[1], &[2]),
        ];

        let error = order_stages(&stages, &resources, ResourceId::new(0)).unwrap_err();

        match error {
            FrameGraphError::DependencyCycle { stages: cycle, message } => {
                assert_eq!(cycle, vec![StageId::new(1), StageId::new(2)]);
                assert_eq!(message, "Cycle detected in stages: 'b' → 'c' → 'b'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stage_reading_its_own_write_is_a_cycle() {
        let resources = textures(1);
        let stages = vec![stage("feedback", &[0], &[0])];

        let error = order_stages(&stages, &resources, ResourceId::new(0)).unwrap_err();

        assert!(matches!(
            error,
            FrameGraphError::DependencyCycle { ref stages, .. } if stages == &[StageId::new(0)]
        ));
    }

    #[test]
    fn test_target_writer_count_is_checked() {
        let resources = textures(2);

        let unwritten = vec![stage("a", &[], &[0])];
        assert!(matches!(
            order_stages(&unwritten, &resources, ResourceId::new(1)),
            Err(FrameGraphError::MissingWriter { .. })
        ));

        let doubly_written = vec![stage("a", &[], &[1]), stage("b", &[], &[1])];
        assert!(matches!(
            order_stages(&doubly_written, &resources, ResourceId::new(1)),
            Err(FrameGraphError::AmbiguousTarget { count: 2, .. })
        ));

        assert!(matches!(
            order_stages(&doubly_written, &resources, ResourceId::new(7)),
            Err(FrameGraphError::InvalidResourceId(_))
        ));
    }

    fn mixed_resources() -> Vec<RenderResource> {
        vec![
            BufferResource::with_data("vertices", BufferUsage::VertexBuffer, 12, &[0; 36]).into(),
            TextureResource::new("depth", TextureUsage::DepthStencilBuffer, vk::Format::D32_SFLOAT)
                .into(),
            TextureResource::new("back buffer", TextureUsage::BackBuffer, vk::Format::B8G8R8A8_SRGB)
                .into(),
            TextureResource::new("depth 2", TextureUsage::DepthStencilBuffer, vk::Format::D16_UNORM)
                .into(),
        ]
    }

    #[test]
    fn test_attachments_skip_buffer_writes() {
        let resources = mixed_resources();
        let writes = [ResourceId::new(0), ResourceId::new(1), ResourceId::new(2)];

        let layout = attachment_layout("main", &writes, &resources).unwrap();

        assert_eq!(layout.attachments.len(), 2);
        assert_eq!(layout.resources, vec![ResourceId::new(1), ResourceId::new(2)]);

        let depth_ref = layout.depth_ref.unwrap();
        assert_eq!(depth_ref.attachment, 0);
        assert_eq!(
            depth_ref.layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );

        assert_eq!(layout.color_refs.len(), 1);
        assert_eq!(layout.color_refs[0].attachment, 1);
        assert_eq!(
            layout.color_refs[0].layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );

        let back_buffer = &layout.attachments[1];
        assert_eq!(back_buffer.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(back_buffer.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(back_buffer.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(back_buffer.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(back_buffer.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_second_depth_write_is_rejected() {
        let resources = mixed_resources();
        let writes = [ResourceId::new(1), ResourceId::new(2), ResourceId::new(3)];

        let result = attachment_layout("main", &writes, &resources);

        assert!(matches!(
            result,
            Err(FrameGraphError::MultipleDepthAttachments { ref stage }) if stage == "main"
        ));
    }

    #[test]
    fn test_clear_values_follow_attachment_kind() {
        let resources = mixed_resources();
        let writes = [ResourceId::new(1), ResourceId::new(2)];
        let layout = attachment_layout("main", &writes, &resources).unwrap();
        let options = FrameGraphOptions {
            clear_color: [0.1, 0.2, 0.3, 1.0],
            ..Default::default()
        };

        let values = clear_values(&layout, &options);

        assert_eq!(values.len(), 2);
        let depth = unsafe { values[0].depth_stencil };
        assert_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
        let color = unsafe { values[1].color.float32 };
        assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_vertex_input_uses_bound_slots_only() {
        let mut vertices = BufferResource::with_data("vertices", BufferUsage::VertexBuffer, 24, &[0; 72]);
        vertices
            .add_vertex_attribute(vk::Format::R32G32B32_SFLOAT, 0)
            .add_vertex_attribute(vk::Format::R32G32B32_SFLOAT, 12);
        let resources: Vec<RenderResource> = vec![
            vertices.into(),
            BufferResource::with_data("unbound", BufferUsage::VertexBuffer, 4, &[0; 4]).into(),
            TextureResource::new("shadow map", TextureUsage::DepthStencilBuffer, vk::Format::D32_SFLOAT)
                .into(),
        ];

        let mut stage = GraphicsStage::new("main", |_| {});
        stage
            .reads_from(ResourceId::new(0))
            .reads_from(ResourceId::new(1))
            .reads_from(ResourceId::new(2))
            .bind_buffer(ResourceId::new(0), 1);

        let layout = vertex_input_layout(&stage, &resources).unwrap();

        assert_eq!(layout.bindings.len(), 1);
        assert_eq!(layout.bindings[0].binding, 1);
        assert_eq!(layout.bindings[0].stride, 24);
        assert_eq!(layout.bindings[0].input_rate, vk::VertexInputRate::VERTEX);

        let attributes: Vec<(u32, u32, u32)> = layout
            .attributes
            .iter()
            .map(|attribute| (attribute.location, attribute.binding, attribute.offset))
            .collect();
        assert_eq!(attributes, vec![(0, 1, 0), (1, 1, 12)]);
        assert_eq!(layout.buffers, vec![(1, ResourceId::new(0))]);
    }

    #[test]
    fn test_binding_a_texture_is_rejected() {
        let resources = mixed_resources();
        let mut stage = GraphicsStage::new("main", |_| {});
        stage
            .reads_from(ResourceId::new(1))
            .bind_buffer(ResourceId::new(1), 0);

        assert!(matches!(
            vertex_input_layout(&stage, &resources),
            Err(FrameGraphError::NotABuffer { ref name }) if name == "depth"
        ));
    }

    #[test]
    fn test_bindings_must_be_read_and_unique() {
        let resources: Vec<RenderResource> = vec![
            BufferResource::with_data("positions", BufferUsage::VertexBuffer, 12, &[0; 12]).into(),
            BufferResource::with_data("colors", BufferUsage::VertexBuffer, 12, &[0; 12]).into(),
        ];

        let mut unread = GraphicsStage::new("main", |_| {});
        unread
            .reads_from(ResourceId::new(0))
            .bind_buffer(ResourceId::new(0), 0)
            .bind_buffer(ResourceId::new(1), 1);
        assert!(matches!(
            validate_buffer_bindings(&unread, &resources),
            Err(FrameGraphError::UnreadBufferBinding { ref stage, ref name })
                if stage == "main" && name == "colors"
        ));

        let mut shared = GraphicsStage::new("main", |_| {});
        shared
            .reads_from(ResourceId::new(0))
            .reads_from(ResourceId::new(1))
            .bind_buffer(ResourceId::new(0), 2)
            .bind_buffer(ResourceId::new(1), 2);
        assert!(matches!(
            validate_buffer_bindings(&shared, &resources),
            Err(FrameGraphError::DuplicateBindingSlot { slot: 2, .. })
        ));

        let mut valid = GraphicsStage::new("main", |_| {});
        valid
            .reads_from(ResourceId::new(0))
            .reads_from(ResourceId::new(1))
            .bind_buffer(ResourceId::new(0), 0)
            .bind_buffer(ResourceId::new(1), 1);
        assert!(validate_buffer_bindings(&valid, &resources).is_ok());
    }

    #[test]
    fn test_render_pass_has_one_subpass_and_dependency() {
        let device = MockDevice::new();
        let resources = mixed_resources();
        let writes = [ResourceId::new(1), ResourceId::new(2)];
        let layout = attachment_layout("main", &writes, &resources).unwrap();

        build_render_pass(&device, &layout).unwrap();

        device.with_state(|state| {
            assert_eq!(state.render_passes.len(), 1);
            assert_eq!(state.render_passes[0].attachment_count, 2);
            assert_eq!(state.render_passes[0].subpass_count, 1);
            assert_eq!(state.render_passes[0].dependency_count, 1);
        });
    }
}
