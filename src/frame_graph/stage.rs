use std::collections::HashMap;
use std::ffi::CString;

use ash::vk;

use super::ResourceId;
use crate::device::CommandBuffer;
use crate::shader::Shader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u32);

impl StageId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handed to a stage's record callback once per swapchain image. The render pass,
/// vertex buffers and pipeline are already bound.
pub struct StageContext<'a> {
    pub cmd: CommandBuffer<'a>,
    pub pipeline_layout: vk::PipelineLayout,
    pub image_index: usize,
}

pub type RecordFn = Box<dyn Fn(&StageContext<'_>)>;

#[derive(Debug, Clone)]
pub(crate) struct ShaderStageEntry {
    pub module: vk::ShaderModule,
    pub stage: vk::ShaderStageFlags,
    pub entry_point: CString,
}

/// A graphics pass: one render pass, one pipeline, one set of command buffers.
pub struct GraphicsStage {
    name: String,
    reads: Vec<ResourceId>,
    writes: Vec<ResourceId>,
    on_record: RecordFn,
    descriptor_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    shaders: Vec<ShaderStageEntry>,
    buffer_bindings: HashMap<ResourceId, u32>,
}

impl GraphicsStage {
    pub fn new(name: &str, on_record: impl Fn(&StageContext<'_>) + 'static) -> Self {
        Self {
            name: name.to_string(),
            reads: Vec::new(),
            writes: Vec::new(),
            on_record: Box::new(on_record),
            descriptor_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            shaders: Vec::new(),
            buffer_bindings: HashMap::new(),
        }
    }

    /// Declares a write. For textures, the position in the write list decides the
    /// attachment order.
    pub fn writes_to(&mut self, resource: ResourceId) -> &mut Self {
        self.writes.push(resource);
        self
    }

    pub fn reads_from(&mut self, resource: ResourceId) -> &mut Self {
        self.reads.push(resource);
        self
    }

    /// Binds a read buffer to a vertex input binding slot.
    pub fn bind_buffer(&mut self, buffer: ResourceId, binding: u32) -> &mut Self {
        self.buffer_bindings.insert(buffer, binding);
        self
    }

    pub fn uses_shader(&mut self, shader: &Shader) -> &mut Self {
        self.shaders.push(ShaderStageEntry {
            module: shader.module(),
            stage: shader.stage(),
            entry_point: shader.entry_point().to_owned(),
        });
        self
    }

    pub fn add_descriptor_layout(&mut self, layout: vk::DescriptorSetLayout) -> &mut Self {
        self.descriptor_layouts.push(layout);
        self
    }

    pub fn add_push_constant_range(
        &mut self,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> &mut Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags,
            offset,
            size,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reads(&self) -> &[ResourceId] {
        &self.reads
    }

    pub fn writes(&self) -> &[ResourceId] {
        &self.writes
    }

    pub fn buffer_binding(&self, buffer: ResourceId) -> Option<u32> {
        self.buffer_bindings.get(&buffer).copied()
    }

    /// Vertex buffer bindings ordered by resource.
    pub fn buffer_bindings(&self) -> Vec<(ResourceId, u32)> {
        let mut bindings: Vec<_> = self
            .buffer_bindings
            .iter()
            .map(|(&buffer, &binding)| (buffer, binding))
            .collect();
        bindings.sort();
        bindings
    }

    pub fn descriptor_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.descriptor_layouts
    }

    pub(crate) fn shaders(&self) -> &[ShaderStageEntry] {
        &self.shaders
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }
}

pub enum RenderStage {
    Graphics(GraphicsStage),
}

impl RenderStage {
    pub fn name(&self) -> &str {
        match self {
            RenderStage::Graphics(stage) => stage.name(),
        }
    }

    pub fn reads(&self) -> &[ResourceId] {
        match self {
            RenderStage::Graphics(stage) => stage.reads(),
        }
    }

    pub fn writes(&self) -> &[ResourceId] {
        match self {
            RenderStage::Graphics(stage) => stage.writes(),
        }
    }

    pub(crate) fn record(&self, context: &StageContext<'_>) {
        match self {
            RenderStage::Graphics(stage) => (stage.on_record)(context),
        }
    }
}

impl From<GraphicsStage> for RenderStage {
    fn from(stage: GraphicsStage) -> Self {
        RenderStage::Graphics(stage)
    }
}
