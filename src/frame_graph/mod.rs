//! Declarative frame graph.
//!
//! Resources and stages are declared up front, then [`FrameGraph::compile`] orders the
//! stages that the target depends on, creates every GPU object and records one command
//! buffer per swapchain image and stage. [`FrameGraph::render`] only submits.

mod compiler;
mod error;
pub mod physical;
mod resource;
mod stage;

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

pub use error::{FrameGraphError, Result, vulkan_error};
use physical::{PhysicalBackBuffer, PhysicalBuffer, PhysicalImage, PhysicalResource, PhysicalStage};
pub use resource::{
    BufferResource, BufferUsage, RenderResource, ResourceId, TextureResource, TextureUsage,
};
pub use stage::{GraphicsStage, RenderStage, StageContext, StageId};

use crate::device::{GpuDevice, SwapchainInfo};

#[derive(Debug, Clone)]
pub struct FrameGraphOptions {
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub print_graph_report: bool,
}

impl Default for FrameGraphOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 0.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            print_graph_report: false,
        }
    }
}

pub struct FrameGraph<D: GpuDevice> {
    device: Arc<D>,
    swapchain: SwapchainInfo,
    options: FrameGraphOptions,
    resources: Vec<RenderResource>,
    resource_map: HashMap<String, ResourceId>,
    stages: Vec<RenderStage>,
    execution_order: Vec<StageId>,
    physical_resources: Vec<PhysicalResource<D>>,
    physical_stages: Vec<(StageId, PhysicalStage<D>)>,
    compiled: bool,
}

impl<D: GpuDevice> FrameGraph<D> {
    pub fn new(device: Arc<D>, swapchain: SwapchainInfo, options: FrameGraphOptions) -> Self {
        Self {
            device,
            swapchain,
            options,
            resources: Vec::new(),
            resource_map: HashMap::new(),
            stages: Vec::new(),
            execution_order: Vec::new(),
            physical_resources: Vec::new(),
            physical_stages: Vec::new(),
            compiled: false,
        }
    }

    pub fn add_resource(&mut self, resource: impl Into<RenderResource>) -> Result<ResourceId> {
        if self.compiled {
            return Err(FrameGraphError::AlreadyCompiled);
        }

        let resource = resource.into();
        if self.resource_map.contains_key(resource.name()) {
            return Err(FrameGraphError::DuplicateResource {
                name: resource.name().to_string(),
            });
        }

        let id = ResourceId::new(self.resources.len());
        self.resource_map.insert(resource.name().to_string(), id);
        self.resources.push(resource);
        Ok(id)
    }

    pub fn add_stage(&mut self, stage: impl Into<RenderStage>) -> Result<StageId> {
        if self.compiled {
            return Err(FrameGraphError::AlreadyCompiled);
        }

        let stage = stage.into();
        for &resource in stage.reads().iter().chain(stage.writes()) {
            self.validate_resource(resource)?;
        }
        match &stage {
            RenderStage::Graphics(graphics) => {
                compiler::validate_buffer_bindings(graphics, &self.resources)?
            }
        }

        let id = StageId::new(self.stages.len());
        self.stages.push(stage);
        Ok(id)
    }

    fn validate_resource(&self, id: ResourceId) -> Result<()> {
        if id.index() >= self.resources.len() {
            return Err(FrameGraphError::InvalidResourceId(id));
        }
        Ok(())
    }

    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resource_map.get(name).copied()
    }

    pub fn resource(&self, id: ResourceId) -> Result<&RenderResource> {
        self.resources
            .get(id.index())
            .ok_or(FrameGraphError::InvalidResourceId(id))
    }

    pub fn stage(&self, id: StageId) -> Result<&RenderStage> {
        self.stages
            .get(id.index())
            .ok_or(FrameGraphError::InvalidStageId(id))
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Stages in submission order. Empty until compiled.
    pub fn execution_order(&self) -> &[StageId] {
        &self.execution_order
    }

    pub fn physical_resource(&self, id: ResourceId) -> Result<&PhysicalResource<D>> {
        if !self.compiled {
            return Err(FrameGraphError::NotCompiled);
        }
        self.physical_resources
            .get(id.index())
            .ok_or(FrameGraphError::InvalidResourceId(id))
    }

    /// `None` for stages the target does not depend on.
    pub fn physical_stage(&self, id: StageId) -> Result<Option<&PhysicalStage<D>>> {
        if !self.compiled {
            return Err(FrameGraphError::NotCompiled);
        }
        self.stage(id)?;
        Ok(self
            .physical_stages
            .iter()
            .find(|(stage_id, _)| *stage_id == id)
            .map(|(_, physical)| physical))
    }

    /// Builds every GPU object for the stages `target` depends on and pre-records their
    /// command buffers. On failure everything created so far is released and the graph
    /// can be fixed and compiled again.
    pub fn compile(&mut self, target: ResourceId) -> Result<()> {
        if self.compiled {
            return Err(FrameGraphError::AlreadyCompiled);
        }
        self.validate_resource(target)?;

        for resource in &self.resources {
            if !resource.has_valid_usage() {
                return Err(FrameGraphError::InvalidUsage {
                    name: resource.name().to_string(),
                });
            }
        }

        let order = compiler::order_stages(&self.stages, &self.resources, target)?;
        let names: Vec<&str> = order
            .iter()
            .map(|id| self.stages[id.index()].name())
            .collect();
        log::debug!("Frame graph stage order: {names:?}");

        if let Err(error) = self.build(&order) {
            self.release();
            return Err(error);
        }

        self.execution_order = order;
        self.compiled = true;
        log::info!(
            "Compiled frame graph: {} stages, {} resources, {} swapchain images",
            self.execution_order.len(),
            self.physical_resources.len(),
            self.swapchain.image_count()
        );

        if self.options.print_graph_report {
            self.print_graph_report();
        }

        Ok(())
    }

    fn build(&mut self, order: &[StageId]) -> Result<()> {
        for resource in &self.resources {
            let physical = match resource {
                RenderResource::Buffer(buffer) => {
                    PhysicalResource::Buffer(PhysicalBuffer::new(&self.device, buffer)?)
                }
                RenderResource::Texture(texture) if texture.usage() == TextureUsage::BackBuffer => {
                    PhysicalResource::BackBuffer(PhysicalBackBuffer::new(&self.swapchain))
                }
                RenderResource::Texture(texture) => PhysicalResource::Image(PhysicalImage::new(
                    &self.device,
                    texture,
                    self.swapchain.extent,
                )?),
            };
            self.physical_resources.push(physical);
        }

        for &id in order {
            let physical = compiler::build_physical_stage(
                &self.device,
                &self.stages[id.index()],
                &self.resources,
                &self.physical_resources,
                &self.swapchain,
                &self.options,
            )?;
            self.physical_stages.push((id, physical));
        }

        for (id, physical) in &mut self.physical_stages {
            compiler::record_command_buffers(
                self.device.as_ref(),
                &self.stages[id.index()],
                physical,
                &self.swapchain,
            )?;
        }

        Ok(())
    }

    /// Drops physical stages, then physical resources, each newest first.
    fn release(&mut self) {
        while let Some((_, stage)) = self.physical_stages.pop() {
            drop(stage);
        }
        while let Some(resource) = self.physical_resources.pop() {
            drop(resource);
        }
    }

    /// Submits every stage's command buffer for `image_index` in execution order. Each
    /// submission waits on `wait_semaphore` at colour attachment output and signals
    /// `signal_semaphore`.
    pub fn render(
        &self,
        image_index: u32,
        signal_semaphore: vk::Semaphore,
        wait_semaphore: vk::Semaphore,
        queue: vk::Queue,
    ) -> Result<()> {
        if !self.compiled {
            return Err(FrameGraphError::NotCompiled);
        }
        let image_count = self.swapchain.image_count();
        if image_index as usize >= image_count {
            return Err(FrameGraphError::ImageIndexOutOfRange {
                index: image_index,
                image_count,
            });
        }

        for (_, stage) in &self.physical_stages {
            self.device.queue_submit(
                queue,
                stage.command_buffers[image_index as usize],
                wait_semaphore,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore,
            )?;
        }

        Ok(())
    }

    /// Writes `bytes` into a host visible buffer at `offset`. Recorded command buffers
    /// pick the new contents up on their next submission.
    pub fn update_buffer(&mut self, id: ResourceId, offset: u64, bytes: &[u8]) -> Result<()> {
        if !self.compiled {
            return Err(FrameGraphError::NotCompiled);
        }
        let name = self.resource(id)?.name().to_string();
        let buffer = self
            .physical_resources
            .get_mut(id.index())
            .and_then(PhysicalResource::as_buffer_mut)
            .ok_or_else(|| FrameGraphError::NotABuffer { name: name.clone() })?;

        let size = buffer.size();
        let len = bytes.len() as u64;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or_else(|| FrameGraphError::UpdateOutOfBounds {
                name: name.clone(),
                offset,
                len,
                size,
            })?;

        let mapped = buffer
            .mapped_slice_mut()
            .ok_or(FrameGraphError::BufferNotMapped { name })?;
        mapped[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Current contents of a host visible buffer.
    pub fn buffer_contents(&self, id: ResourceId) -> Result<&[u8]> {
        let name = self.resource(id)?.name();
        let buffer = self
            .physical_resource(id)?
            .as_buffer()
            .ok_or_else(|| FrameGraphError::NotABuffer {
                name: name.to_string(),
            })?;
        let mapped = buffer
            .mapped_slice()
            .ok_or_else(|| FrameGraphError::BufferNotMapped {
                name: name.to_string(),
            })?;
        Ok(&mapped[..buffer.size() as usize])
    }

    pub fn export_graphviz(&self) -> String {
        let mut dot = String::from("digraph FrameGraph {\n");
        dot.push_str("  rankdir=LR;\n");

        for (index, stage) in self.stages.iter().enumerate() {
            dot.push_str(&format!(
                "  s{} [label=\"{}\", shape=box];\n",
                index,
                stage.name()
            ));
        }

        for (index, resource) in self.resources.iter().enumerate() {
            dot.push_str(&format!(
                "  r{} [label=\"{}\", shape=ellipse];\n",
                index,
                resource.name()
            ));
        }

        for (index, stage) in self.stages.iter().enumerate() {
            for resource in stage.reads() {
                dot.push_str(&format!(
                    "  r{} -> s{} [style=solid];\n",
                    resource.index(),
                    index
                ));
            }
            for resource in stage.writes() {
                dot.push_str(&format!(
                    "  s{} -> r{} [style=bold];\n",
                    index,
                    resource.index()
                ));
            }
        }

        dot.push_str("}\n");
        dot
    }

    pub fn print_graph_report(&self) {
        println!("=== Frame Graph Report ===");
        for (position, id) in self.execution_order.iter().enumerate() {
            let stage = &self.stages[id.index()];
            println!(
                "{}: '{}' ({} reads, {} writes)",
                position,
                stage.name(),
                stage.reads().len(),
                stage.writes().len()
            );
        }
        println!(
            "Total: {} of {} stages scheduled, {} resources",
            self.execution_order.len(),
            self.stages.len(),
            self.resources.len()
        );
        print!("{}", self.export_graphviz());
    }
}

impl<D: GpuDevice> Drop for FrameGraph<D> {
    fn drop(&mut self) {
        self.release();
    }
}
