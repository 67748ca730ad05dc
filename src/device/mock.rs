//! Recording device used by the unit tests. Hands out fake handles, keeps buffer memory
//! in plain vectors and logs every call so tests can inspect what the graph did.

use std::collections::HashMap;
use std::sync::Mutex;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;

use super::{CommandRecorder, GpuDevice};
use crate::frame_graph::{Result, vulkan_error};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin(vk::CommandBufferUsageFlags),
    End,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_value_count: u32,
    },
    EndRenderPass,
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
    },
    BindPipeline(vk::Pipeline),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        count: usize,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        offset: u32,
        size: usize,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destroyed {
    Buffer(vk::Buffer),
    Image(vk::Image),
    ImageView(vk::ImageView),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Framebuffer(vk::Framebuffer),
    CommandBuffers(usize),
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub queue: vk::Queue,
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
}

#[derive(Debug, Clone)]
pub struct CreatedBuffer {
    pub name: String,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

#[derive(Debug, Clone)]
pub struct CreatedImage {
    pub name: String,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Debug, Clone)]
pub struct CreatedRenderPass {
    pub attachment_count: u32,
    pub dependency_count: u32,
    pub subpass_count: u32,
}

#[derive(Debug, Default)]
pub struct MockState {
    next_handle: u64,
    pub buffers: Vec<CreatedBuffer>,
    pub images: Vec<CreatedImage>,
    pub image_views: Vec<vk::ImageView>,
    pub render_passes: Vec<CreatedRenderPass>,
    pub pipeline_layouts: Vec<vk::PipelineLayout>,
    pub pipelines: Vec<vk::Pipeline>,
    pub framebuffers: Vec<(vk::Framebuffer, u32)>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub recorded: HashMap<vk::CommandBuffer, Vec<Command>>,
    pub submissions: Vec<Submission>,
    pub destroyed: Vec<Destroyed>,
    pub fail_on: Option<&'static str>,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.fail_on == Some(operation) {
            return Err(vulkan_error(operation)(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        Ok(())
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: Command) {
        self.recorded.entry(cmd).or_default().push(command);
    }
}

#[derive(Debug)]
pub struct MockAllocation {
    pub data: Vec<u8>,
    pub mapped: bool,
}

#[derive(Debug, Default)]
pub struct MockDevice {
    pub state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named creation call fail with `ERROR_INITIALIZATION_FAILED`.
    pub fn failing_on(operation: &'static str) -> Self {
        let device = Self::default();
        device.state.lock().unwrap().fail_on = Some(operation);
        device
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    pub fn fake_image_views(count: usize) -> Vec<vk::ImageView> {
        (0..count)
            .map(|index| vk::ImageView::from_raw(0xdead_0000 + index as u64))
            .collect()
    }
}

impl GpuDevice for MockDevice {
    type Allocation = MockAllocation;

    fn create_buffer(
        &self,
        name: &str,
        info: &vk::BufferCreateInfo<'_>,
        location: MemoryLocation,
    ) -> Result<(vk::Buffer, MockAllocation)> {
        let mut state = self.state.lock().unwrap();
        state.check("create buffer")?;
        let buffer = vk::Buffer::from_raw(state.handle());
        state.buffers.push(CreatedBuffer {
            name: name.to_string(),
            size: info.size,
            usage: info.usage,
            location,
        });
        let allocation = MockAllocation {
            data: vec![0; info.size as usize],
            mapped: location == MemoryLocation::CpuToGpu,
        };
        Ok((buffer, allocation))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, _allocation: MockAllocation) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::Buffer(buffer));
    }

    fn mapped_slice<'a>(&self, allocation: &'a MockAllocation) -> Option<&'a [u8]> {
        allocation.mapped.then_some(allocation.data.as_slice())
    }

    fn mapped_slice_mut<'a>(&self, allocation: &'a mut MockAllocation) -> Option<&'a mut [u8]> {
        if allocation.mapped {
            Some(allocation.data.as_mut_slice())
        } else {
            None
        }
    }

    fn create_image(
        &self,
        name: &str,
        info: &vk::ImageCreateInfo<'_>,
        _location: MemoryLocation,
    ) -> Result<(vk::Image, MockAllocation)> {
        let mut state = self.state.lock().unwrap();
        state.check("create image")?;
        let image = vk::Image::from_raw(state.handle());
        state.images.push(CreatedImage {
            name: name.to_string(),
            extent: info.extent,
            format: info.format,
            usage: info.usage,
        });
        let allocation = MockAllocation {
            data: Vec::new(),
            mapped: false,
        };
        Ok((image, allocation))
    }

    fn destroy_image(&self, image: vk::Image, _allocation: MockAllocation) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::Image(image));
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        let mut state = self.state.lock().unwrap();
        state.check("create image view")?;
        let view = vk::ImageView::from_raw(state.handle());
        state.image_views.push(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::ImageView(view));
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> Result<vk::RenderPass> {
        let mut state = self.state.lock().unwrap();
        state.check("create render pass")?;
        let render_pass = vk::RenderPass::from_raw(state.handle());
        state.render_passes.push(CreatedRenderPass {
            attachment_count: info.attachment_count,
            dependency_count: info.dependency_count,
            subpass_count: info.subpass_count,
        });
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::RenderPass(render_pass));
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout> {
        let mut state = self.state.lock().unwrap();
        state.check("create pipeline layout")?;
        let layout = vk::PipelineLayout::from_raw(state.handle());
        state.pipeline_layouts.push(layout);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::PipelineLayout(layout));
    }

    fn create_graphics_pipeline(
        &self,
        _info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline> {
        let mut state = self.state.lock().unwrap();
        state.check("create graphics pipeline")?;
        let pipeline = vk::Pipeline::from_raw(state.handle());
        state.pipelines.push(pipeline);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::Pipeline(pipeline));
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> Result<vk::Framebuffer> {
        let mut state = self.state.lock().unwrap();
        state.check("create framebuffer")?;
        let framebuffer = vk::Framebuffer::from_raw(state.handle());
        state.framebuffers.push((framebuffer, info.attachment_count));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(Destroyed::Framebuffer(framebuffer));
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock().unwrap();
        state.check("allocate command buffers")?;
        let command_buffers: Vec<_> = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.handle()))
            .collect();
        state.command_buffers.extend_from_slice(&command_buffers);
        Ok(command_buffers)
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock().unwrap();
        state
            .destroyed
            .push(Destroyed::CommandBuffers(command_buffers.len()));
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("submit command buffer")?;
        state.submissions.push(Submission {
            queue,
            command_buffer,
            wait_semaphore,
            wait_stage,
            signal_semaphore,
        });
        Ok(())
    }
}

impl CommandRecorder for MockDevice {
    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("begin command buffer")?;
        state.record(cmd, Command::Begin(flags));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("end command buffer")?;
        state.record(cmd, Command::End);
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        let mut state = self.state.lock().unwrap();
        state.record(
            cmd,
            Command::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                extent: info.render_area.extent,
                clear_value_count: info.clear_value_count,
            },
        );
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        let mut state = self.state.lock().unwrap();
        state.record(cmd, Command::EndRenderPass);
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        _offsets: &[vk::DeviceSize],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(
            cmd,
            Command::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
            },
        );
    }

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(cmd, Command::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(
            cmd,
            Command::BindDescriptorSets {
                layout,
                first_set,
                count: sets.len(),
            },
        );
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(
            cmd,
            Command::PushConstants {
                layout,
                offset,
                size: data.len(),
            },
        );
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        let mut state = self.state.lock().unwrap();
        state.record(
            cmd,
            Command::Draw {
                vertex_count,
                instance_count,
            },
        );
    }
}
