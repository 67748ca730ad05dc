//! The narrow GPU interface the frame graph is compiled against.
//!
//! [`GpuDevice`] covers object creation and submission, [`CommandRecorder`] covers
//! command recording. [`ash_device::AshDevice`] implements both on top of `ash` and
//! `gpu-allocator`.

pub mod ash_device;

#[cfg(test)]
pub(crate) mod mock;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::frame_graph::Result;

/// Recording half of the device. Object safe so stage callbacks can take it as `&dyn`.
pub trait CommandRecorder {
    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<()>;

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>);

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
}

pub trait GpuDevice: CommandRecorder {
    type Allocation;

    fn create_buffer(
        &self,
        name: &str,
        info: &vk::BufferCreateInfo<'_>,
        location: MemoryLocation,
    ) -> Result<(vk::Buffer, Self::Allocation)>;

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Self::Allocation);

    /// Host visible view of an allocation, `None` for device local memory.
    fn mapped_slice<'a>(&self, allocation: &'a Self::Allocation) -> Option<&'a [u8]>;

    fn mapped_slice_mut<'a>(&self, allocation: &'a mut Self::Allocation) -> Option<&'a mut [u8]>;

    fn create_image(
        &self,
        name: &str,
        info: &vk::ImageCreateInfo<'_>,
        location: MemoryLocation,
    ) -> Result<(vk::Image, Self::Allocation)>;

    fn destroy_image(&self, image: vk::Image, allocation: Self::Allocation);

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> Result<vk::RenderPass>;

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout>;

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline>;

    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> Result<vk::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Allocates primary command buffers from the device's command pool.
    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>>;

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal_semaphore: vk::Semaphore,
    ) -> Result<()>;
}

/// What the frame graph needs to know about the swapchain it renders into.
#[derive(Debug, Clone)]
pub struct SwapchainInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub image_views: Vec<vk::ImageView>,
}

impl SwapchainInfo {
    pub fn image_count(&self) -> usize {
        self.image_views.len()
    }
}

/// A command buffer handle paired with the recorder that writes into it.
#[derive(Clone, Copy)]
pub struct CommandBuffer<'a> {
    recorder: &'a dyn CommandRecorder,
    handle: vk::CommandBuffer,
}

impl<'a> CommandBuffer<'a> {
    pub fn new(recorder: &'a dyn CommandRecorder, handle: vk::CommandBuffer) -> Self {
        Self { recorder, handle }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub(crate) fn begin(&self, flags: vk::CommandBufferUsageFlags) -> Result<()> {
        self.recorder.begin_command_buffer(self.handle, flags)
    }

    pub(crate) fn end(&self) -> Result<()> {
        self.recorder.end_command_buffer(self.handle)
    }

    pub(crate) fn begin_render_pass(&self, info: &vk::RenderPassBeginInfo<'_>) {
        self.recorder.cmd_begin_render_pass(self.handle, info);
    }

    pub(crate) fn end_render_pass(&self) {
        self.recorder.cmd_end_render_pass(self.handle);
    }

    pub(crate) fn bind_vertex_buffer(&self, binding: u32, buffer: vk::Buffer) {
        self.recorder
            .cmd_bind_vertex_buffers(self.handle, binding, &[buffer], &[0]);
    }

    pub(crate) fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        self.recorder
            .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.recorder.cmd_bind_descriptor_sets(
            self.handle,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            first_set,
            sets,
        );
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.recorder
            .cmd_push_constants(self.handle, layout, stages, offset, data);
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.recorder.cmd_draw(
            self.handle,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        );
    }
}
