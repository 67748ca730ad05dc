//! GPU objects realised from the logical graph at compile time.
//!
//! Every physical object holds the device it was created on and releases its own
//! handles when dropped, newest first. Null handles are skipped so a half built object
//! can be dropped on the error path.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;

use super::resource::{BufferResource, BufferUsage, TextureResource, TextureUsage, texture_aspect_mask};
use super::{FrameGraphError, Result};
use crate::device::{GpuDevice, SwapchainInfo};

pub struct PhysicalBuffer<D: GpuDevice> {
    device: Arc<D>,
    buffer: vk::Buffer,
    allocation: Option<D::Allocation>,
    size: u64,
}

impl<D: GpuDevice> PhysicalBuffer<D> {
    /// Host visible when the logical buffer carries data, which is copied in straight
    /// away. Device local otherwise.
    pub(crate) fn new(device: &Arc<D>, resource: &BufferResource) -> Result<Self> {
        let usage = match resource.usage() {
            BufferUsage::VertexBuffer => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Invalid => {
                return Err(FrameGraphError::InvalidUsage {
                    name: resource.name().to_string(),
                });
            }
        };
        if resource.data_size() == 0 {
            return Err(FrameGraphError::EmptyBuffer {
                name: resource.name().to_string(),
            });
        }

        let location = if resource.data().is_some() {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let buffer_info = vk::BufferCreateInfo::default()
            .size(resource.data_size())
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (buffer, allocation) = device.create_buffer(resource.name(), &buffer_info, location)?;

        let mut physical = Self {
            device: device.clone(),
            buffer,
            allocation: Some(allocation),
            size: resource.data_size(),
        };

        if let Some(data) = resource.data() {
            let mapped = physical
                .mapped_slice_mut()
                .ok_or_else(|| FrameGraphError::BufferNotMapped {
                    name: resource.name().to_string(),
                })?;
            mapped[..data.len()].copy_from_slice(data);
        }

        log::trace!(
            "Allocated buffer '{}' ({} bytes, {:?})",
            resource.name(),
            resource.data_size(),
            location
        );
        Ok(physical)
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mapped bytes, `None` for device local buffers.
    pub fn mapped_slice(&self) -> Option<&[u8]> {
        self.allocation
            .as_ref()
            .and_then(|allocation| self.device.mapped_slice(allocation))
    }

    pub(crate) fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        let device = &self.device;
        self.allocation
            .as_mut()
            .and_then(|allocation| device.mapped_slice_mut(allocation))
    }
}

impl<D: GpuDevice> Drop for PhysicalBuffer<D> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_buffer(self.buffer, allocation);
        }
    }
}

pub struct PhysicalImage<D: GpuDevice> {
    device: Arc<D>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<D::Allocation>,
}

impl<D: GpuDevice> PhysicalImage<D> {
    pub(crate) fn new(device: &Arc<D>, resource: &TextureResource, extent: vk::Extent2D) -> Result<Self> {
        let usage = match resource.usage() {
            TextureUsage::DepthStencilBuffer => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            TextureUsage::ColorAttachment => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            TextureUsage::BackBuffer | TextureUsage::Invalid => {
                return Err(FrameGraphError::InvalidUsage {
                    name: resource.name().to_string(),
                });
            }
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(resource.format())
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let (image, allocation) =
            device.create_image(resource.name(), &image_info, MemoryLocation::GpuOnly)?;

        let mut physical = Self {
            device: device.clone(),
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(resource.format())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: texture_aspect_mask(resource),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        physical.view = device.create_image_view(&view_info)?;

        log::trace!(
            "Allocated image '{}' ({}x{}, {:?})",
            resource.name(),
            extent.width,
            extent.height,
            resource.format()
        );
        Ok(physical)
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl<D: GpuDevice> Drop for PhysicalImage<D> {
    fn drop(&mut self) {
        if self.view != vk::ImageView::null() {
            self.device.destroy_image_view(self.view);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_image(self.image, allocation);
        }
    }
}

/// Borrowed swapchain image views. The swapchain owns them, so nothing is released here.
#[derive(Debug, Clone)]
pub struct PhysicalBackBuffer {
    image_views: Vec<vk::ImageView>,
}

impl PhysicalBackBuffer {
    pub(crate) fn new(swapchain: &SwapchainInfo) -> Self {
        Self {
            image_views: swapchain.image_views.clone(),
        }
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

pub enum PhysicalResource<D: GpuDevice> {
    Buffer(PhysicalBuffer<D>),
    Image(PhysicalImage<D>),
    BackBuffer(PhysicalBackBuffer),
}

impl<D: GpuDevice> PhysicalResource<D> {
    /// View attached to a framebuffer for the given swapchain image. Buffers have none.
    pub fn attachment_view(&self, image_index: usize) -> Option<vk::ImageView> {
        match self {
            PhysicalResource::Buffer(_) => None,
            PhysicalResource::Image(image) => Some(image.view()),
            PhysicalResource::BackBuffer(back_buffer) => {
                back_buffer.image_views().get(image_index).copied()
            }
        }
    }

    pub fn as_buffer(&self) -> Option<&PhysicalBuffer<D>> {
        match self {
            PhysicalResource::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub(crate) fn as_buffer_mut(&mut self) -> Option<&mut PhysicalBuffer<D>> {
        match self {
            PhysicalResource::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&PhysicalImage<D>> {
        match self {
            PhysicalResource::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Render pass, pipeline, framebuffers and pre-recorded command buffers of one graphics
/// stage. Framebuffers and command buffers are indexed by swapchain image.
pub struct PhysicalStage<D: GpuDevice> {
    device: Arc<D>,
    pub(crate) render_pass: vk::RenderPass,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) framebuffers: Vec<vk::Framebuffer>,
    pub(crate) command_buffers: Vec<vk::CommandBuffer>,
    pub(crate) clear_values: Vec<vk::ClearValue>,
    pub(crate) vertex_buffers: Vec<(u32, vk::Buffer)>,
}

impl<D: GpuDevice> PhysicalStage<D> {
    pub(crate) fn new(device: &Arc<D>) -> Self {
        Self {
            device: device.clone(),
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
            clear_values: Vec::new(),
            vertex_buffers: Vec::new(),
        }
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }
}

impl<D: GpuDevice> Drop for PhysicalStage<D> {
    fn drop(&mut self) {
        self.device.free_command_buffers(&self.command_buffers);
        if self.pipeline != vk::Pipeline::null() {
            self.device.destroy_pipeline(self.pipeline);
        }
        if self.pipeline_layout != vk::PipelineLayout::null() {
            self.device.destroy_pipeline_layout(self.pipeline_layout);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
        }
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer);
        }
    }
}
