pub mod device;
pub mod frame_graph;
pub mod shader;

pub use device::{CommandBuffer, CommandRecorder, GpuDevice, SwapchainInfo, ash_device::AshDevice};
pub use frame_graph::{
    BufferResource, BufferUsage, FrameGraph, FrameGraphError, FrameGraphOptions, GraphicsStage,
    RenderResource, RenderStage, ResourceId, Result, StageContext, StageId, TextureResource,
    TextureUsage,
};
pub use shader::Shader;
