use ash::vk;

use super::{ResourceId, StageId};

#[derive(Debug, thiserror::Error)]
pub enum FrameGraphError {
    #[error("Resource '{name}' has no valid usage")]
    InvalidUsage { name: String },

    #[error("A resource named '{name}' already exists")]
    DuplicateResource { name: String },

    #[error("Invalid resource {0:?}")]
    InvalidResourceId(ResourceId),

    #[error("Invalid stage {0:?}")]
    InvalidStageId(StageId),

    #[error("Resource '{name}' is not a buffer")]
    NotABuffer { name: String },

    #[error("Stage '{stage}' binds '{name}' to a vertex slot without reading it")]
    UnreadBufferBinding { stage: String, name: String },

    #[error("Stage '{stage}' binds more than one buffer to vertex slot {slot}")]
    DuplicateBindingSlot { stage: String, slot: u32 },

    #[error("Buffer '{name}' has a data size of zero")]
    EmptyBuffer { name: String },

    #[error("Target resource '{name}' is not written by any stage")]
    MissingWriter { name: String },

    #[error("Target resource '{name}' is written by {count} stages, expected exactly one")]
    AmbiguousTarget { name: String, count: usize },

    #[error("Dependency cycle detected: {message}")]
    DependencyCycle { stages: Vec<StageId>, message: String },

    #[error("Stage '{stage}' writes more than one depth stencil buffer")]
    MultipleDepthAttachments { stage: String },

    #[error("Frame graph has already been compiled")]
    AlreadyCompiled,

    #[error("Frame graph has not been compiled")]
    NotCompiled,

    #[error("Image index {index} is out of range for {image_count} swapchain images")]
    ImageIndexOutOfRange { index: u32, image_count: usize },

    #[error("Buffer '{name}' is not host visible")]
    BufferNotMapped { name: String },

    #[error("Writing {len} bytes at offset {offset} overflows buffer '{name}' of {size} bytes")]
    UpdateOutOfBounds {
        name: String,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("Failed to {operation}: {result}")]
    Vulkan {
        operation: &'static str,
        result: vk::Result,
    },

    #[error("GPU allocator error: {0}")]
    GpuAllocator(#[from] gpu_allocator::AllocationError),

    #[error("GPU allocator lock was poisoned")]
    AllocatorPoisoned,

    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    #[error("Shader entry point '{0}' contains a nul byte")]
    InvalidEntryPoint(String),
}

pub type Result<T> = std::result::Result<T, FrameGraphError>;

/// Maps a raw Vulkan result to an error naming the call that produced it.
pub fn vulkan_error(operation: &'static str) -> impl FnOnce(vk::Result) -> FrameGraphError {
    move |result| FrameGraphError::Vulkan { operation, result }
}
