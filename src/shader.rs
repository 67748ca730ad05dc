use std::ffi::{CStr, CString};

use ash::vk;

use crate::frame_graph::{FrameGraphError, Result};

/// A compiled shader module together with the stage it runs in and its entry point.
///
/// The module itself is owned by whoever created it and must outlive any compiled
/// frame graph whose stages use it.
#[derive(Debug, Clone)]
pub struct Shader {
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    entry_point: CString,
}

impl Shader {
    pub fn new(module: vk::ShaderModule, stage: vk::ShaderStageFlags, entry_point: &str) -> Result<Self> {
        let entry_point = CString::new(entry_point)
            .map_err(|_| FrameGraphError::InvalidEntryPoint(entry_point.to_string()))?;
        Ok(Self {
            module,
            stage,
            entry_point,
        })
    }

    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }
}

/// SPIR-V writer options. WGSL clip space is y-up, so the vertex position output is
/// flipped into Vulkan's y-down framebuffer space.
fn spirv_options() -> naga::back::spv::Options<'static> {
    let mut options = naga::back::spv::Options::default();
    options.flags |= naga::back::spv::WriterFlags::ADJUST_COORDINATE_SPACE;
    options
}

/// Compiles WGSL source to SPIR-V words for a single entry point. Vertex shaders flip
/// the output y coordinate, so WGSL positions are y-up.
pub fn compile_wgsl(source: &str, stage: naga::ShaderStage, entry_point: &str) -> Result<Vec<u32>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| FrameGraphError::ShaderCompilation(format!("WGSL parse error: {e}")))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| FrameGraphError::ShaderCompilation(format!("Validation error: {e}")))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == stage)
    {
        return Err(FrameGraphError::ShaderCompilation(format!(
            "Entry point '{entry_point}' not found for stage {stage:?}"
        )));
    }

    let options = spirv_options();
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_string(),
    };

    naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| FrameGraphError::ShaderCompilation(format!("SPIR-V generation error: {e}")))
}
