use anyhow::{Context, Result};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use std::path::Path;

use crate::error::{ShaderBuildError, ShaderStage};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

const QUAD_WGSL: &str = include_str!("../../shaders/quad.wgsl");
const VISUAL_WGSL: &str = include_str!("../../shaders/visual.wgsl");

/// Vertex and fragment WGSL sources for the quad program.
#[derive(Clone, Debug)]
pub struct ShaderProgram {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderProgram {
    pub fn embedded() -> Self {
        Self {
            vertex: QUAD_WGSL.to_string(),
            fragment: VISUAL_WGSL.to_string(),
        }
    }

    pub fn with_fragment(fragment: impl Into<String>) -> Self {
        Self {
            vertex: QUAD_WGSL.to_string(),
            fragment: fragment.into(),
        }
    }

    pub fn from_fragment_file(path: &Path) -> Result<Self> {
        let fragment = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read shader: {}", path.display()))?;
        log::info!("Using fragment shader {}", path.display());
        Ok(Self::with_fragment(fragment))
    }

    /// Parse and validate both stages on the CPU. This is the compile step;
    /// linking happens when the GPU pipeline is created.
    pub fn validate(&self) -> Result<(), ShaderBuildError> {
        validate_stage(ShaderStage::Vertex, &self.vertex, VERTEX_ENTRY)?;
        validate_stage(ShaderStage::Fragment, &self.fragment, FRAGMENT_ENTRY)?;
        Ok(())
    }
}

fn validate_stage(stage: ShaderStage, source: &str, entry: &str) -> Result<(), ShaderBuildError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderBuildError::Compile {
        stage,
        message: e.emit_to_string(source),
    })?;

    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| ShaderBuildError::Compile {
            stage,
            message: e.as_inner().to_string(),
        })?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    if !module
        .entry_points
        .iter()
        .any(|ep| ep.stage == naga_stage && ep.name == entry)
    {
        return Err(ShaderBuildError::Compile {
            stage,
            message: format!("missing entry point `{}`", entry),
        });
    }
    Ok(())
}
