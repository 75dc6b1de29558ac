use super::frame::FrameTarget;
use super::gpu::GpuContext;
use super::pipeline::{FrameUniforms, QuadPipeline};
use super::shader::ShaderProgram;
use crate::error::{FrameError, ShaderBuildError};

/// What the render loop needs from a graphics API: build the program once,
/// then draw one frame per call.
pub trait ShadingBackend {
    fn build(&mut self, program: &ShaderProgram) -> Result<(), ShaderBuildError>;
    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<(), FrameError>;
    fn resize(&mut self, _width: u32, _height: u32) {}
}

pub struct WgpuBackend {
    gpu: GpuContext,
    target: FrameTarget,
    pipeline: Option<QuadPipeline>,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext, target: FrameTarget) -> Self {
        Self {
            gpu,
            target,
            pipeline: None,
        }
    }
}

impl ShadingBackend for WgpuBackend {
    fn build(&mut self, program: &ShaderProgram) -> Result<(), ShaderBuildError> {
        self.pipeline = None;
        let pipeline = QuadPipeline::new(&self.gpu.device, program, self.target.format())?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<(), FrameError> {
        let pipeline = self.pipeline.as_ref().ok_or(FrameError::NoPipeline)?;
        self.target.draw(&self.gpu, pipeline, uniforms)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.target.resize(&self.gpu, width, height);
    }
}
