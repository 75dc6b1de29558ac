use super::gpu::GpuContext;
use super::pipeline::{FrameUniforms, QuadPipeline, QUAD_VERTICES};
use crate::error::{DeviceUnavailableError, FrameError};

pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Where frames go: a window surface, or a texture nobody presents.
pub enum FrameTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

impl FrameTarget {
    pub fn surface(
        gpu: &GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, DeviceUnavailableError> {
        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| DeviceUnavailableError::Surface("surface is not supported by the adapter".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        log::info!("Surface configured: {}x{} {:?}", config.width, config.height, format);

        Ok(Self::Surface { surface, config })
    }

    pub fn offscreen(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self::Offscreen { texture, view }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Surface { config, .. } => config.format,
            Self::Offscreen { texture, .. } => texture.format(),
        }
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        match self {
            Self::Surface { surface, config } => {
                if width == 0 || height == 0 {
                    return;
                }
                config.width = width;
                config.height = height;
                surface.configure(&gpu.device, config);
            }
            Self::Offscreen { .. } => {
                *self = Self::offscreen(gpu, width, height);
            }
        }
    }

    /// Clear, draw the quad with `uniforms`, and present.
    pub fn draw(
        &mut self,
        gpu: &GpuContext,
        pipeline: &QuadPipeline,
        uniforms: &FrameUniforms,
    ) -> Result<(), FrameError> {
        gpu.queue
            .write_buffer(&pipeline.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        match self {
            Self::Surface { surface, config } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                        surface.configure(&gpu.device, config);
                        return Err(FrameError::SurfaceLost);
                    }
                    Err(wgpu::SurfaceError::Timeout) => return Err(FrameError::Timeout),
                    Err(wgpu::SurfaceError::OutOfMemory) => return Err(FrameError::OutOfMemory),
                    Err(e) => return Err(FrameError::Other(e.to_string())),
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                gpu.queue.submit(std::iter::once(encode_quad(gpu, &view, pipeline)));
                frame.present();
            }
            Self::Offscreen { view, .. } => {
                gpu.queue.submit(std::iter::once(encode_quad(gpu, view, pipeline)));
            }
        }
        Ok(())
    }
}

fn encode_quad(gpu: &GpuContext, view: &wgpu::TextureView, pipeline: &QuadPipeline) -> wgpu::CommandBuffer {
    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("frame_encoder"),
    });

    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&pipeline.pipeline);
        render_pass.set_bind_group(0, &pipeline.bind_group, &[]);
        render_pass.set_vertex_buffer(0, pipeline.vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
    }

    encoder.finish()
}
