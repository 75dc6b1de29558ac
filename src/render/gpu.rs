use std::sync::Arc;
use winit::window::Window;

use crate::error::DeviceUnavailableError;

pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Offscreen device for the headless host.
    pub fn headless() -> Result<Self, DeviceUnavailableError> {
        let instance = create_instance();
        pollster::block_on(Self::init_async(&instance, None))
    }

    /// Device plus a presentable surface for `window`.
    pub fn for_window(
        window: Arc<Window>,
    ) -> Result<(Self, wgpu::Surface<'static>), DeviceUnavailableError> {
        let instance = create_instance();
        let surface = instance
            .create_surface(window)
            .map_err(|e| DeviceUnavailableError::Surface(e.to_string()))?;
        let gpu = pollster::block_on(Self::init_async(&instance, Some(&surface)))?;
        Ok((gpu, surface))
    }

    async fn init_async(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'static>>,
    ) -> Result<Self, DeviceUnavailableError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(DeviceUnavailableError::Adapter)?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sonica_live_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| DeviceUnavailableError::Device(e.to_string()))?;

        Ok(Self { adapter, device, queue })
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::DX12,
        ..Default::default()
    })
}
