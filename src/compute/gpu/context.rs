//! Headless wgpu device for compute

use crate::core::error::Error;

/// Workgroup edge used by both compute shaders
pub const WORKGROUP_SIZE: u32 = 8;

/// GPU compute context (no surface)
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a headless context, blocking on adapter and device requests
    pub fn headless() -> Result<Self, Error> {
        pollster::block_on(Self::new())
    }

    pub async fn new() -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();
        let invocations = WORKGROUP_SIZE.pow(3);
        if adapter_limits.max_compute_invocations_per_workgroup < invocations {
            return Err(Error::Gpu(format!(
                "adapter supports {} invocations per workgroup, need {invocations}",
                adapter_limits.max_compute_invocations_per_workgroup
            )));
        }

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("voxterra_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits {
                max_compute_invocations_per_workgroup: invocations,
                max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                max_buffer_size: adapter_limits.max_buffer_size,
                ..Default::default()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: Default::default(),
        };

        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("GPU compute context: {} ({:?})", info.name, info.backend);
        log::info!(
            "GPU buffer limits: max_buffer_size={}MB, max_storage_binding={}MB",
            adapter_limits.max_buffer_size / 1024 / 1024,
            adapter_limits.max_storage_buffer_binding_size / 1024 / 1024
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Process finished GPU work without blocking
    pub fn poll(&self) {
        let _ = self.device.poll(wgpu::PollType::Poll);
    }
}
