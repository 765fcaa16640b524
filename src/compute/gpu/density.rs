//! GPU density stage

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::compute::gpu::context::{GpuContext, WORKGROUP_SIZE};
use crate::compute::gpu::readback::Readback;
use crate::compute::request::{ComputeTask, PendingRequest};
use crate::compute::DensityStage;
use crate::config::{MapConfig, NoiseParams};
use crate::core::{Error, Result};
use crate::density::DensityField;
use crate::math::GridPos;

/// Uniform block of `shaders/density.wgsl`
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DensityParams {
    /// Integer sample offset `pos * (points - 1)`; `w` unused
    pub offset: [i32; 4],
    pub points: u32,
    pub octaves: u32,
    pub seed: u32,
    pub _pad0: u32,
    pub amplitude: f32,
    pub frequency: f32,
    pub lacunarity: f32,
    pub persistence: f32,
    pub ground_offset: f32,
    pub scale: f32,
    pub step: f32,
    pub _pad1: f32,
}

impl DensityParams {
    pub fn new(noise: &NoiseParams, pos: GridPos, points: u32, step: f32) -> Self {
        let offset = pos * (points as i32 - 1);
        Self {
            offset: [offset.x, offset.y, offset.z, 0],
            points,
            octaves: noise.octaves,
            seed: noise.seed,
            _pad0: 0,
            amplitude: noise.amplitude,
            frequency: noise.frequency,
            lacunarity: noise.lacunarity,
            persistence: noise.persistence,
            ground_offset: noise.ground_offset,
            scale: noise.scale,
            step,
            _pad1: 0.0,
        }
    }
}

/// Fractal noise density on the GPU
pub struct GpuDensityStage {
    gpu: Arc<GpuContext>,
    map: MapConfig,
    noise: NoiseParams,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuDensityStage {
    pub fn new(gpu: Arc<GpuContext>, map: MapConfig, noise: NoiseParams) -> Result<Self> {
        if map.threads_per_group != WORKGROUP_SIZE {
            return Err(Error::Config(format!(
                "GPU backend requires threads_per_group = {WORKGROUP_SIZE}, got {}",
                map.threads_per_group
            )));
        }
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("density_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/density.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("density_layout"),
            entries: &[
                // Params
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Output samples
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("density_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("density_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        log::info!("GPU density stage: {} LODs, seed {}", map.lod_count(), noise.seed);

        Ok(Self {
            gpu,
            map,
            noise,
            pipeline,
            bind_group_layout,
        })
    }
}

impl DensityStage for GpuDensityStage {
    fn name(&self) -> &'static str {
        "gpu-density"
    }

    fn submit(&mut self, pos: GridPos, lod: usize) -> Result<PendingRequest<DensityField>> {
        let points = self.map.points_per_axis(lod)?;
        let groups = self.map.thread_groups(lod)?;
        let step = self.map.sample_step(lod)?;
        let device = &self.gpu.device;
        let byte_size = (points as u64).pow(3) * std::mem::size_of::<f32>() as u64;

        let params = DensityParams::new(&self.noise, pos, points, step);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("density_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let samples = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("density_samples"),
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = Readback::staging(device, "density_staging", byte_size);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("density_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: samples.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("density_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("density_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
        }
        encoder.copy_buffer_to_buffer(&samples, 0, &staging, 0, byte_size);
        self.gpu.queue.submit(Some(encoder.finish()));

        log::trace!("gpu density submit {:?} lod {} ({} groups)", pos, lod, groups);

        // Params and sample buffers drop here; wgpu keeps them alive until the
        // submission retires.
        let task = GpuDensityTask {
            gpu: Arc::clone(&self.gpu),
            points,
            readback: Some(Readback::map(staging)),
        };
        Ok(PendingRequest::new(pos, lod, Box::new(task)))
    }
}

struct GpuDensityTask {
    gpu: Arc<GpuContext>,
    points: u32,
    readback: Option<Readback>,
}

impl ComputeTask<DensityField> for GpuDensityTask {
    fn poll(&mut self) -> bool {
        self.gpu.poll();
        self.readback.as_mut().is_none_or(|r| r.poll())
    }

    fn consume(mut self: Box<Self>) -> Result<DensityField> {
        let readback = self
            .readback
            .take()
            .ok_or_else(|| Error::Gpu("density readback already consumed".into()))?;
        let samples = readback.read::<f32>(None)?;
        DensityField::new(self.points, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_params_match_uniform_layout() {
        assert_eq!(size_of::<DensityParams>(), 64);
        assert_eq!(offset_of!(DensityParams, points), 16);
        assert_eq!(offset_of!(DensityParams, amplitude), 32);
        assert_eq!(offset_of!(DensityParams, step), 56);
    }

    #[test]
    fn test_params_offset_shares_borders() {
        let params = DensityParams::new(&NoiseParams::default(), GridPos::new(1, -1, 2), 8, 32.0 / 7.0);
        assert_eq!(params.offset, [7, -7, 14, 0]);
        assert_eq!(params.points, 8);
    }
}
