//! GPU marching-cubes stage

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::compute::gpu::context::{GpuContext, WORKGROUP_SIZE};
use crate::compute::gpu::readback::Readback;
use crate::compute::request::{ComputeTask, PendingRequest};
use crate::compute::SurfaceStage;
use crate::config::{MapConfig, SurfaceParams};
use crate::core::{Error, Result};
use crate::density::DensityField;
use crate::math::GridPos;
use crate::surface::tables::{EDGE_TABLE, TRI_TABLE};
use crate::surface::{ChunkMesh, SurfaceExtractor, Triangle, triangle_capacity};

/// Uniform block of `shaders/marching_cubes.wgsl`
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MarchingParams {
    pub points: u32,
    pub capacity: u32,
    pub interpolate: u32,
    pub _pad0: u32,
    pub iso_value: f32,
    pub step: f32,
    pub _pad1: [f32; 2],
}

/// Marching cubes on the GPU with an append buffer and atomic triangle counter
pub struct GpuSurfaceStage {
    gpu: Arc<GpuContext>,
    map: MapConfig,
    params: SurfaceParams,
    /// Turns read-back triangles into colored meshes
    extractor: Arc<SurfaceExtractor>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    edge_table: wgpu::Buffer,
    tri_table: wgpu::Buffer,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuSurfaceStage {
    pub fn new(gpu: Arc<GpuContext>, map: MapConfig, params: &SurfaceParams) -> Result<Self> {
        if map.threads_per_group != WORKGROUP_SIZE {
            return Err(Error::Config(format!(
                "GPU backend requires threads_per_group = {WORKGROUP_SIZE}, got {}",
                map.threads_per_group
            )));
        }
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("marching_cubes_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../../shaders/marching_cubes.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("marching_cubes_layout"),
            entries: &[
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
                // Density samples
                storage_entry(1, true),
                // Edge table
                storage_entry(2, true),
                // Triangle table
                storage_entry(3, true),
                // Triangle append buffer
                storage_entry(4, false),
                // Atomic triangle counter
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("marching_cubes_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("marching_cubes_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let edges: Vec<u32> = EDGE_TABLE.iter().map(|&e| e as u32).collect();
        let edge_table = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mc_edge_table"),
            contents: bytemuck::cast_slice(&edges),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let tris: Vec<i32> = TRI_TABLE.iter().flatten().map(|&t| t as i32).collect();
        let tri_table = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mc_tri_table"),
            contents: bytemuck::cast_slice(&tris),
            usage: wgpu::BufferUsages::STORAGE,
        });

        log::info!(
            "GPU surface stage: iso {}, interpolate {}",
            params.iso_value,
            params.interpolate
        );

        Ok(Self {
            gpu,
            map,
            params: params.clone(),
            extractor: Arc::new(SurfaceExtractor::new(params)),
            pipeline,
            bind_group_layout,
            edge_table,
            tri_table,
        })
    }
}

impl SurfaceStage for GpuSurfaceStage {
    fn name(&self) -> &'static str {
        "gpu-surface"
    }

    fn map(&self) -> &MapConfig {
        &self.map
    }

    fn submit(&mut self, field: Arc<DensityField>, pos: GridPos, lod: usize) -> Result<PendingRequest<ChunkMesh>> {
        let points = self.map.points_per_axis(lod)?;
        if field.points() != points {
            return Err(Error::Compute(format!(
                "surface submit for {:?}: field has {} points per axis, LOD {lod} needs {points}",
                pos,
                field.points()
            )));
        }
        let groups = self.map.thread_groups(lod)?;
        let step = self.map.sample_step(lod)?;
        let capacity = triangle_capacity(points);
        let tri_bytes = (capacity * std::mem::size_of::<Triangle>()) as u64;
        let device = &self.gpu.device;

        let params = MarchingParams {
            points,
            capacity: capacity as u32,
            interpolate: self.params.interpolate as u32,
            _pad0: 0,
            iso_value: self.params.iso_value,
            step,
            _pad1: [0.0; 2],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mc_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let density = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mc_density"),
            contents: bytemuck::cast_slice(field.samples()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let triangles = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mc_triangles"),
            size: tri_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let counter = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mc_counter"),
            contents: bytemuck::bytes_of(&0u32),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let tri_staging = Readback::staging(device, "mc_triangles_staging", tri_bytes);
        let counter_staging = Readback::staging(device, "mc_counter_staging", std::mem::size_of::<u32>() as u64);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mc_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: density.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.edge_table.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.tri_table.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: counter.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mc_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("mc_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
        }
        encoder.copy_buffer_to_buffer(&counter, 0, &counter_staging, 0, std::mem::size_of::<u32>() as u64);
        encoder.copy_buffer_to_buffer(&triangles, 0, &tri_staging, 0, tri_bytes);
        self.gpu.queue.submit(Some(encoder.finish()));

        log::trace!("gpu surface submit {:?} lod {} (capacity {})", pos, lod, capacity);

        let task = GpuSurfaceTask {
            gpu: Arc::clone(&self.gpu),
            extractor: Arc::clone(&self.extractor),
            origin: pos.to_world(self.map.chunk_axis_size),
            capacity,
            counter: Some(Readback::map(counter_staging)),
            triangles: Some(Readback::map(tri_staging)),
        };
        Ok(PendingRequest::new(pos, lod, Box::new(task)).with_input(field))
    }
}

struct GpuSurfaceTask {
    gpu: Arc<GpuContext>,
    extractor: Arc<SurfaceExtractor>,
    origin: glam::Vec3,
    capacity: usize,
    counter: Option<Readback>,
    triangles: Option<Readback>,
}

impl ComputeTask<ChunkMesh> for GpuSurfaceTask {
    fn poll(&mut self) -> bool {
        self.gpu.poll();
        let counter = self.counter.as_mut().is_none_or(|r| r.poll());
        let triangles = self.triangles.as_mut().is_none_or(|r| r.poll());
        counter && triangles
    }

    fn consume(mut self: Box<Self>) -> Result<ChunkMesh> {
        let (Some(counter), Some(triangles)) = (self.counter.take(), self.triangles.take()) else {
            return Err(Error::Gpu("surface readback already consumed".into()));
        };
        let count = counter.read::<u32>(Some(1))?.first().copied().unwrap_or(0) as usize;
        if count > self.capacity {
            log::warn!("triangle counter {} exceeds capacity {}, truncating", count, self.capacity);
        }
        let count = count.min(self.capacity);
        let tris = triangles.read::<Triangle>(Some(count))?;
        Ok(self.extractor.build_mesh(&tris, count, self.origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_params_match_uniform_layout() {
        assert_eq!(size_of::<MarchingParams>(), 32);
        assert_eq!(offset_of!(MarchingParams, iso_value), 16);
        assert_eq!(offset_of!(MarchingParams, step), 20);
    }

    #[test]
    fn test_triangle_matches_storage_stride() {
        // array<Triangle> of three vec4<f32>
        assert_eq!(size_of::<Triangle>(), 48);
    }
}
