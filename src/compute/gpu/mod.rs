//! wgpu compute backend

pub mod context;
pub mod density;
pub mod readback;
pub mod surface;

pub use context::GpuContext;
pub use density::GpuDensityStage;
pub use surface::GpuSurfaceStage;
