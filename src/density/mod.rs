//! Density fields and the CPU noise kernel that fills them

pub mod field;
pub mod noise;

pub use field::DensityField;
pub use noise::DensityKernel;
