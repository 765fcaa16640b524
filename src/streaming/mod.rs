//! Chunk streaming around moving viewers

pub mod chunk;
pub mod controller;
pub mod pool;
pub mod store;
pub mod viewer;

pub use chunk::Chunk;
pub use controller::{RenderableFactory, StreamingController, StreamingStats};
pub use pool::{ChunkPool, NullRenderable, PoolSlot, RecordingRenderable, RenderState, RenderableHandle, SlotId};
pub use store::ChunkStore;
pub use viewer::{Viewer, ViewerId, ViewerState};
