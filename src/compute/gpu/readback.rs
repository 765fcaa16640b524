//! Staging buffers mapped back to the CPU

use std::sync::mpsc::{self, Receiver, TryRecvError};

use bytemuck::Pod;

use crate::core::error::Error;

/// A MAP_READ staging buffer with an in-flight `map_async`.
///
/// The map callback only sends on a channel; completion is observed with
/// [`poll`](Self::poll). Dropping the readback unmaps and frees the buffer.
pub struct Readback {
    buffer: wgpu::Buffer,
    rx: Receiver<Result<(), wgpu::BufferAsyncError>>,
    state: Option<Result<(), Error>>,
}

impl Readback {
    /// Create a staging buffer of `size` bytes
    pub fn staging(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Request the mapping. Call after the copy into `buffer` was submitted.
    pub fn map(buffer: wgpu::Buffer) -> Self {
        let (tx, rx) = mpsc::channel();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        Self {
            buffer,
            rx,
            state: None,
        }
    }

    /// Non-blocking; true once the map callback fired
    pub fn poll(&mut self) -> bool {
        if self.state.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.state = Some(result.map_err(|e| Error::Gpu(format!("buffer map failed: {e}"))));
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.state = Some(Err(Error::Gpu("buffer map callback dropped".into())));
                true
            }
        }
    }

    /// Copy out the first `count` elements (or the whole buffer) and unmap
    pub fn read<T: Pod>(mut self, count: Option<usize>) -> Result<Vec<T>, Error> {
        match self.state.take() {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e),
            None => return Err(Error::Gpu("readback consumed before mapping".into())),
        }
        let elem = std::mem::size_of::<T>() as u64;
        let capacity = self.buffer.size() / elem;
        let count = count.map_or(capacity, |c| (c as u64).min(capacity));
        if count == 0 {
            self.buffer.unmap();
            return Ok(Vec::new());
        }
        let values = {
            // Mapped ranges are aligned to MAP_ALIGNMENT, enough for any Pod here
            let data = self.buffer.slice(..count * elem).get_mapped_range();
            bytemuck::cast_slice::<u8, T>(&data).to_vec()
        };
        self.buffer.unmap();
        Ok(values)
    }
}
