//! Poll/consume handles for in-flight compute work

use std::sync::Arc;

use crate::core::{Error, Result};
use crate::density::DensityField;
use crate::math::GridPos;

/// Opaque in-flight computation producing a `T`.
///
/// Dropping a task releases whatever it holds (device buffers, channels).
/// Results of a dropped task are never observed.
pub trait ComputeTask<T>: Send {
    /// Non-blocking completion check. Once true, stays true.
    fn poll(&mut self) -> bool;

    /// Take the result. Only valid after `poll` returned true.
    fn consume(self: Box<Self>) -> Result<T>;
}

/// Lifecycle of a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Completed,
}

/// A chunk computation queued in one pipeline stage.
pub struct PendingRequest<T> {
    pos: GridPos,
    lod: usize,
    generation: u64,
    state: RequestState,
    /// Density the request was built from (surface stage only)
    input: Option<Arc<DensityField>>,
    task: Box<dyn ComputeTask<T>>,
}

impl<T> PendingRequest<T> {
    pub fn new(pos: GridPos, lod: usize, task: Box<dyn ComputeTask<T>>) -> Self {
        Self {
            pos,
            lod,
            generation: 0,
            state: RequestState::Pending,
            input: None,
            task,
        }
    }

    /// Tag the request with the chunk generation it was issued for
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_input(mut self, input: Arc<DensityField>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn pos(&self) -> GridPos {
        self.pos
    }

    pub fn lod(&self) -> usize {
        self.lod
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn input(&self) -> Option<&Arc<DensityField>> {
        self.input.as_ref()
    }

    /// Non-blocking. Returns true once the result is ready.
    pub fn poll(&mut self) -> bool {
        if self.state == RequestState::Pending && self.task.poll() {
            self.state = RequestState::Completed;
        }
        self.state == RequestState::Completed
    }

    /// Consume the request, returning its result.
    ///
    /// Fails with [`Error::StaleConsume`] when the request has not been
    /// observed complete by [`poll`](Self::poll).
    pub fn consume(self) -> Result<Completed<T>> {
        if self.state != RequestState::Completed {
            return Err(Error::StaleConsume(self.pos));
        }
        Ok(Completed {
            pos: self.pos,
            lod: self.lod,
            generation: self.generation,
            input: self.input,
            result: self.task.consume(),
        })
    }
}

impl<T> std::fmt::Debug for PendingRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("pos", &self.pos)
            .field("lod", &self.lod)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

/// A consumed request. `result` holds the backend error if the computation failed.
#[derive(Debug)]
pub struct Completed<T> {
    pub pos: GridPos,
    pub lod: usize,
    pub generation: u64,
    pub input: Option<Arc<DensityField>>,
    pub result: Result<T>,
}

/// Task that is already finished; used for immediate results and failures.
pub struct ReadyTask<T> {
    result: Option<Result<T>>,
}

impl<T> ReadyTask<T> {
    pub fn new(result: Result<T>) -> Self {
        Self { result: Some(result) }
    }
}

impl<T: Send> ComputeTask<T> for ReadyTask<T> {
    fn poll(&mut self) -> bool {
        true
    }

    fn consume(mut self: Box<Self>) -> Result<T> {
        self.result
            .take()
            .unwrap_or_else(|| Err(Error::Compute("result already taken".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Gate {
        open: Arc<AtomicBool>,
    }

    impl ComputeTask<u32> for Gate {
        fn poll(&mut self) -> bool {
            self.open.load(Ordering::Acquire)
        }

        fn consume(self: Box<Self>) -> Result<u32> {
            Ok(7)
        }
    }

    #[test]
    fn test_consume_before_poll_is_stale() {
        let open = Arc::new(AtomicBool::new(true));
        let req = PendingRequest::new(GridPos::new(1, 2, 3), 0, Box::new(Gate { open }));
        assert!(matches!(req.consume(), Err(Error::StaleConsume(p)) if p == GridPos::new(1, 2, 3)));
    }

    #[test]
    fn test_poll_then_consume() {
        let open = Arc::new(AtomicBool::new(false));
        let mut req = PendingRequest::new(GridPos::ZERO, 1, Box::new(Gate { open: open.clone() }))
            .with_generation(4);
        assert!(!req.poll());
        assert_eq!(req.state(), RequestState::Pending);

        open.store(true, Ordering::Release);
        assert!(req.poll());
        let done = req.consume().unwrap();
        assert_eq!(done.lod, 1);
        assert_eq!(done.generation, 4);
        assert_eq!(done.result.unwrap(), 7);
    }

    #[test]
    fn test_ready_task() {
        let mut req = PendingRequest::new(GridPos::ZERO, 0, Box::new(ReadyTask::new(Ok(3u32))));
        assert!(req.poll());
        assert_eq!(req.consume().unwrap().result.unwrap(), 3);
    }
}
