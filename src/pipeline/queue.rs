//! FIFO of in-flight requests for one stage

use std::collections::VecDeque;

use crate::compute::{Completed, PendingRequest};

/// In-flight requests of one stage, consumed strictly in submission order.
///
/// Only the head is ever polled: a request that finishes early waits behind
/// slower ones submitted before it.
pub struct StageQueue<T> {
    name: &'static str,
    requests: VecDeque<PendingRequest<T>>,
}

impl<T> StageQueue<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            requests: VecDeque::new(),
        }
    }

    pub fn push(&mut self, request: PendingRequest<T>) {
        self.requests.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Poll the head request. Never looks past it.
    pub fn has_completed_head(&mut self) -> bool {
        self.requests.front_mut().is_some_and(|r| r.poll())
    }

    /// Pop and consume the head if it has completed
    pub fn drain_head(&mut self) -> Option<Completed<T>> {
        if !self.has_completed_head() {
            return None;
        }
        let request = self.requests.pop_front()?;
        let (pos, lod, generation) = (request.pos(), request.lod(), request.generation());
        Some(request.consume().unwrap_or_else(|e| Completed {
            pos,
            lod,
            generation,
            input: None,
            result: Err(e),
        }))
    }

    /// Drop every in-flight request. Returns how many were dropped.
    pub fn clear_all(&mut self) -> usize {
        let dropped = self.requests.len();
        self.requests.clear();
        if dropped > 0 {
            log::debug!("{}: dropped {} in-flight requests", self.name, dropped);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeTask;
    use crate::core::Result;
    use crate::math::GridPos;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Manual {
        done: Arc<AtomicBool>,
        value: u32,
    }

    impl ComputeTask<u32> for Manual {
        fn poll(&mut self) -> bool {
            self.done.load(Ordering::Acquire)
        }

        fn consume(self: Box<Self>) -> Result<u32> {
            Ok(self.value)
        }
    }

    fn request(x: i32, value: u32) -> (PendingRequest<u32>, Arc<AtomicBool>) {
        let done = Arc::new(AtomicBool::new(false));
        let task = Manual {
            done: done.clone(),
            value,
        };
        (PendingRequest::new(GridPos::new(x, 0, 0), 0, Box::new(task)), done)
    }

    #[test]
    fn test_head_only_ordering() {
        let mut queue = StageQueue::new("test");
        let (a, a_done) = request(0, 10);
        let (b, b_done) = request(1, 20);
        queue.push(a);
        queue.push(b);

        // B finishes first but A is the head
        b_done.store(true, Ordering::Release);
        assert!(!queue.has_completed_head());
        assert!(queue.drain_head().is_none());
        assert_eq!(queue.len(), 2);

        a_done.store(true, Ordering::Release);
        let first = queue.drain_head().unwrap();
        assert_eq!(first.pos, GridPos::new(0, 0, 0));
        assert_eq!(first.result.unwrap(), 10);
        let second = queue.drain_head().unwrap();
        assert_eq!(second.result.unwrap(), 20);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_all() {
        let mut queue = StageQueue::new("test");
        for i in 0..4 {
            queue.push(request(i, 0).0);
        }
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.clear_all(), 4);
        assert!(queue.is_empty());
        assert!(!queue.has_completed_head());
    }
}
