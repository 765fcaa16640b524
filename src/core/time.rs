//! Tick timing utilities

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Tick duration statistics over a rolling window, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TickWindow {
    pub avg_ms: f32,
    pub min_ms: f32,
    pub max_ms: f32,
    pub samples: usize,
}

/// Measures how long each streaming tick takes
pub struct TickTimer {
    started: Option<Instant>,
    tick_count: u64,
    total: Duration,
    window: Duration,
    /// (end timestamp, duration) of recent ticks
    history: VecDeque<(Instant, Duration)>,
}

impl TickTimer {
    /// Timer keeping `window` worth of history for [`TickTimer::stats`]
    pub fn new(window: Duration) -> Self {
        Self {
            started: None,
            tick_count: 0,
            total: Duration::ZERO,
            window,
            history: VecDeque::new(),
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the tick opened by [`TickTimer::begin`]. Returns its duration.
    pub fn end(&mut self) -> Duration {
        let Some(started) = self.started.take() else {
            return Duration::ZERO;
        };
        let now = Instant::now();
        let elapsed = now - started;
        self.record_at(now, elapsed);
        elapsed
    }

    fn record_at(&mut self, now: Instant, elapsed: Duration) {
        self.tick_count += 1;
        self.total += elapsed;
        self.history.push_back((now, elapsed));

        while let Some(&(timestamp, _)) = self.history.front() {
            if now.duration_since(timestamp) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Mean tick duration since creation
    pub fn mean(&self) -> Duration {
        if self.tick_count == 0 {
            Duration::ZERO
        } else {
            self.total / self.tick_count as u32
        }
    }

    /// Stats over the rolling window
    pub fn stats(&self) -> TickWindow {
        if self.history.is_empty() {
            return TickWindow::default();
        }
        let mut sum = 0.0;
        let mut min = f32::MAX;
        let mut max = 0.0f32;
        for (_, d) in &self.history {
            let ms = d.as_secs_f32() * 1000.0;
            sum += ms;
            min = min.min(ms);
            max = max.max(ms);
        }
        TickWindow {
            avg_ms: sum / self.history.len() as f32,
            min_ms: min,
            max_ms: max,
            samples: self.history.len(),
        }
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_stats() {
        let mut timer = TickTimer::default();
        let now = Instant::now();
        timer.record_at(now, Duration::from_millis(2));
        timer.record_at(now, Duration::from_millis(6));
        let stats = timer.stats();
        assert_eq!(stats.samples, 2);
        assert!((stats.avg_ms - 4.0).abs() < 1e-3);
        assert!((stats.min_ms - 2.0).abs() < 1e-3);
        assert!((stats.max_ms - 6.0).abs() < 1e-3);
        assert_eq!(timer.mean(), Duration::from_millis(4));
    }

    #[test]
    fn test_old_ticks_pruned() {
        let mut timer = TickTimer::new(Duration::from_secs(1));
        let start = Instant::now();
        timer.record_at(start, Duration::from_millis(10));
        timer.record_at(start + Duration::from_secs(3), Duration::from_millis(1));
        assert_eq!(timer.stats().samples, 1);
        assert_eq!(timer.tick_count(), 2);
    }

    #[test]
    fn test_end_without_begin() {
        let mut timer = TickTimer::default();
        assert_eq!(timer.end(), Duration::ZERO);
        assert_eq!(timer.tick_count(), 0);
    }
}
