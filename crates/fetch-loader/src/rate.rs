use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding-window throughput estimate.
///
/// Purely observational: recording a sample is O(1) amortized and never
/// influences delivery.
#[derive(Debug)]
pub struct RateMeter {
    window: Duration,
    started: Instant,
    samples: VecDeque<(Instant, u64)>,
    window_bytes: u64,
    total_bytes: u64,
}

impl RateMeter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            started: now,
            samples: VecDeque::new(),
            window_bytes: 0,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64, now: Instant) {
        self.samples.push_back((now, bytes));
        self.window_bytes += bytes;
        self.total_bytes += bytes;
        self.prune(now);
    }

    /// Bytes per second over the last window.
    ///
    /// Before a full window has elapsed the rate is taken over the time
    /// since the meter started, so an early burst is not diluted.
    pub fn rate(&mut self, now: Instant) -> f64 {
        self.prune(now);
        let span = now.saturating_duration_since(self.started).min(self.window);
        if span.is_zero() {
            return 0.0;
        }
        self.window_bytes as f64 / span.as_secs_f64()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.samples.front() {
            if now.saturating_duration_since(at) < self.window {
                break;
            }
            self.samples.pop_front();
            self.window_bytes -= bytes;
        }
    }
}
