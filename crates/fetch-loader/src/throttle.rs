use std::time::Duration;

use tokio::time::Instant;

/// Coalescing rate limiter: at most one run per interval.
///
/// A request while idle runs immediately (leading edge). Requests arriving
/// before the interval has passed collapse into a single pending run that
/// becomes due at `last_run + interval` (trailing edge). The caller owns the
/// timer: it sleeps until [`deadline`](Self::deadline) and then calls
/// [`fire`](Self::fire).
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            pending: false,
        }
    }

    /// Returns true when the caller should run now.
    pub fn request(&mut self, now: Instant) -> bool {
        match self.last_run {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.mark_run(now);
                true
            }
        }
    }

    /// When the pending trailing run is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_run.map(|last| last + self.interval)
    }

    /// Consumes the pending run if it is due.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(due) if now >= due => {
                self.mark_run(now);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = false;
    }

    fn mark_run(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.pending = false;
    }
}
