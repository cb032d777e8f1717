use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::trace;

use crate::buffer::BufferAccumulator;
use crate::throttle::Throttle;

/// Releases accumulated bytes to the consumer one chunk at a time.
///
/// Owns the delivery cursor: `chunk_start` only moves forward, and only when a
/// non-empty chunk is released.
#[derive(Debug)]
pub struct ChunkPacer {
    chunk_size: usize,
    chunk_start: usize,
    throttle: Throttle,
}

impl ChunkPacer {
    pub fn new(chunk_size: usize, interval: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_start: 0,
            throttle: Throttle::new(interval),
        }
    }

    /// Bytes already handed to the consumer
    pub fn chunk_start(&self) -> usize {
        self.chunk_start
    }

    /// Rate-limited release request. Returns a chunk when the throttle lets
    /// the request run and there is something new to deliver.
    pub fn trigger(&mut self, buffer: &BufferAccumulator, now: Instant) -> Option<Bytes> {
        if self.throttle.request(now) {
            self.release(buffer)
        } else {
            trace!(chunk_start = self.chunk_start, "Chunk release coalesced");
            None
        }
    }

    /// When a coalesced release becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    /// Runs the coalesced release if it is due.
    pub fn fire(&mut self, buffer: &BufferAccumulator, now: Instant) -> Option<Bytes> {
        if self.throttle.fire(now) {
            self.release(buffer)
        } else {
            None
        }
    }

    /// Releases `[chunk_start, min(chunk_start + chunk_size, len))`, bypassing
    /// the throttle.
    pub fn release(&mut self, buffer: &BufferAccumulator) -> Option<Bytes> {
        let chunk_end = self
            .chunk_start
            .saturating_add(self.chunk_size)
            .min(buffer.len());
        if chunk_end <= self.chunk_start {
            return None;
        }

        let chunk = buffer.extract(self.chunk_start, chunk_end);
        trace!(
            chunk_start = self.chunk_start,
            chunk_end,
            "Releasing chunk"
        );
        self.chunk_start = chunk_end;
        Some(chunk)
    }

    /// Everything accumulated so far has been delivered.
    pub fn is_drained(&self, buffer: &BufferAccumulator) -> bool {
        self.chunk_start >= buffer.len()
    }

    pub fn cancel_pending(&mut self) {
        self.throttle.cancel();
    }
}
