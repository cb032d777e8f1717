use bytes::{Bytes, BytesMut};

/// Growing byte buffer of an on-demand source.
///
/// Appends go to the tail only. Extracted ranges are detached copies, so
/// later appends (and the reallocation they may cause) never change a chunk
/// that was already handed to the consumer.
#[derive(Debug, Default)]
pub struct BufferAccumulator {
    data: BytesMut,
    released: bool,
}

impl BufferAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns the new length. No-op once released.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        if !self.released {
            self.data.extend_from_slice(bytes);
        }
        self.data.len()
    }

    /// Copy of `[start, end)`, with `end` clamped to the current length.
    /// Empty when the clamped range is empty.
    pub fn extract(&self, start: usize, end: usize) -> Bytes {
        let end = end.min(self.data.len());
        if start >= end {
            return Bytes::new();
        }
        Bytes::copy_from_slice(&self.data[start..end])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frees the backing allocation; later appends are ignored.
    pub fn release(&mut self) {
        self.data = BytesMut::new();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}
