use bytes::Bytes;

use crate::LoaderError;

/// Everything the loader reports to its consumer.
#[derive(Debug)]
pub enum LoaderEvent {
    /// The transport began delivering, fired once
    StreamStart,
    /// Next contiguous slice of the source
    Streaming(Bytes),
    /// Natural end of a streaming transport, fired once
    StreamEnd,
    /// Terminal failure. Nothing follows it.
    StreamError(LoaderError),
    /// Current throughput in bytes per second
    StreamRate(f64),
}

impl LoaderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamStart => "streamStart",
            Self::Streaming(_) => "streaming",
            Self::StreamEnd => "streamEnd",
            Self::StreamError(_) => "streamError",
            Self::StreamRate(_) => "streamRate",
        }
    }

    pub fn is_rate(&self) -> bool {
        matches!(self, Self::StreamRate(_))
    }
}

/// Inbound playback clock notification, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTick {
    pub current_time: f64,
    /// Playable duration already buffered by the player
    pub loaded: f64,
}

impl PlaybackTick {
    pub fn new(current_time: f64, loaded: f64) -> Self {
        Self {
            current_time,
            loaded,
        }
    }

    /// Buffered playback ahead of the playhead
    pub fn buffered_ahead(&self) -> f64 {
        self.loaded - self.current_time
    }
}
