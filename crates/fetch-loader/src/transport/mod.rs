//! # Transports
//!
//! A transport pulls raw bytes from the source. Two implementations exist:
//!
//! - [`StreamingTransport`] keeps one request open and reads its body
//!   incrementally.
//! - [`RangedTransport`] emulates incremental delivery with a sequence of
//!   bounded `Range` requests, each fetched in full.
//!
//! The loader picks one at construction and runs it with [`drive`] in a task
//! of its own, so an in-flight read survives the controller waking up for
//! clock ticks or timers.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::LoaderError;

mod ranged;
mod streaming;

#[cfg(test)]
pub(crate) mod scripted;

pub use ranged::{RangeCursor, RangedTransport};
pub use streaming::StreamingTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Streaming,
    Ranged,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Ranged => "ranged",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull-based byte source.
///
/// `read` yields `Ok(None)` once the source is exhausted. After an error or
/// [`cancel`](Transport::cancel) the transport must not be read again.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Issues the opening request (the body request or the length probe).
    async fn open(&mut self) -> Result<(), LoaderError>;

    async fn read(&mut self) -> Result<Option<Bytes>, LoaderError>;

    /// Closes the underlying reader.
    fn cancel(&mut self);
}

pub type BoxTransport = Box<dyn Transport>;

/// What the transport task reports to the controller
#[derive(Debug)]
pub enum TransportEvent {
    Started,
    Chunk(Bytes),
    Exhausted,
    Failed(LoaderError),
}

/// Runs `transport` to completion, forwarding every step to `tx`.
///
/// A streaming transport announces itself before its request goes out; a
/// ranged one only after the length probe succeeded. Cancellation drops any
/// in-flight request and closes the reader.
pub async fn drive(
    mut transport: BoxTransport,
    tx: mpsc::Sender<TransportEvent>,
    token: CancellationToken,
) {
    let kind = transport.kind();

    if kind == TransportKind::Streaming && !forward(&tx, TransportEvent::Started, &token).await {
        transport.cancel();
        return;
    }

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = transport.open() => Some(result),
    };
    match opened {
        None => {
            debug!(transport = %kind, "Transport cancelled while opening");
            transport.cancel();
            return;
        }
        Some(Err(err)) => {
            transport.cancel();
            forward(&tx, TransportEvent::Failed(err), &token).await;
            return;
        }
        Some(Ok(())) => {}
    }

    if kind == TransportKind::Ranged && !forward(&tx, TransportEvent::Started, &token).await {
        transport.cancel();
        return;
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = transport.read() => Some(result),
        };

        let event = match next {
            None => {
                debug!(transport = %kind, "Transport cancelled, closing reader");
                transport.cancel();
                return;
            }
            Some(Ok(Some(chunk))) => TransportEvent::Chunk(chunk),
            Some(Ok(None)) => {
                forward(&tx, TransportEvent::Exhausted, &token).await;
                return;
            }
            Some(Err(err)) => {
                transport.cancel();
                forward(&tx, TransportEvent::Failed(err), &token).await;
                return;
            }
        };

        if !forward(&tx, event, &token).await {
            transport.cancel();
            return;
        }
    }
}

/// Returns false when the controller is gone or the load was cancelled.
async fn forward(
    tx: &mpsc::Sender<TransportEvent>,
    event: TransportEvent,
    token: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}
