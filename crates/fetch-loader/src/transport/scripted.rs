//! In-memory transport replaying a fixed script, for controller tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{Transport, TransportKind};
use crate::LoaderError;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Chunk(Bytes),
    /// Sleep, then continue with the next step within the same read
    Delay(Duration),
    Fail(&'static str),
    /// Never completes
    Stall,
}

impl Step {
    pub(crate) fn bytes(len: usize, fill: u8) -> Self {
        Step::Chunk(Bytes::from(vec![fill; len]))
    }
}

/// Observes a [`ScriptedTransport`] after it was moved into the loader.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptProbe {
    reads: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl ScriptProbe {
    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedTransport {
    kind: TransportKind,
    steps: VecDeque<Step>,
    open_error: Option<&'static str>,
    closed: bool,
    probe: ScriptProbe,
}

impl ScriptedTransport {
    pub(crate) fn new(kind: TransportKind, steps: Vec<Step>) -> (Self, ScriptProbe) {
        let probe = ScriptProbe::default();
        let transport = Self {
            kind,
            steps: steps.into(),
            open_error: None,
            closed: false,
            probe: probe.clone(),
        };
        (transport, probe)
    }

    pub(crate) fn fail_open(mut self, reason: &'static str) -> Self {
        self.open_error = Some(reason);
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&mut self) -> Result<(), LoaderError> {
        match self.open_error {
            Some(reason) => Err(LoaderError::transport(reason)),
            None => Ok(()),
        }
    }

    async fn read(&mut self) -> Result<Option<Bytes>, LoaderError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(LoaderError::ReaderClosed);
        }

        loop {
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(Step::Chunk(bytes)) => return Ok(Some(bytes)),
                Some(Step::Delay(delay)) => tokio::time::sleep(delay).await,
                Some(Step::Fail(reason)) => {
                    self.closed = true;
                    return Err(LoaderError::transport(reason));
                }
                Some(Step::Stall) => std::future::pending::<()>().await,
            }
        }
    }

    fn cancel(&mut self) {
        self.closed = true;
        self.probe.cancelled.store(true, Ordering::SeqCst);
    }
}
