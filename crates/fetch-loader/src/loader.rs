//! # Loader controller
//!
//! [`FetchLoader::spawn`] picks a transport, starts it in its own task and
//! runs a controller task that owns every piece of mutable loader state: the
//! accumulated buffer, the delivery cursor, the pacer and the rate meter.
//! The controller multiplexes transport events, playback ticks, pacing
//! deadlines, rate reports and teardown in a single `select!` loop, so none of
//! those ever interleave mid-operation.
//!
//! Live sources forward every transport chunk as-is. On-demand sources
//! accumulate and release `chunk_size` slices when the first bytes arrive and
//! whenever the player reports that its buffer runs low.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use humansize::{BINARY, format_size};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use url::Url;

use crate::LoaderError;
use crate::buffer::BufferAccumulator;
use crate::client::{RequestPolicy, create_client};
use crate::config::{LoaderConfig, LoaderOptions};
use crate::events::{LoaderEvent, PlaybackTick};
use crate::pacer::ChunkPacer;
use crate::rate::RateMeter;
use crate::transport::{
    self, BoxTransport, RangedTransport, StreamingTransport, TransportEvent, TransportKind,
};

/// Receiving side of the loader's outbound events.
///
/// Closes once the loader reached a final state and has nothing more to say.
pub type LoaderEvents = mpsc::UnboundedReceiver<LoaderEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    StreamingActive,
    RangedActive,
    /// The transport ran out of data. On-demand loaders keep releasing
    /// buffered chunks in this state.
    Completed,
    Errored,
    Canceled,
}

impl LoaderState {
    fn active(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Streaming => Self::StreamingActive,
            TransportKind::Ranged => Self::RangedActive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::StreamingActive | Self::RangedActive)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::StreamingActive => "streaming",
            Self::RangedActive => "ranged",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final accounting of a loader run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSummary {
    pub state: LoaderState,
    pub bytes_received: u64,
    pub bytes_delivered: u64,
    /// Bytes still held by the loader, zero once the buffer was released
    pub buffered_bytes: u64,
}

#[derive(Debug)]
enum LoaderCommand {
    TimeUpdate(PlaybackTick),
}

pub struct FetchLoader;

impl FetchLoader {
    /// Builds the HTTP transport for `options` and starts loading.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        options: LoaderOptions,
        config: LoaderConfig,
    ) -> Result<(LoaderHandle, LoaderEvents), LoaderError> {
        let url = Url::parse(&options.url)
            .map_err(|e| LoaderError::invalid_url(&options.url, e.to_string()))?;
        let policy = RequestPolicy::from_options(&options)?;
        let client = create_client(&config.client)?;

        let transport: BoxTransport = if config.transport.use_streaming() {
            Box::new(StreamingTransport::new(client, url, policy))
        } else {
            debug!(url = %url, "Incremental reads unavailable, using range requests");
            Box::new(
                RangedTransport::new(client, url, policy, options.chunk_size())
                    .with_fallback_length(options.filesize)
                    .with_probe_range_end(config.probe_range_end)
                    .with_range_query_param(config.range_query_param),
            )
        };

        Ok(Self::spawn_with_transport(options, config, transport))
    }

    /// Starts loading through a caller-provided transport.
    pub fn spawn_with_transport(
        options: LoaderOptions,
        config: LoaderConfig,
        transport: BoxTransport,
    ) -> (LoaderHandle, LoaderEvents) {
        let kind = transport.kind();
        let token = CancellationToken::new();
        let transport_token = token.child_token();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::channel(config.transport_channel_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(LoaderState::Idle);

        let span = info_span!("loader", url = %options.url, transport = %kind, live = options.live);

        let transport_task = tokio::spawn(
            transport::drive(transport, transport_tx, transport_token.clone())
                .instrument(span.clone()),
        );

        let now = Instant::now();
        let session = LoaderSession {
            live: options.live,
            kind,
            low_buffer_threshold: config.low_buffer_threshold,
            buffer: BufferAccumulator::new(),
            pacer: ChunkPacer::new(
                usize::try_from(options.chunk_size()).unwrap_or(usize::MAX),
                config.pacing_interval,
            ),
            rate: RateMeter::new(config.rate_interval, now),
            rate_interval: config.rate_interval,
            events: events_tx,
            state: state_tx,
            bytes_delivered: 0,
            transport_done: false,
        };

        let task = tokio::spawn(
            session
                .run(
                    transport_rx,
                    commands_rx,
                    token.clone(),
                    transport_token,
                    transport_task,
                )
                .instrument(span),
        );

        let handle = LoaderHandle {
            commands: commands_tx,
            token,
            state: state_rx,
            transport: kind,
            task: Some(task),
        };
        (handle, events_rx)
    }
}

/// Control side of a running loader.
///
/// Dropping the handle tears the loader down.
pub struct LoaderHandle {
    commands: mpsc::UnboundedSender<LoaderCommand>,
    token: CancellationToken,
    state: watch::Receiver<LoaderState>,
    transport: TransportKind,
    task: Option<JoinHandle<LoaderSummary>>,
}

impl LoaderHandle {
    /// Forwards a playback clock notification. Returns false once the loader
    /// has stopped.
    pub fn time_update(&self, tick: PlaybackTick) -> bool {
        self.commands.send(LoaderCommand::TimeUpdate(tick)).is_ok()
    }

    /// Teardown: cancels the in-flight read and releases buffered bytes.
    pub fn destroy(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> LoaderState {
        *self.state.borrow()
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Waits until the loader state satisfies `predicate`.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(&LoaderState) -> bool,
    ) -> LoaderState {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| predicate(s)).await.map(|current| *current);
        // the loader task ended without satisfying the predicate
        reached.unwrap_or_else(|_| *state.borrow())
    }

    /// Waits for the loader task to finish.
    ///
    /// An on-demand loader only finishes once every byte was released, so
    /// keep feeding [`time_update`](Self::time_update) or call
    /// [`destroy`](Self::destroy) first.
    pub async fn join(mut self) -> Result<LoaderSummary, LoaderError> {
        let Some(task) = self.task.take() else {
            return Err(LoaderError::internal("loader task already joined"));
        };
        task.await
            .map_err(|e| LoaderError::internal(format!("loader task failed: {e}")))
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct LoaderSession {
    live: bool,
    kind: TransportKind,
    low_buffer_threshold: Duration,
    buffer: BufferAccumulator,
    pacer: ChunkPacer,
    rate: RateMeter,
    rate_interval: Duration,
    events: mpsc::UnboundedSender<LoaderEvent>,
    state: watch::Sender<LoaderState>,
    bytes_delivered: u64,
    transport_done: bool,
}

impl LoaderSession {
    async fn run(
        mut self,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<LoaderCommand>,
        token: CancellationToken,
        transport_token: CancellationToken,
        transport_task: JoinHandle<()>,
    ) -> LoaderSummary {
        self.set_state(LoaderState::active(self.kind));

        let mut rate_ticker =
            tokio::time::interval_at(Instant::now() + self.rate_interval, self.rate_interval);
        rate_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            let deadline = self.pacer.deadline();

            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("Teardown requested");
                    break LoaderState::Canceled;
                }

                _ = self.events.closed() => {
                    debug!("Event receiver dropped, tearing down");
                    break LoaderState::Canceled;
                }

                event = transport_rx.recv(), if !self.transport_done => {
                    let outcome = match event {
                        Some(event) => self.on_transport_event(event),
                        None => {
                            let err = LoaderError::internal("transport task ended without a result");
                            self.fail(err)
                        }
                    };
                    if let Some(outcome) = outcome {
                        break outcome;
                    }
                }

                _ = sleep_until(deadline), if deadline.is_some() => {
                    if let Some(chunk) = self.pacer.fire(&self.buffer, Instant::now()) {
                        self.deliver(chunk);
                    }
                }

                command = commands.recv() => match command {
                    Some(LoaderCommand::TimeUpdate(tick)) => self.on_time_update(tick),
                    None => {
                        debug!("Loader handle dropped, tearing down");
                        break LoaderState::Canceled;
                    }
                },

                _ = rate_ticker.tick(), if !self.transport_done => {
                    let rate = self.rate.rate(Instant::now());
                    trace!(rate, "Throughput report");
                    self.emit(LoaderEvent::StreamRate(rate));
                }
            }

            if self.is_finished() {
                break LoaderState::Completed;
            }
        };

        drop(commands);
        drop(transport_rx);
        self.finish(outcome, transport_token, transport_task).await
    }

    /// Returns the final state when the event ends the run.
    fn on_transport_event(&mut self, event: TransportEvent) -> Option<LoaderState> {
        match event {
            TransportEvent::Started => {
                info!("Stream started");
                self.emit(LoaderEvent::StreamStart);
            }
            TransportEvent::Chunk(bytes) => self.on_bytes(bytes),
            TransportEvent::Exhausted => {
                self.transport_done = true;
                self.set_state(LoaderState::Completed);
                info!(
                    size = %format_size(self.rate.total_bytes(), BINARY),
                    bytes = self.rate.total_bytes(),
                    "Stream end"
                );
                if self.kind == TransportKind::Streaming {
                    self.emit(LoaderEvent::StreamEnd);
                }
            }
            TransportEvent::Failed(err) => return self.fail(err),
        }
        None
    }

    fn on_bytes(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        let now = Instant::now();
        self.rate.record(bytes.len() as u64, now);

        if self.live {
            self.deliver(bytes);
            return;
        }

        self.buffer.append(&bytes);
        if self.pacer.chunk_start() == 0
            && let Some(chunk) = self.pacer.trigger(&self.buffer, now)
        {
            self.deliver(chunk);
        }
    }

    fn on_time_update(&mut self, tick: PlaybackTick) {
        if self.live {
            return;
        }
        if tick.buffered_ahead() > self.low_buffer_threshold.as_secs_f64() {
            return;
        }
        trace!(
            current_time = tick.current_time,
            loaded = tick.loaded,
            "Player buffer low, requesting next chunk"
        );
        if let Some(chunk) = self.pacer.trigger(&self.buffer, Instant::now()) {
            self.deliver(chunk);
        }
    }

    fn fail(&mut self, err: LoaderError) -> Option<LoaderState> {
        warn!(error = %err, "Stream error");
        self.emit(LoaderEvent::StreamError(err));
        Some(LoaderState::Errored)
    }

    fn deliver(&mut self, chunk: Bytes) {
        self.bytes_delivered += chunk.len() as u64;
        self.emit(LoaderEvent::Streaming(chunk));
    }

    fn emit(&self, event: LoaderEvent) {
        if let Err(err) = self.events.send(event) {
            trace!(event = err.0.name(), "Event dropped, receiver is gone");
        }
    }

    fn is_finished(&self) -> bool {
        self.transport_done && (self.live || self.pacer.is_drained(&self.buffer))
    }

    fn set_state(&self, state: LoaderState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Loader state changed");
        }
    }

    async fn finish(
        mut self,
        outcome: LoaderState,
        transport_token: CancellationToken,
        transport_task: JoinHandle<()>,
    ) -> LoaderSummary {
        transport_token.cancel();
        if let Err(err) = transport_task.await {
            warn!(error = %err, "Transport task did not shut down cleanly");
        }

        self.pacer.cancel_pending();
        self.buffer.release();

        if !self.state.borrow().is_terminal() {
            self.set_state(outcome);
        }

        let summary = LoaderSummary {
            state: *self.state.borrow(),
            bytes_received: self.rate.total_bytes(),
            bytes_delivered: self.bytes_delivered,
            buffered_bytes: self.buffer.len() as u64,
        };
        info!(
            state = %summary.state,
            received = summary.bytes_received,
            delivered = summary.bytes_delivered,
            "Loader finished"
        );
        summary
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::{ScriptProbe, ScriptedTransport, Step};

    const LOW: PlaybackTick = PlaybackTick {
        current_time: 0.0,
        loaded: 0.0,
    };

    fn on_demand(chunk: u64) -> LoaderOptions {
        LoaderOptions::new("http://media.test/video.flv")
            .with_audio(false)
            .with_chunks(chunk, 0)
    }

    fn start(
        options: LoaderOptions,
        kind: TransportKind,
        steps: Vec<Step>,
    ) -> (LoaderHandle, LoaderEvents, ScriptProbe) {
        let (transport, probe) = ScriptedTransport::new(kind, steps);
        let (handle, events) =
            FetchLoader::spawn_with_transport(options, LoaderConfig::default(), Box::new(transport));
        (handle, events, probe)
    }

    /// Next event other than a rate report
    async fn next_event(events: &mut LoaderEvents) -> Option<LoaderEvent> {
        loop {
            match events.recv().await {
                Some(event) if event.is_rate() => continue,
                other => return other,
            }
        }
    }

    fn pending_events(events: &mut LoaderEvents) -> Vec<LoaderEvent> {
        std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| !event.is_rate())
            .collect()
    }

    /// Keeps reporting a starving player until the loader closes its events.
    async fn drain_with_ticks(handle: &LoaderHandle, events: &mut LoaderEvents) -> Vec<LoaderEvent> {
        let mut seen = Vec::new();
        loop {
            handle.time_update(LOW);
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) if event.is_rate() => {}
                    Some(event) => seen.push(event),
                    None => return seen,
                },
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }
        }
    }

    fn chunk_lengths(events: &[LoaderEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|event| match event {
                LoaderEvent::Streaming(chunk) => Some(chunk.len()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_chunks_are_forwarded_immediately() {
        let options = LoaderOptions::new("http://media.test/live.flv").live(true);
        let (handle, mut events, _probe) = start(
            options,
            TransportKind::Streaming,
            vec![
                Step::bytes(500, 1),
                Step::Delay(Duration::from_millis(40)),
                Step::bytes(500, 2),
                Step::Delay(Duration::from_millis(40)),
                Step::bytes(300, 3),
            ],
        );
        assert_eq!(handle.transport(), TransportKind::Streaming);

        let mut seen = Vec::new();
        while let Some(event) = next_event(&mut events).await {
            seen.push(event);
        }

        assert!(matches!(seen.first(), Some(LoaderEvent::StreamStart)));
        assert_eq!(chunk_lengths(&seen), vec![500, 500, 300]);
        assert!(matches!(seen.last(), Some(LoaderEvent::StreamEnd)));
        assert_eq!(seen.len(), 5);

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.state, LoaderState::Completed);
        assert_eq!(summary.bytes_received, 1300);
        assert_eq!(summary.bytes_delivered, 1300);
        assert_eq!(summary.buffered_bytes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_ignores_playback_ticks() {
        let options = LoaderOptions::new("http://media.test/live.flv")
            .live(true)
            .with_chunks(10, 0)
            .with_audio(false);
        let (handle, mut events, _probe) = start(
            options,
            TransportKind::Streaming,
            vec![Step::bytes(64, 1), Step::Stall],
        );

        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::StreamStart)));
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::Streaming(c)) if c.len() == 64));

        handle.time_update(LOW);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(pending_events(&mut events).is_empty());
        assert_eq!(handle.state(), LoaderState::StreamingActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ranged_on_demand_paces_chunks() {
        let (handle, mut events, probe) = start(
            on_demand(1000),
            TransportKind::Ranged,
            vec![Step::bytes(1001, 1), Step::bytes(1000, 2), Step::bytes(499, 3)],
        );
        assert_eq!(handle.transport(), TransportKind::Ranged);

        let seen = drain_with_ticks(&handle, &mut events).await;

        assert!(matches!(seen.first(), Some(LoaderEvent::StreamStart)));
        assert_eq!(chunk_lengths(&seen), vec![1000, 1000, 500]);
        assert!(!seen.iter().any(|e| matches!(e, LoaderEvent::StreamEnd)));
        assert_eq!(probe.reads(), 4);

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.state, LoaderState::Completed);
        assert_eq!(summary.bytes_delivered, 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_demand_delivery_is_contiguous() {
        let steps: Vec<Step> = (0..12u8).map(|i| Step::bytes(333, i)).collect();
        let (handle, mut events, _probe) = start(on_demand(1000), TransportKind::Streaming, steps);

        let seen = drain_with_ticks(&handle, &mut events).await;
        let delivered: Vec<u8> = seen
            .iter()
            .filter_map(|event| match event {
                LoaderEvent::Streaming(chunk) => Some(chunk.to_vec()),
                _ => None,
            })
            .flatten()
            .collect();
        let expected: Vec<u8> = (0..12u8).flat_map(|i| vec![i; 333]).collect();

        assert_eq!(delivered, expected);
        assert!(chunk_lengths(&seen).iter().all(|len| *len <= 1000));
        assert_eq!(
            seen.iter().filter(|e| matches!(e, LoaderEvent::StreamEnd)).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_within_interval_release_once() {
        let (handle, mut events, _probe) = start(
            on_demand(1000),
            TransportKind::Streaming,
            vec![Step::bytes(5000, 7), Step::Stall],
        );

        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::StreamStart)));
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::Streaming(c)) if c.len() == 1000));

        for _ in 0..5 {
            handle.time_update(LOW);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(pending_events(&mut events).is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(chunk_lengths(&pending_events(&mut events)), vec![1000]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(pending_events(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_with_enough_buffer_is_ignored() {
        let (handle, mut events, _probe) = start(
            on_demand(1000),
            TransportKind::Streaming,
            vec![Step::bytes(5000, 7), Step::Stall],
        );
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::StreamStart)));
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::Streaming(_))));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.time_update(PlaybackTick::new(0.0, 10.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pending_events(&mut events).is_empty());

        handle.time_update(PlaybackTick::new(8.0, 10.0));
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::Streaming(c)) if c.len() == 1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_cancels_reader_and_releases_buffer() {
        let (handle, mut events, probe) = start(
            on_demand(1000),
            TransportKind::Streaming,
            vec![
                Step::bytes(400, 1),
                Step::Delay(Duration::from_secs(60)),
                Step::bytes(400, 2),
                Step::bytes(400, 3),
            ],
        );

        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::StreamStart)));
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::Streaming(c)) if c.len() == 400));

        handle.destroy();
        let summary = handle.join().await.unwrap();

        assert_eq!(summary.state, LoaderState::Canceled);
        assert_eq!(summary.buffered_bytes, 0);
        assert_eq!(summary.bytes_received, 400);
        assert!(probe.is_cancelled());
        assert_eq!(probe.reads(), 2);

        let rest: Vec<LoaderEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert!(!rest.iter().any(|e| matches!(e, LoaderEvent::Streaming(_))));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_tears_down() {
        let (handle, mut events, probe) = start(
            on_demand(1000),
            TransportKind::Streaming,
            vec![Step::bytes(10, 1), Step::Stall],
        );
        assert!(matches!(next_event(&mut events).await, Some(LoaderEvent::StreamStart)));
        drop(handle);

        while events.recv().await.is_some() {}
        assert!(probe.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_failure_is_terminal() {
        let (handle, mut events, _probe) = start(
            on_demand(1000),
            TransportKind::Ranged,
            vec![Step::bytes(1001, 1), Step::Fail("range 1001-2000 refused")],
        );

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }

        let errors = seen
            .iter()
            .filter(|e| matches!(e, LoaderEvent::StreamError(_)))
            .count();
        assert_eq!(errors, 1);
        assert!(matches!(seen.last(), Some(LoaderEvent::StreamError(LoaderError::Transport { .. }))));
        assert!(!seen.iter().any(|e| matches!(e, LoaderEvent::StreamEnd)));

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.state, LoaderState::Errored);
        assert_eq!(summary.buffered_bytes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_follows_stream_error() {
        let options = LoaderOptions::new("http://media.test/live.flv").live(true);
        let (handle, mut events, _probe) = start(
            options,
            TransportKind::Streaming,
            vec![
                Step::bytes(100, 1),
                Step::Delay(Duration::from_millis(2500)),
                Step::Fail("connection reset"),
            ],
        );

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }

        // rate reports kept coming while the transport was active
        assert!(seen.iter().any(LoaderEvent::is_rate));
        let error_at = seen
            .iter()
            .position(|e| matches!(e, LoaderEvent::StreamError(_)))
            .unwrap();
        assert_eq!(error_at, seen.len() - 1);
        assert!(!handle.time_update(LOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_reports_error_without_start() {
        let (transport, _probe) = ScriptedTransport::new(TransportKind::Ranged, vec![]);
        let transport = transport.fail_open("probe refused");
        let (handle, mut events) = FetchLoader::spawn_with_transport(
            on_demand(1000),
            LoaderConfig::default(),
            Box::new(transport),
        );

        assert!(matches!(events.recv().await, Some(LoaderEvent::StreamError(_))));
        assert!(events.recv().await.is_none());
        assert_eq!(handle.wait_for_state(LoaderState::is_terminal).await, LoaderState::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_then_drain() {
        let (handle, mut events, _probe) = start(
            on_demand(1000),
            TransportKind::Streaming,
            vec![Step::bytes(1500, 4)],
        );

        let state = handle.wait_for_state(|s| *s == LoaderState::Completed).await;
        assert_eq!(state, LoaderState::Completed);

        let seen = drain_with_ticks(&handle, &mut events).await;
        assert_eq!(chunk_lengths(&seen), vec![1000, 500]);
        assert_eq!(handle.state(), LoaderState::Completed);
    }
}
