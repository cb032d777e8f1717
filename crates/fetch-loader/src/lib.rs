//! # Fetch Loader
//!
//! Playback-paced acquisition of a single media resource over HTTP.
//!
//! The loader pulls bytes through one of two transports and hands them to a
//! consumer as a stream of [`LoaderEvent`]s:
//!
//! - live sources are forwarded chunk by chunk as they arrive;
//! - on-demand sources are accumulated and released in bounded chunks, at
//!   most once per pacing interval, whenever the player reports that its
//!   buffered playback runs low.
//!
//! ## Transports
//!
//! - [`StreamingTransport`]: one request whose body is read incrementally.
//! - [`RangedTransport`]: a length probe followed by sequential `Range`
//!   requests, for platforms without incremental body reads.
//!
//! ## Example
//!
//! ```no_run
//! use fetch_loader::{FetchLoader, LoaderConfig, LoaderEvent, LoaderOptions, PlaybackTick};
//!
//! # async fn run() -> Result<(), fetch_loader::LoaderError> {
//! let options = LoaderOptions::new("https://cdn.example.com/video.flv");
//! let (handle, mut events) = FetchLoader::spawn(options, LoaderConfig::default())?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LoaderEvent::Streaming(chunk) => println!("{} bytes", chunk.len()),
//!         LoaderEvent::StreamError(err) => return Err(err),
//!         _ => {}
//!     }
//!     handle.time_update(PlaybackTick::new(0.0, 0.0));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod buffer;
pub mod client;
pub mod config;
mod error;
pub mod events;
pub mod loader;
pub mod pacer;
pub mod proxy;
pub mod rate;
pub mod throttle;
pub mod transport;

pub use buffer::BufferAccumulator;
pub use client::{RequestPolicy, create_client};
pub use config::{
    ClientConfig, CredentialsMode, LoaderConfig, LoaderOptions, RequestMode, TransportPreference,
};
pub use error::LoaderError;
pub use events::{LoaderEvent, PlaybackTick};
pub use loader::{FetchLoader, LoaderEvents, LoaderHandle, LoaderState, LoaderSummary};
pub use pacer::ChunkPacer;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use rate::RateMeter;
pub use throttle::Throttle;
pub use transport::{
    BoxTransport, RangeCursor, RangedTransport, StreamingTransport, Transport, TransportEvent,
    TransportKind,
};
