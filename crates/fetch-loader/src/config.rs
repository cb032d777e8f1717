use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::proxy::ProxyConfig;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Default `videoChunk` size when the player config omits it
pub const DEFAULT_VIDEO_CHUNK: u64 = 1024 * 1024;

/// Default `audioChunk` size when the player config omits it
pub const DEFAULT_AUDIO_CHUNK: u64 = 64 * 1024;

/// Source descriptor handed to the loader by the player configuration.
///
/// Field names follow the player's JSON keys, so a camelCase config object
/// deserializes directly:
///
/// ```
/// use fetch_loader::LoaderOptions;
///
/// let options: LoaderOptions = serde_json::from_str(
///     r#"{ "url": "https://cdn.example.com/v.flv", "live": true, "hasAudio": false }"#,
/// ).unwrap();
/// assert!(options.live);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderOptions {
    pub url: String,
    /// Unbounded source, bytes are forwarded as soon as they arrive
    pub live: bool,
    pub cors: bool,
    pub with_credentials: bool,
    pub headers: HashMap<String, String>,
    pub has_audio: bool,
    pub video_chunk: u64,
    pub audio_chunk: u64,
    /// Fallback content length when the server does not report one
    pub filesize: Option<u64>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            live: false,
            cors: true,
            with_credentials: false,
            headers: HashMap::new(),
            has_audio: true,
            video_chunk: DEFAULT_VIDEO_CHUNK,
            audio_chunk: DEFAULT_AUDIO_CHUNK,
            filesize: None,
        }
    }
}

impl LoaderOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    pub fn with_chunks(mut self, video_chunk: u64, audio_chunk: u64) -> Self {
        self.video_chunk = video_chunk;
        self.audio_chunk = audio_chunk;
        self
    }

    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = Some(filesize);
        self
    }

    /// Bytes released per paced chunk and requested per range.
    ///
    /// Sources with audio use the video budget; video-only sources add the
    /// audio budget on top. Never zero.
    pub fn chunk_size(&self) -> u64 {
        let size = if self.has_audio {
            self.video_chunk
        } else {
            self.video_chunk.saturating_add(self.audio_chunk)
        };
        size.max(1)
    }

    pub fn credentials(&self) -> CredentialsMode {
        if self.with_credentials {
            CredentialsMode::Include
        } else {
            CredentialsMode::Omit
        }
    }

    pub fn request_mode(&self) -> RequestMode {
        if self.cors {
            RequestMode::Cors
        } else {
            RequestMode::NoCors
        }
    }
}

/// Whether cookies and authorization travel with loader requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsMode {
    Include,
    Omit,
}

impl CredentialsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Omit => "omit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Cors,
    NoCors,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::NoCors => "no-cors",
        }
    }
}

/// Which transport the loader should drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// Streaming when the platform supports incremental body reads,
    /// ranged requests otherwise
    #[default]
    Auto,
    Streaming,
    Ranged,
}

impl TransportPreference {
    pub(crate) fn use_streaming(&self) -> bool {
        match self {
            Self::Auto => streaming_supported(),
            Self::Streaming => true,
            Self::Ranged => false,
        }
    }
}

/// Incremental body reads are unavailable on wasm targets.
pub fn streaming_supported() -> bool {
    cfg!(not(target_arch = "wasm32"))
}

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overall timeout for a single request, zero disables it
    pub timeout: Duration,

    pub connect_timeout: Duration,

    /// Maximum time between body chunks
    pub read_timeout: Duration,

    pub follow_redirects: bool,

    pub user_agent: String,

    pub proxy: Option<ProxyConfig>,

    pub use_system_proxy: bool,

    pub danger_accept_invalid_certs: bool,

    pub pool_max_idle_per_host: usize,

    pub pool_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // a whole on-demand file or a live stream can outlast any fixed bound
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
            use_system_proxy: true,
            danger_accept_invalid_certs: false,
            pool_max_idle_per_host: 4,
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Loader tuning
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub transport: TransportPreference,

    /// Minimum spacing between two chunk releases
    pub pacing_interval: Duration,

    /// Cadence of `StreamRate` reports, also the rate window
    pub rate_interval: Duration,

    /// Playback gap at or below which a clock tick asks for the next chunk
    pub low_buffer_threshold: Duration,

    /// Inclusive end of the probe range used to discover the content length
    pub probe_range_end: u64,

    /// Mirror the `Range` header as a `range=<start>-<end>` query parameter
    pub range_query_param: bool,

    /// Transport reads buffered ahead of the controller
    pub transport_channel_capacity: usize,

    pub client: ClientConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            transport: TransportPreference::Auto,
            pacing_interval: Duration::from_secs(1),
            rate_interval: Duration::from_secs(1),
            low_buffer_threshold: Duration::from_secs(5),
            probe_range_end: 1024,
            range_query_param: true,
            transport_channel_capacity: 2,
            client: ClientConfig::default(),
        }
    }
}

impl LoaderConfig {
    pub fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    pub fn with_rate_interval(mut self, interval: Duration) -> Self {
        self.rate_interval = interval;
        self
    }

    pub fn with_low_buffer_threshold(mut self, threshold: Duration) -> Self {
        self.low_buffer_threshold = threshold;
        self
    }

    pub fn with_range_query_param(mut self, enabled: bool) -> Self {
        self.range_query_param = enabled;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}
