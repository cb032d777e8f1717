use std::path::PathBuf;

use clap::Parser;
use fetch_loader::config::{DEFAULT_AUDIO_CHUNK, DEFAULT_VIDEO_CHUNK};

#[derive(Parser, Debug)]
#[command(
    name = "fetchl",
    version,
    about = "Fetch a media resource the way a player loader does"
)]
pub struct Args {
    /// Source URL
    pub url: String,

    /// Treat the source as an unbounded live stream
    #[arg(long)]
    pub live: bool,

    /// Use range requests instead of reading one response body
    #[arg(long)]
    pub ranged: bool,

    /// Video chunk budget in bytes
    #[arg(long, default_value_t = DEFAULT_VIDEO_CHUNK)]
    pub video_chunk: u64,

    /// Audio chunk budget in bytes
    #[arg(long, default_value_t = DEFAULT_AUDIO_CHUNK)]
    pub audio_chunk: u64,

    /// The source carries no audio track
    #[arg(long)]
    pub no_audio: bool,

    /// Content length to assume when the server does not report one
    #[arg(long)]
    pub filesize: Option<u64>,

    /// Extra request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Send cookies and authorization headers
    #[arg(long)]
    pub with_credentials: bool,

    /// Issue requests in no-cors mode
    #[arg(long)]
    pub no_cors: bool,

    /// Write the fetched bytes here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Playback clock period in milliseconds
    #[arg(long, default_value_t = 200)]
    pub tick_ms: u64,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
