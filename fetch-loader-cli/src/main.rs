mod cli;
mod error;
mod params;

use std::process;
use std::time::Duration;

use clap::Parser;
use fetch_loader::{
    FetchLoader, LoaderConfig, LoaderEvent, LoaderOptions, PlaybackTick, TransportPreference,
};
use humansize::{BINARY, format_size};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{cli::Args, error::AppError, params::parse_headers};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        if matches!(e, AppError::BrokenPipe) {
            warn!("{}", e);
            return;
        }
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // stdout may carry media bytes
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn build_options(args: &Args) -> Result<LoaderOptions, AppError> {
    let mut options = LoaderOptions::new(&args.url)
        .live(args.live)
        .with_audio(!args.no_audio)
        .with_chunks(args.video_chunk, args.audio_chunk)
        .with_credentials(args.with_credentials)
        .with_cors(!args.no_cors);

    if let Some(filesize) = args.filesize {
        options = options.with_filesize(filesize);
    }
    for (name, value) in parse_headers(&args.headers)? {
        options = options.with_header(name, value);
    }
    Ok(options)
}

fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_size(bytes_per_sec.max(0.0) as u64, BINARY))
}

async fn run(args: Args) -> Result<(), AppError> {
    let options = build_options(&args)?;
    let transport = if args.ranged {
        TransportPreference::Ranged
    } else {
        TransportPreference::Auto
    };
    let config = LoaderConfig::default().with_transport(transport);

    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(tokio::fs::File::create(path).await?),
        None => Box::new(tokio::io::stdout()),
    };

    let (handle, mut events) = FetchLoader::spawn(options, config)?;
    info!(url = %args.url, transport = %handle.transport(), "Loader started");

    // the player never has anything buffered, so every tick asks for more
    let mut clock = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    let mut written = 0u64;
    let mut failure = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(LoaderEvent::StreamStart) => info!("Stream started"),
                Some(LoaderEvent::Streaming(chunk)) => {
                    sink.write_all(&chunk).await.map_err(AppError::from_write)?;
                    written += chunk.len() as u64;
                    debug!(len = chunk.len(), total = written, "Chunk written");
                }
                Some(LoaderEvent::StreamEnd) => info!("Stream ended"),
                Some(LoaderEvent::StreamRate(rate)) => {
                    info!(rate = %format_rate(rate), total = %format_size(written, BINARY), "Throughput");
                }
                Some(LoaderEvent::StreamError(err)) => failure = Some(err),
                None => break,
            },
            _ = clock.tick() => {
                handle.time_update(PlaybackTick::new(0.0, 0.0));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping loader");
                handle.destroy();
            }
        }
    }

    sink.flush().await.map_err(AppError::from_write)?;

    let summary = handle.join().await?;
    info!(
        state = %summary.state,
        received = %format_size(summary.bytes_received, BINARY),
        written = %format_size(written, BINARY),
        "Done"
    );

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
