//! tapeplay Audio Player - command-line entry point
//!
//! Plays local files through the chunked load pipeline: every file is
//! sliced by the file transport, decoded chunk by chunk and scheduled
//! gaplessly behind the previous one.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tapeplay_ap::audio::{probe_duration, AudioDevice, MixerSink, OutputSink, SymphoniaChunkDecoder};
use tapeplay_ap::config::{ConfigOverrides, EngineConfig};
use tapeplay_ap::playback::{LoadOutcome, PlaybackScheduler, SchedulerNotification, Track};
use tapeplay_ap::transport::FileChunkTransport;
use tapeplay_common::config::{load_toml_config, resolve_config_path, CONFIG_ENV_VAR};
use tapeplay_common::timing::ticks_to_ms;

/// How often finished tracks are retired and deferred files retried
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Command-line arguments for tapeplay-ap
#[derive(Parser, Debug)]
#[command(name = "tapeplay-ap")]
#[command(about = "Gapless chunked audio player")]
#[command(version)]
struct Args {
    /// Config file (default: $TAPEPLAY_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracks held in the lookahead (current + queued)
    #[arg(long, env = "TAPEPLAY_CAPACITY")]
    capacity: Option<usize>,

    /// Chunk size in bytes for the file transport
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Output device name
    #[arg(short, long, env = "TAPEPLAY_DEVICE")]
    device: Option<String>,

    /// Output volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Files to play, in order
    #[arg(required_unless_present = "list_devices")]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let toml = load_toml_config(config_path.as_deref()).context("Failed to load config")?;
    let config = EngineConfig::resolve(
        &toml,
        ConfigOverrides {
            lookahead_capacity: args.capacity,
            chunk_size_bytes: args.chunk_size,
            device: args.device.clone(),
            volume: args.volume,
            log_level: args.log_level.clone(),
        },
    )
    .context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "tapeplay_ap={0},tapeplay_common={0}",
                config.log_level
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        _ => info!("No config file found, using defaults"),
    }

    if args.list_devices {
        for name in AudioDevice::list_devices().context("Failed to list devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut tracks = VecDeque::new();
    for path in &args.files {
        match probe_duration(path) {
            Ok(duration) => {
                info!("{}: {} ms", path.display(), ticks_to_ms(duration));
                tracks.push_back(Track::new(path.to_string_lossy().to_string(), duration));
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    if tracks.is_empty() {
        anyhow::bail!("No playable files");
    }

    let mut device = AudioDevice::open(config.device.as_deref(), config.sample_rate, config.channels)
        .context("Failed to open audio device")?;
    let sink = Arc::new(MixerSink::new(device.sample_rate(), device.channels()));
    sink.set_volume(config.volume);
    device
        .start(Arc::clone(&sink))
        .context("Failed to start audio stream")?;

    let decoder = SymphoniaChunkDecoder::new().resample_to(sink.sample_rate());
    let mut scheduler = PlaybackScheduler::new(
        &config,
        sink,
        Arc::new(FileChunkTransport::new(config.chunk_size_bytes)),
        Arc::new(decoder),
    );

    queue_deferred(&mut scheduler, &mut tracks);

    let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            notification = scheduler.next_notification(), if !scheduler.is_idle() => {
                if let Some(notification) = notification {
                    report(notification);
                }
            }

            _ = progress.tick() => {
                while scheduler.advance_if_finished() {
                    queue_deferred(&mut scheduler, &mut tracks);
                }

                if tracks.is_empty() && scheduler.current_event().is_none() && scheduler.is_idle() {
                    info!("Playback finished");
                    break;
                }

                if let Some(position) = scheduler.position_in_current_track() {
                    debug!("Position: {} ms", ticks_to_ms(position));
                }
            }
        }
    }

    scheduler.clear_scheduled_audio();
    device.stop();
    info!("Shutdown complete");
    Ok(())
}

/// Queue waiting files until the lookahead is full
fn queue_deferred(scheduler: &mut PlaybackScheduler, tracks: &mut VecDeque<Track>) {
    while let Some(track) = tracks.front() {
        match scheduler.queue_track(track.clone()) {
            Ok(ticket) => {
                debug!("Queued {} as sequence {}", track.locator, ticket.sequence_id);
                tracks.pop_front();
            }
            Err(e) if e.is_recoverable() => break,
            Err(e) => {
                error!("Cannot queue {}: {}", track.locator, e);
                tracks.pop_front();
            }
        }
    }
}

fn report(notification: SchedulerNotification) {
    match notification {
        SchedulerNotification::SegmentReady {
            sequence_id,
            segment,
            ..
        } => debug!(
            "Sequence {}: segment {} at {} ms",
            sequence_id,
            segment.frame_id,
            ticks_to_ms(segment.scheduled_start_ticks)
        ),
        SchedulerNotification::LoadFinished {
            track_id, outcome, ..
        } => match outcome {
            LoadOutcome::Completed(event) => info!(
                "Track {} loaded: {} segments",
                track_id,
                event.segments.len()
            ),
            LoadOutcome::Cancelled => info!("Track {} cancelled", track_id),
            LoadOutcome::Failed(e) => error!("Track {} failed: {}", track_id, e),
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
