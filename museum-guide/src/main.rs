//! Museum Guide (museum-guide) - command-line entry point
//!
//! Inspects a room catalog and exercises the guide engine without real
//! hardware:
//! - `rooms`: list rooms and their narration tracks
//! - `locate`: resolve a single coordinate to a room
//! - `replay`: feed a recorded position trace through a full guide session
//!   and print every guide event as a JSON line

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use museum_common::catalog::Catalog;
use museum_common::config::GuideConfig;
use museum_common::events::GuideEvent;
use museum_common::geo::Coordinate;
use museum_guide::replay::{load_trace, trace_to_script};
use museum_guide::simulation::{ScriptedPositionSource, SimulatedAudioEngine};
use museum_guide::{GuideSession, RoomResolver};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for museum-guide
#[derive(Parser, Debug)]
#[command(name = "museum-guide")]
#[command(about = "Location-aware museum audio guide engine")]
#[command(version)]
struct Args {
    /// Config file (falls back to MUSEUM_GUIDE_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Room/track catalog, overriding `catalog_path` from the config
    #[arg(long, env = "MUSEUM_GUIDE_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the rooms of the catalog
    Rooms,

    /// Resolve one coordinate to the room that contains it
    Locate {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },

    /// Replay a JSON-lines position trace through a guide session
    Replay {
        /// Trace file, one position fix per line
        trace: PathBuf,

        /// Playback speed relative to the recorded timestamps (0 = no pauses)
        #[arg(long, default_value_t = 0.0)]
        speed: f64,

        /// Play each room's track on entry instead of only offering it
        #[arg(long)]
        auto_play: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = GuideConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let catalog_path = args
        .catalog
        .clone()
        .or_else(|| config.catalog_path.clone());
    let Some(catalog_path) = catalog_path else {
        bail!("No catalog configured: pass --catalog or set catalog_path in the config file");
    };
    let catalog = load_catalog(&catalog_path)?;

    match args.command {
        Command::Rooms => list_rooms(&catalog),
        Command::Locate {
            latitude,
            longitude,
        } => locate(&catalog, latitude, longitude)?,
        Command::Replay {
            trace,
            speed,
            auto_play,
        } => {
            config.playback.auto_play |= auto_play;
            replay(config, catalog, &trace, speed).await?;
        }
    }

    Ok(())
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::load(path).with_context(|| format!("Failed to load catalog {}", path.display()))
}

fn list_rooms(catalog: &Catalog) {
    for room in catalog.rooms() {
        let track = catalog
            .track_for_room(room)
            .map(|track| track.title.as_str())
            .unwrap_or("-");
        println!(
            "{:<12} {:<32} ({:.6}, {:.6}) r={:.1} m  track: {}",
            room.id, room.name, room.latitude, room.longitude, room.radius, track
        );
    }
}

fn locate(catalog: &Catalog, latitude: f64, longitude: f64) -> Result<()> {
    let point = Coordinate::new(latitude, longitude);
    if !point.is_valid() {
        bail!("Invalid coordinate ({}, {})", latitude, longitude);
    }

    let resolver = RoomResolver::from_catalog(catalog);
    match resolver.nearest_room(point) {
        Some((room, distance)) => println!(
            "{} ({}): {:.1} m from centre, radius {:.1} m",
            room.id, room.name, distance, room.radius
        ),
        None => println!("No room contains ({}, {})", latitude, longitude),
    }
    Ok(())
}

async fn replay(config: GuideConfig, catalog: Catalog, trace: &Path, speed: f64) -> Result<()> {
    let fixes = load_trace(trace).with_context(|| format!("Failed to load trace {}", trace.display()))?;
    if fixes.is_empty() {
        bail!("Trace {} contains no fixes", trace.display());
    }

    let script = trace_to_script(&fixes, speed).context("Invalid --speed for this trace")?;
    let source = ScriptedPositionSource::new(script).close_when_done();
    let (engine, _engine_probe, engine_events) = SimulatedAudioEngine::new();
    let session = GuideSession::new(
        &config,
        catalog,
        Box::new(source),
        Box::new(engine),
        engine_events,
    );
    let handle = session.handle();
    let events = session.subscribe_events();

    info!(fixes = fixes.len(), speed, "Replaying position trace");
    let printer = tokio::spawn(print_events(events));
    let runner = tokio::spawn(session.run());

    if let Err(e) = handle.start_tracking().await {
        printer.abort();
        handle.shutdown().await.ok();
        runner.await.ok();
        return Err(e).context("Position tracking failed to start");
    }

    tokio::select! {
        result = printer => {
            if let Err(e) = result {
                warn!("Event printer failed: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    handle.shutdown().await.context("Guide session already closed")?;
    runner.await.context("Guide session task failed")?;
    info!("Replay complete");
    Ok(())
}

/// Print guide events as JSON lines until tracking stops
async fn print_events(mut events: tokio::sync::broadcast::Receiver<GuideEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Cannot serialize {} event: {}", event.event_type(), e),
                }
                if matches!(event, GuideEvent::TrackingStopped { .. }) {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Ctrl+C handler
async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
