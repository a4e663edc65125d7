//! Lane Sorter - QR-driven sorting line controller
//!
//! # Usage
//!
//! ```bash
//! # Run on the line (sysfs GPIO, JPEG snapshots from the capture process)
//! ./lane-sorter --config /etc/lane-sorter/sorter_config.toml
//!
//! # Bench run without hardware; drive it from stdin
//! ./lane-sorter --simulate
//! > qr LOAI2
//! > item 2
//! ```
//!
//! # Environment Variables
//!
//! - `SORTER_CONFIG`: Path to the config file
//! - `SORTER_ADDR`: Dashboard bind address (default: 0.0.0.0:5000)
//! - `SORTER_CORS_ORIGINS`: Extra allowed CORS origins, comma-separated
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lane_sorter::acquisition::{DigitalIo, SimulatedIo, SysfsGpio};
use lane_sorter::api::{create_app, DashboardState};
use lane_sorter::config::{defaults, GpioBackend, SorterConfig};
use lane_sorter::console::BenchConsole;
use lane_sorter::pipeline::{
    CaptureLoop, ClientHub, DetectionLoop, FrameSlot, FrameSource, PayloadDecoder, QrDecoder,
    RqrrDecoder, ScriptHandle, ScriptedSource, SnapshotFileSource, SortingCoordinator,
    StateBroadcaster,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "lane-sorter")]
#[command(about = "QR-driven three-lane sorting line controller")]
#[command(version)]
struct CliArgs {
    /// Path to a sorter_config.toml (otherwise $SORTER_CONFIG or ./sorter_config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:5000")
    #[arg(short, long, env = "SORTER_ADDR")]
    addr: Option<String>,

    /// Run without hardware: simulated pins, scripted camera, stdin commands
    #[arg(long)]
    simulate: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    FrameCapture,
    Detection,
    Broadcaster,
    Console,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpServer => write!(f, "HttpServer"),
            Self::FrameCapture => write!(f, "FrameCapture"),
            Self::Detection => write!(f, "Detection"),
            Self::Broadcaster => write!(f, "Broadcaster"),
            Self::Console => write!(f, "Console"),
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Acquire the digital I/O backend. Failure here is fatal.
///
/// The simulated bank is also returned concretely so the console can drive
/// its sensors.
fn open_gpio(config: &SorterConfig) -> Result<(Arc<dyn DigitalIo>, Option<Arc<SimulatedIo>>)> {
    match config.gpio.backend {
        GpioBackend::Simulated => {
            info!("🔌 GPIO: simulated pins");
            let sim = Arc::new(SimulatedIo::new());
            Ok((sim.clone(), Some(sim)))
        }
        GpioBackend::Sysfs => {
            let outputs: Vec<u32> = config
                .lanes
                .iter()
                .flat_map(|l| [l.push_pin, l.pull_pin])
                .collect();
            let inputs: Vec<u32> = config.lanes.iter().map(|l| l.sensor_pin).collect();
            let gpio = SysfsGpio::open(
                &config.gpio.sysfs_root,
                config.gpio.chip_base,
                &outputs,
                &inputs,
            )
            .context("Failed to acquire GPIO pins")?;
            info!("🔌 GPIO: sysfs at {}", config.gpio.sysfs_root.display());
            Ok((Arc::new(gpio), None))
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Open the frame source (fatal on failure) and spawn its capture loop.
async fn spawn_capture<S: FrameSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    mut source: S,
    frames: Arc<FrameSlot>,
    config: &SorterConfig,
    cancel_token: CancellationToken,
) -> Result<()> {
    source
        .open()
        .await
        .with_context(|| format!("Failed to open {} frame source", source.source_name()))?;
    info!("📷 Camera: {} source", source.source_name());

    let capture = CaptureLoop::new(
        source,
        frames,
        config.camera.capture_period(),
        config.camera.reconnect_delay(),
        cancel_token,
    );
    task_set.spawn(async move {
        info!("[FrameCapture] Task starting");
        let stats = capture.run().await;
        info!("[FrameCapture] Stopped after {} frames", stats.frames_captured);
        Ok(TaskName::FrameCapture)
    });
    Ok(())
}

/// Read bench commands from stdin in simulate mode.
///
/// The console only ever ends itself; its input failing never stops the line.
fn spawn_console(
    task_set: &mut JoinSet<Result<TaskName>>,
    coordinator: SortingCoordinator,
    sim: Arc<SimulatedIo>,
    script: ScriptHandle,
) {
    task_set.spawn(async move {
        info!("[Console] Task starting (commands: qr <PAYLOAD>, item <lane>)");
        let console = BenchConsole::new(coordinator, sim, script);
        let stats = console.run(BufReader::new(tokio::io::stdin())).await;
        info!(
            "[Console] Stopped after {} commands ({} rejected, {} read errors)",
            stats.commands, stats.rejected, stats.read_errors
        );
        Ok(TaskName::Console)
    });
}

// ============================================================================
// Supervisor
// ============================================================================

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {:#}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Let in-flight strokes see the cancellation, then force every lane to rest
/// and hand the pins back.
async fn shutdown(coordinator: &SortingCoordinator) {
    tokio::time::sleep(Duration::from_millis(defaults::SHUTDOWN_SETTLE_MS)).await;
    coordinator.reset_actuators();
    if let Err(e) = coordinator.actuators().release_io() {
        warn!("Failed to release GPIO: {}", e);
    }
    info!("👋 Shutdown complete");
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let mut config =
        SorterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.simulate {
        config.gpio.backend = GpioBackend::Simulated;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Lane Sorter");
    for (idx, lane) in config.lanes.iter().enumerate() {
        info!(
            "  Lane {}: {} <- {} (push {}, pull {}, sensor {})",
            idx + 1,
            lane.name,
            lane.code,
            lane.push_pin,
            lane.pull_pin,
            lane.sensor_pin
        );
    }
    info!("  Cycle delay: {}s", config.timing.cycle_delay_secs);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let (io, sim) = open_gpio(&config)?;

    let cancel_token = CancellationToken::new();
    let hub = Arc::new(ClientHub::new(config.server.client_buffer));
    let coordinator = SortingCoordinator::new(&config, io, hub, cancel_token.clone());
    coordinator.reset_actuators();

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let frames = Arc::new(FrameSlot::new());

    // Frame source + decoder
    let decoder: Arc<dyn QrDecoder> = if let Some(sim) = sim.filter(|_| args.simulate) {
        let (source, script) = ScriptedSource::new();
        spawn_capture(&mut task_set, source, frames.clone(), &config, cancel_token.clone()).await?;
        spawn_console(&mut task_set, coordinator.clone(), sim, script);
        Arc::new(PayloadDecoder)
    } else {
        let source = SnapshotFileSource::new(&config.camera.snapshot_path);
        spawn_capture(&mut task_set, source, frames.clone(), &config, cancel_token.clone()).await?;
        Arc::new(RqrrDecoder)
    };

    // Detection loop
    let detection = DetectionLoop::new(coordinator.clone(), frames.clone(), decoder, &config);
    task_set.spawn(async move {
        info!("[Detection] Task starting");
        let stats = detection.run().await;
        info!(
            "[Detection] Stopped: {} triggers, {} rejected, {} unknown",
            stats.triggers, stats.rejected, stats.unknown
        );
        Ok(TaskName::Detection)
    });

    // State broadcaster
    let broadcaster = StateBroadcaster::new(coordinator.clone(), config.timing.broadcast_interval());
    task_set.spawn(async move {
        info!("[Broadcaster] Task starting");
        broadcaster.run().await;
        Ok(TaskName::Broadcaster)
    });

    // HTTP server
    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!("🌐 Dashboard: http://{}", config.server.addr);
    let app = create_app(DashboardState::new(
        coordinator.clone(),
        frames,
        config.camera.stream_period(),
    ));
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    // Graceful shutdown via Ctrl+C
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let result = run_supervisor(&mut task_set, cancel_token.clone()).await;
    cancel_token.cancel();
    shutdown(&coordinator).await;
    result
}
