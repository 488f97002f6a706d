//! Movement engine binary for Wayfarer.
//!
//! Wires the map, the movement service, the scheduler tick loop and the
//! NATS intake/publisher together, then runs until interrupted or the
//! configured tick limit is reached.
//!
//! # Startup Sequence
//!
//! 1. Parse arguments and load `wayfarer-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to NATS
//! 4. Connect `PostgreSQL` (running migrations) and Dragonfly, unless
//!    `--memory` is given
//! 5. Load the map, start the event publisher and command intake
//! 6. Run the scheduler loop until Ctrl-C or the tick limit
//! 7. Log the result

mod backend;
mod error;
mod map_source;
mod nats_publisher;
mod nats_requests;
mod tick_log;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wayfarer_core::config::{EngineConfig, LogFormat, LoggingConfig};
use wayfarer_core::control::SchedulerControl;
use wayfarer_core::events::EventBus;
use wayfarer_core::memory::MemoryBackend;
use wayfarer_core::movement::MovementService;
use wayfarer_core::runner::{self, RunResult};
use wayfarer_core::scheduler::Scheduler;
use wayfarer_core::store::Backend;
use wayfarer_db::{DragonflyPool, PostgresConfig, PostgresPool};
use wayfarer_world::{MapHandle, RegionValidator, RoutePlanner, ZoneTracker};

use crate::backend::LiveBackend;
use crate::error::EngineError;
use crate::map_source::MapSource;
use crate::nats_requests::Intake;
use crate::tick_log::TickLog;

/// Default configuration path, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "wayfarer-config.yaml";

/// Parsed command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    /// Run against the in-memory backend instead of `PostgreSQL`/Dragonfly.
    memory: bool,
    /// Explicit config path; the default path is optional, this one is not.
    config: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, EngineError> {
        let mut parsed = Self {
            memory: false,
            config: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--memory" => parsed.memory = true,
                "--config" => {
                    let path = args.next().ok_or_else(|| EngineError::Usage {
                        message: String::from("--config requires a path"),
                    })?;
                    parsed.config = Some(PathBuf::from(path));
                }
                other => {
                    return Err(EngineError::Usage {
                        message: format!("unknown argument: {other}"),
                    });
                }
            }
        }
        Ok(parsed)
    }
}

/// Application entry point for the movement engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Arguments and configuration.
    let args = Args::parse(std::env::args().skip(1))?;
    let (config, config_found) = load_config(args.config.as_deref())?;

    // 2. Logging.
    init_tracing(&config.logging);
    info!(memory = args.memory, "wayfarer-engine starting");
    if config_found {
        info!(
            step_distance = config.movement.step_distance,
            pickup_radius = config.movement.pickup_radius,
            tick_interval_ms = config.scheduler.tick_interval_ms,
            max_ticks = config.scheduler.max_ticks,
            "Configuration loaded"
        );
    } else {
        info!("Config file not found, using defaults");
    }

    // 3. NATS is required in both modes: it is the only way in.
    let nats_url = &config.infrastructure.nats_url;
    info!(nats_url = %nats_url, "Connecting to NATS");
    let nats = async_nats::connect(nats_url.as_str())
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to connect to {nats_url}: {e}"),
        })?;
    info!("NATS connected");

    // 4. Backend and map source, then run.
    let result = if args.memory {
        let source = MapSource::select(config.movement.map_file.as_deref(), None);
        run(&config, Arc::new(MemoryBackend::new()), source, nats).await?
    } else {
        let pg_config = PostgresConfig::new(&config.infrastructure.postgres_url)
            .with_max_connections(config.infrastructure.postgres_max_connections);
        let pg = PostgresPool::connect(&pg_config).await?;
        pg.run_migrations().await?;
        let cache = DragonflyPool::connect(&config.infrastructure.dragonfly_url).await?;
        let source = MapSource::select(config.movement.map_file.as_deref(), Some(&pg));
        let backend = LiveBackend::new(pg.clone(), cache, config.cache.speed_ttl_secs);
        let result = run(&config, Arc::new(backend), source, nats).await;
        pg.close().await;
        result?
    };

    // 5. Results.
    info!(
        reason = ?result.reason,
        total_ticks = result.total_ticks,
        "wayfarer-engine shutdown complete"
    );
    Ok(())
}

/// Assemble the engine over `backend` and run the scheduler loop.
async fn run<B: Backend>(
    config: &EngineConfig,
    backend: Arc<B>,
    source: MapSource,
    nats: async_nats::Client,
) -> Result<RunResult, EngineError> {
    let (snapshot, report) = source.load().await?;
    for reason in &report.skipped {
        warn!(reason = %reason, "Map feature skipped");
    }
    let map = Arc::new(MapHandle::new(snapshot));

    let planner = Arc::new(RoutePlanner::new(
        config.movement.planner_settings(),
        RegionValidator::new(config.movement.region_tie_break),
    ));
    nats_requests::warm_graph(&planner, &map).await;
    let zones = Arc::new(ZoneTracker::new());
    let events = EventBus::new();

    let service = Arc::new(MovementService::new(
        Arc::clone(&backend),
        Arc::clone(&map),
        Arc::clone(&planner),
        Arc::clone(&zones),
        events.clone(),
    ));
    let scheduler = Scheduler::new(
        backend,
        Arc::clone(&map),
        Arc::clone(&planner),
        zones,
        events.clone(),
        config.movement.pickup_radius,
    );
    let control = Arc::new(SchedulerControl::new(&config.scheduler));

    let prefix = config.infrastructure.subject_prefix.clone();
    tokio::spawn(nats_publisher::run_publisher(
        nats.clone(),
        prefix.clone(),
        events.subscribe(),
    ));

    let intake = Arc::new(Intake::new(service, Arc::clone(&control), map, planner, Arc::new(source)));
    tokio::spawn(async move {
        if let Err(e) = nats_requests::serve(nats, &prefix, intake).await {
            warn!(error = %e, "Command intake failed, movement requests disabled");
        }
    });

    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping after the current tick");
                    control.request_stop();
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }

    info!(
        tick_interval_ms = control.tick_interval_ms(),
        max_ticks = control.max_ticks(),
        "Entering scheduler loop"
    );
    let mut callback = TickLog::new();
    let result = runner::run_scheduler(&scheduler, &control, &mut callback).await;

    let totals = callback.totals();
    info!(
        arrived = totals.arrived,
        collected = totals.collected,
        collection_failed = totals.collection_failed,
        failed = totals.failed,
        cache_hits = totals.cache_hits,
        "Scheduler totals"
    );
    Ok(result)
}

/// Load configuration. Returns whether a file was found.
///
/// A missing default file falls back to defaults; a missing explicit
/// `--config` file is an error.
fn load_config(explicit: Option<&Path>) -> Result<(EngineConfig, bool), EngineError> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if explicit.is_some() || path.exists() {
        Ok((EngineConfig::from_file(path)?, true))
    } else {
        Ok((EngineConfig::parse("")?, false))
    }
}

/// Initialize the global subscriber. `RUST_LOG` overrides the configured
/// level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
