//! Airwatch: air quality monitor.
//!
//! Single-binary Tokio application that:
//! 1. Fetches live readings and daily forecasts from WAQI
//! 2. Converts concentrations into US EPA AQI values
//! 3. Serves results from a freshness cache, backed by SQLite snapshots
//! 4. Keeps configured cities warm with a background refresh loop

mod config;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aqi::{AqiCalculator, BreakpointTable};
use common::config::ServiceConfig;
use common::{Error, Pollutant};
use refresh::{Orchestrator, OrchestratorSettings, RefreshScheduler};
use store::{SnapshotStore, SqliteStore};
use waqi_client::WaqiClient;

/// Air quality monitor
#[derive(Parser)]
#[command(name = "airwatch", about = "Air quality index monitor backed by WAQI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep configured cities warm until Ctrl+C.
    Serve,
    /// Print current conditions for a city.
    Live {
        city: String,
        /// Bypass the cache.
        #[arg(long)]
        force: bool,
    },
    /// Print the daily forecast for a city.
    Forecast {
        city: String,
        #[arg(long)]
        force: bool,
    },
    /// Print live conditions and forecast together.
    Complete {
        city: String,
        #[arg(long)]
        force: bool,
    },
    /// Compute AQI from concentrations given on the command line.
    Compute {
        #[arg(long)]
        pm25: Option<f64>,
        #[arg(long)]
        pm10: Option<f64>,
        /// Ozone, ppb.
        #[arg(long)]
        o3: Option<f64>,
        /// Nitrogen dioxide, ppb.
        #[arg(long)]
        no2: Option<f64>,
        /// Sulfur dioxide, ppb.
        #[arg(long)]
        so2: Option<f64>,
        /// Carbon monoxide, ppm.
        #[arg(long)]
        co: Option<f64>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "airwatch=info,refresh=info,waqi_client=info,store=info,aqi=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let calculator = match build_calculator(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!("Breakpoint table error: {}", e);
            std::process::exit(1);
        }
    };

    // ── Offline mode ─────────────────────────────────────────────────
    if let Command::Compute {
        pm25,
        pm10,
        o3,
        no2,
        so2,
        co,
    } = cli.command
    {
        let readings = BTreeMap::from([
            (Pollutant::Pm25, pm25),
            (Pollutant::Pm10, pm10),
            (Pollutant::O3, o3),
            (Pollutant::No2, no2),
            (Pollutant::So2, so2),
            (Pollutant::Co, co),
        ]);
        match calculator.compute_checked(&readings) {
            Ok(result) => print_json(&result),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = config::require_token(&cfg) {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let orchestrator = match build_orchestrator(&cfg, calculator) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Command::Live { city, force } => orchestrator
            .get_live(&city, force)
            .await
            .map(|r| print_json(&r)),
        Command::Forecast { city, force } => orchestrator
            .get_forecast(&city, force)
            .await
            .map(|r| print_json(&r)),
        Command::Complete { city, force } => orchestrator
            .get_complete(&city, force)
            .await
            .map(|r| print_json(&r)),
        Command::Serve => {
            serve(&cfg, orchestrator).await;
            Ok(())
        }
        Command::Compute { .. } => Ok(()),
    };

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{}", out),
        Err(e) => warn!("Failed to render result: {}", e),
    }
}

fn build_calculator(cfg: &ServiceConfig) -> Result<AqiCalculator, Error> {
    let Some(path) = cfg.aqi.breakpoints_path.as_deref() else {
        return Ok(AqiCalculator::standard());
    };
    let raw = std::fs::read_to_string(path)?;
    let table = BreakpointTable::from_toml_str(&raw)?;
    info!("Loaded breakpoint overrides from {}", path);
    Ok(AqiCalculator::new(Arc::new(table)))
}

fn build_orchestrator(cfg: &ServiceConfig, calculator: AqiCalculator) -> Result<Orchestrator, Error> {
    let client = WaqiClient::new(
        &cfg.waqi_base_url,
        &cfg.waqi_token,
        Duration::from_secs(cfg.timing.request_timeout_secs),
    )?;
    let settings = OrchestratorSettings::from_config(cfg)?;
    let orchestrator = Orchestrator::new(Arc::new(client), calculator, &cfg.cities, settings);

    if !cfg.storage.enabled {
        info!("Persistence disabled; running cache-only");
        return Ok(orchestrator);
    }

    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteStore::open(&cfg.storage.sqlite_path)?);
    info!("Snapshot store: {}", cfg.storage.sqlite_path);
    Ok(orchestrator.with_store(store))
}

async fn serve(cfg: &ServiceConfig, orchestrator: Arc<Orchestrator>) {
    let warm = cfg.warm_set();
    info!("Warm cities: {:?}", warm);
    info!(
        "Cache: live={}s forecast={}s refresh={}s",
        cfg.cache.live_ttl_secs, cfg.cache.forecast_ttl_secs, cfg.timing.refresh_interval_secs
    );

    let token = CancellationToken::new();

    let scheduler = RefreshScheduler::new(
        orchestrator.clone(),
        warm,
        Duration::from_secs(cfg.timing.refresh_interval_secs),
    );
    let mut scheduler_handle = scheduler.spawn(token.clone());

    let hb_orchestrator = orchestrator.clone();
    let hb_token = token.clone();
    let hb_interval = Duration::from_secs(cfg.timing.heartbeat_interval_secs);
    let mut heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(hb_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = hb_token.cancelled() => break,
                _ = interval.tick() => {}
            }
            let (live, forecasts) = hb_orchestrator.cached_counts();
            info!("HEARTBEAT: live_entries={} forecast_entries={}", live, forecasts);
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("Airwatch is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = &mut scheduler_handle => {
            error!("Scheduler task exited: {:?}", r);
        }
        r = &mut heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    token.cancel();
    if !scheduler_handle.is_finished() {
        if let Err(e) = scheduler_handle.await {
            warn!("Scheduler did not shut down cleanly: {}", e);
        }
    }
    if !heartbeat_handle.is_finished() {
        if let Err(e) = heartbeat_handle.await {
            warn!("Heartbeat did not shut down cleanly: {}", e);
        }
    }

    info!("Airwatch shut down.");
}
