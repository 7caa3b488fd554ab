//! Background refresh loop.
//!
//! Keeps the cache warm for a fixed set of cities by force-refreshing live
//! and forecast data on a fixed interval. Ticks never overlap: the next
//! tick is scheduled only after the previous one finishes. Failures are
//! logged and isolated per city and data kind.
//!
//! State goes `Idle -> Running -> Idle` around each tick and ends in
//! `Stopped` on cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Outcome counts for one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub cities: usize,
    pub live_ok: usize,
    pub live_failed: usize,
    pub forecast_ok: usize,
    pub forecast_failed: usize,
    pub elapsed_ms: u128,
}

pub struct RefreshScheduler {
    orchestrator: Arc<Orchestrator>,
    cities: Vec<String>,
    interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, cities: Vec<String>, interval: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            orchestrator,
            cities,
            interval,
            state,
        }
    }

    /// Observe lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Force-refresh every configured city once, one upstream fetch per city.
    pub async fn run_tick(&self) -> TickSummary {
        let started = Instant::now();
        let mut summary = TickSummary {
            cities: self.cities.len(),
            ..TickSummary::default()
        };

        for city in &self.cities {
            let outcome = match self.orchestrator.refresh_city(city).await {
                Ok(o) => o,
                Err(e) => {
                    summary.live_failed += 1;
                    summary.forecast_failed += 1;
                    warn!("Scheduled refresh skipped for {}: {}", city, e);
                    continue;
                }
            };
            match outcome.live {
                Ok(_) => summary.live_ok += 1,
                Err(e) => {
                    summary.live_failed += 1;
                    warn!("Scheduled live refresh failed for {}: {}", city, e);
                }
            }
            match outcome.forecast {
                Ok(_) => summary.forecast_ok += 1,
                Err(e) => {
                    summary.forecast_failed += 1;
                    warn!("Scheduled forecast refresh failed for {}: {}", city, e);
                }
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis();
        summary
    }

    /// Run until `token` is cancelled. The first tick runs immediately so
    /// the cache is warm before the first interval elapses.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Refresh scheduler started: {} city(ies) every {}s",
                self.cities.len(),
                self.interval.as_secs()
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                self.state.send_replace(SchedulerState::Running);
                // Cancellation aborts an in-progress tick at its next await.
                let summary = tokio::select! {
                    _ = token.cancelled() => break,
                    s = self.run_tick() => s,
                };
                self.state.send_replace(SchedulerState::Idle);
                info!(
                    "Refresh tick: live {}/{} forecast {}/{} in {}ms",
                    summary.live_ok,
                    summary.cities,
                    summary.forecast_ok,
                    summary.cities,
                    summary.elapsed_ms
                );
            }

            self.state.send_replace(SchedulerState::Stopped);
            info!("Refresh scheduler stopped");
        })
    }
}
