//! Fetch-and-refresh orchestrator.
//!
//! Single entry point for live and forecast data. Serves from the
//! freshness cache when possible, otherwise calls the upstream feed,
//! computes the result, writes it back to the cache and (best-effort) to
//! durable storage. This is the only layer that turns upstream or storage
//! failures into caller-facing errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aqi::AqiCalculator;
use chrono::{FixedOffset, NaiveDate, Utc};
use common::config::CityConfig;
use common::{
    CompleteResult, DataKind, Error, ForecastDay, ForecastResult, LiveResult, Pollutant,
    PollutantConcentration, ServiceConfig, SnapshotRecord, UpstreamError,
};
use dashmap::DashMap;
use store::SnapshotStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use waqi_client::{StationData, StationFeed};

use crate::cache::FreshnessCache;
use crate::forecast::aggregate_forecast;
use crate::timestamp::resolve_observed_at;

/// Freshness windows and locale used by the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub live_ttl: Duration,
    pub forecast_ttl: Duration,
    /// Max age of a persisted snapshot served when upstream is failing.
    pub snapshot_fallback: Duration,
    pub local_offset: FixedOffset,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self, Error> {
        Ok(Self {
            live_ttl: Duration::from_secs(cfg.cache.live_ttl_secs),
            forecast_ttl: Duration::from_secs(cfg.cache.forecast_ttl_secs),
            snapshot_fallback: Duration::from_secs(cfg.cache.snapshot_fallback_secs),
            local_offset: cfg.local_offset()?,
        })
    }
}

/// A city resolved against the registry.
#[derive(Debug, Clone)]
struct Target {
    /// Cache/in-flight key.
    key: String,
    /// Display name and storage key.
    name: String,
    station: String,
}

pub struct Orchestrator {
    feed: Arc<dyn StationFeed>,
    store: Option<Arc<dyn SnapshotStore>>,
    calculator: AqiCalculator,
    registry: HashMap<String, CityConfig>,
    settings: OrchestratorSettings,
    live_cache: FreshnessCache<LiveResult>,
    forecast_cache: FreshnessCache<ForecastResult>,
    in_flight: DashMap<(String, DataKind), Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        feed: Arc<dyn StationFeed>,
        calculator: AqiCalculator,
        cities: &[CityConfig],
        settings: OrchestratorSettings,
    ) -> Self {
        let registry = cities
            .iter()
            .map(|c| (c.name.trim().to_lowercase(), c.clone()))
            .collect();

        Self {
            feed,
            store: None,
            calculator,
            registry,
            settings,
            live_cache: FreshnessCache::new(),
            forecast_cache: FreshnessCache::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Attach durable storage. Without it the orchestrator is cache-only.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Number of cached (live, forecast) entries, fresh or not.
    pub fn cached_counts(&self) -> (usize, usize) {
        (self.live_cache.len(), self.forecast_cache.len())
    }

    fn resolve(&self, city: &str) -> Result<Target, Error> {
        let trimmed = city.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("city must not be empty".into()));
        }
        let key = trimmed.to_lowercase();

        let (name, station) = match self.registry.get(&key) {
            Some(c) => (c.name.clone(), c.station.clone()),
            // Unregistered cities go to the provider verbatim.
            None => (trimmed.to_string(), trimmed.to_string()),
        };
        Ok(Target { key, name, station })
    }

    fn flight_lock(&self, key: &str, kind: DataKind) -> Arc<Mutex<()>> {
        self.in_flight
            .entry((key.to_string(), kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_flight(&self, key: &str, kind: DataKind) {
        // Only the map holds the lock once every waiter is done.
        self.in_flight
            .remove_if(&(key.to_string(), kind), |_, lock| Arc::strong_count(lock) == 1);
    }

    // ── Live ─────────────────────────────────────────────────────────

    /// Current conditions for `city`, from cache unless stale or `force_fresh`.
    pub async fn get_live(&self, city: &str, force_fresh: bool) -> Result<LiveResult, Error> {
        let target = self.resolve(city)?;

        if !force_fresh {
            if let Some(hit) = self.live_cache.get(&target.key, self.settings.live_ttl) {
                debug!("Live cache hit for {}", target.name);
                return Ok(hit);
            }
        }

        let started = Instant::now();
        let lock = self.flight_lock(&target.key, DataKind::Live);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_live(&target, started, force_fresh).await
        };
        drop(lock);
        self.release_flight(&target.key, DataKind::Live);
        result
    }

    async fn refresh_live(
        &self,
        target: &Target,
        started: Instant,
        force_fresh: bool,
    ) -> Result<LiveResult, Error> {
        // A fetch that completed while we waited for the lock satisfies us.
        if let Some(entry) = self.live_cache.get_entry(&target.key, self.settings.live_ttl) {
            if !force_fresh || entry.stored_at >= started {
                debug!("Live data for {} refreshed by a concurrent request", target.name);
                return Ok(entry.payload);
            }
        }

        match self.feed.fetch_station(&target.station).await {
            Ok(data) => Ok(self.accept_live(target, &data).await),
            Err(e) => {
                warn!(
                    "Upstream live fetch failed for {} (station {}): {}",
                    target.name, target.station, e
                );
                self.live_fallback(target, e).await
            }
        }
    }

    /// Compute, cache and persist a live result from a successful fetch.
    async fn accept_live(&self, target: &Target, data: &StationData) -> LiveResult {
        let live = self.build_live(target, data);
        self.live_cache.set(&target.key, live.clone());
        info!(
            "Refreshed live AQI for {}: {} ({})",
            target.name, live.aqi.index, live.aqi.category
        );
        self.persist_snapshot(&live).await;
        live
    }

    fn build_live(&self, target: &Target, data: &StationData) -> LiveResult {
        let mut readings: BTreeMap<Pollutant, Option<f64>> = BTreeMap::new();
        for (pollutant, value) in data.concentrations() {
            let checked = match value.map(|v| PollutantConcentration::new(pollutant, v)) {
                Some(Ok(c)) => Some(c.value),
                Some(Err(e)) => {
                    warn!("Discarding reading for {}: {}", target.name, e);
                    None
                }
                None => None,
            };
            readings.insert(pollutant, checked);
        }

        let aqi = self.calculator.compute(&readings);
        let concentrations = readings
            .iter()
            .filter_map(|(&p, v)| v.map(|value| (p, value)))
            .collect();
        let now = Utc::now();

        LiveResult {
            city: target.name.clone(),
            station: target.station.clone(),
            station_name: data.station_name().map(str::to_string),
            dominant_pollutant: aqi.dominant(),
            aqi,
            concentrations,
            observed_at: resolve_observed_at(
                data.observed_iso(),
                data.observed_epoch(),
                self.settings.local_offset,
                now,
            ),
            fetched_at: now,
        }
    }

    async fn live_fallback(&self, target: &Target, cause: UpstreamError) -> Result<LiveResult, Error> {
        if let Some(hit) = self.live_cache.get(&target.key, self.settings.live_ttl) {
            info!("Serving cached live data for {} after upstream failure", target.name);
            return Ok(hit);
        }

        if let Some(store) = &self.store {
            match store.latest_snapshot(&target.name).await {
                Ok(Some(snapshot)) => {
                    let age = (Utc::now() - snapshot.recorded_at)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if age <= self.settings.snapshot_fallback {
                        info!(
                            "Serving stored snapshot for {} ({}s old) after upstream failure",
                            target.name,
                            age.as_secs()
                        );
                        return Ok(snapshot.live);
                    }
                    debug!("Stored snapshot for {} too old ({}s)", target.name, age.as_secs());
                }
                Ok(None) => {}
                Err(e) => warn!("Snapshot lookup failed for {}: {}", target.name, e),
            }
        }

        Err(Error::data_unavailable(&target.name, DataKind::Live, cause.to_string()))
    }

    async fn persist_snapshot(&self, live: &LiveResult) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.append_snapshot(&SnapshotRecord::from_live(live)).await {
            warn!("Failed to persist snapshot for {}: {}", live.city, e);
        }
    }

    // ── Forecast ─────────────────────────────────────────────────────

    /// Daily forecast for `city` from today onwards.
    pub async fn get_forecast(&self, city: &str, force_fresh: bool) -> Result<ForecastResult, Error> {
        let target = self.resolve(city)?;

        if !force_fresh {
            if let Some(hit) = self.forecast_cache.get(&target.key, self.settings.forecast_ttl) {
                debug!("Forecast cache hit for {}", target.name);
                return Ok(hit);
            }
        }

        let started = Instant::now();
        let lock = self.flight_lock(&target.key, DataKind::Forecast);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_forecast(&target, started, force_fresh).await
        };
        drop(lock);
        self.release_flight(&target.key, DataKind::Forecast);
        result
    }

    async fn refresh_forecast(
        &self,
        target: &Target,
        started: Instant,
        force_fresh: bool,
    ) -> Result<ForecastResult, Error> {
        if let Some(entry) = self.forecast_cache.get_entry(&target.key, self.settings.forecast_ttl) {
            if !force_fresh || entry.stored_at >= started {
                debug!("Forecast for {} refreshed by a concurrent request", target.name);
                return Ok(entry.payload);
            }
        }

        match self.feed.fetch_station(&target.station).await {
            Ok(data) => Ok(self.accept_forecast(target, &data).await),
            Err(e) => {
                warn!(
                    "Upstream forecast fetch failed for {} (station {}): {}",
                    target.name, target.station, e
                );
                self.forecast_fallback(target, e).await
            }
        }
    }

    async fn accept_forecast(&self, target: &Target, data: &StationData) -> ForecastResult {
        let forecast = ForecastResult {
            city: target.name.clone(),
            station: target.station.clone(),
            days: aggregate_forecast(&data.daily_forecast(), self.today()),
            fetched_at: Utc::now(),
        };
        self.forecast_cache.set(&target.key, forecast.clone());
        info!(
            "Refreshed forecast for {}: {} day(s)",
            target.name,
            forecast.days.len()
        );
        self.persist_forecast(&forecast).await;
        forecast
    }

    async fn forecast_fallback(
        &self,
        target: &Target,
        cause: UpstreamError,
    ) -> Result<ForecastResult, Error> {
        if let Some(hit) = self.forecast_cache.get(&target.key, self.settings.forecast_ttl) {
            info!("Serving cached forecast for {} after upstream failure", target.name);
            return Ok(hit);
        }

        if let Some(store) = &self.store {
            match store.latest_forecast(&target.name).await {
                Ok(Some((payload, updated_at))) => {
                    let age = (Utc::now() - updated_at).to_std().unwrap_or(Duration::ZERO);
                    if age <= self.settings.forecast_ttl {
                        match serde_json::from_str::<Vec<ForecastDay>>(&payload) {
                            Ok(days) => {
                                let today = self.today();
                                info!("Serving stored forecast for {} after upstream failure", target.name);
                                return Ok(ForecastResult {
                                    city: target.name.clone(),
                                    station: target.station.clone(),
                                    days: days.into_iter().filter(|d| d.date >= today).collect(),
                                    fetched_at: updated_at,
                                });
                            }
                            Err(e) => warn!("Stored forecast for {} is unreadable: {}", target.name, e),
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Forecast lookup failed for {}: {}", target.name, e),
            }
        }

        Err(Error::data_unavailable(&target.name, DataKind::Forecast, cause.to_string()))
    }

    async fn persist_forecast(&self, forecast: &ForecastResult) {
        let Some(store) = &self.store else {
            return;
        };
        let payload = match serde_json::to_string(&forecast.days) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize forecast for {}: {}", forecast.city, e);
                return;
            }
        };
        if let Err(e) = store
            .upsert_forecast(&forecast.city, &payload, forecast.fetched_at)
            .await
        {
            warn!("Failed to persist forecast for {}: {}", forecast.city, e);
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now()
            .with_timezone(&self.settings.local_offset)
            .date_naive()
    }

    // ── Combined ─────────────────────────────────────────────────────

    /// Live plus forecast. A forecast failure degrades to an empty forecast;
    /// a live failure fails the whole request.
    pub async fn get_complete(&self, city: &str, force_fresh: bool) -> Result<CompleteResult, Error> {
        let live = self.get_live(city, force_fresh).await?;
        let forecast = match self.get_forecast(city, force_fresh).await {
            Ok(f) => f.days,
            Err(e) => {
                warn!("Returning live data without forecast for {}: {}", live.city, e);
                Vec::new()
            }
        };
        Ok(CompleteResult { live, forecast })
    }

    /// Force-refresh live and forecast for `city` from one upstream fetch.
    ///
    /// Both in-flight locks are held for the duration, always live first,
    /// so concurrent single-kind requests wait and then reuse the result.
    pub async fn refresh_city(&self, city: &str) -> Result<CityRefresh, Error> {
        let target = self.resolve(city)?;

        let live_lock = self.flight_lock(&target.key, DataKind::Live);
        let forecast_lock = self.flight_lock(&target.key, DataKind::Forecast);
        let outcome = {
            let _live = live_lock.lock().await;
            let _forecast = forecast_lock.lock().await;

            match self.feed.fetch_station(&target.station).await {
                Ok(data) => CityRefresh {
                    live: Ok(self.accept_live(&target, &data).await),
                    forecast: Ok(self.accept_forecast(&target, &data).await),
                },
                Err(e) => {
                    warn!(
                        "Upstream refresh failed for {} (station {}): {}",
                        target.name, target.station, e
                    );
                    CityRefresh {
                        live: self.live_fallback(&target, e.clone()).await,
                        forecast: self.forecast_fallback(&target, e).await,
                    }
                }
            }
        };
        drop(live_lock);
        drop(forecast_lock);
        self.release_flight(&target.key, DataKind::Live);
        self.release_flight(&target.key, DataKind::Forecast);
        Ok(outcome)
    }
}

/// Per-kind outcome of [`Orchestrator::refresh_city`].
#[derive(Debug)]
pub struct CityRefresh {
    pub live: Result<LiveResult, Error>,
    pub forecast: Result<ForecastResult, Error>,
}
