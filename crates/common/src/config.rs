//! Service configuration types.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// WAQI API token.
    #[serde(default)]
    pub waqi_token: String,

    /// Provider base URL (no trailing slash).
    #[serde(default = "default_base_url")]
    pub waqi_base_url: String,

    /// Deployment local time zone as a fixed UTC offset, e.g. "+07:00".
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// City → provider station registry.
    #[serde(default = "default_cities")]
    pub cities: Vec<CityConfig>,

    /// Cities the background scheduler keeps warm. Empty means the first
    /// configured city.
    #[serde(default)]
    pub warm_cities: Vec<String>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub aqi: AqiConfig,
}

/// Configuration for a single city.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityConfig {
    /// Human-readable name, also the lookup key (case-insensitive).
    pub name: String,
    /// Provider station identifier (e.g. "hanoi" or "@1583").
    pub station: String,
}

/// Freshness windows (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_live_ttl")]
    pub live_ttl_secs: u64,

    #[serde(default = "default_forecast_ttl")]
    pub forecast_ttl_secs: u64,

    /// Max age of a persisted snapshot still served when upstream is down.
    #[serde(default = "default_snapshot_fallback")]
    pub snapshot_fallback_secs: u64,
}

/// Timing configuration (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Background refresh interval.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Upstream HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AqiConfig {
    /// Optional TOML file replacing the built-in breakpoint tables.
    #[serde(default)]
    pub breakpoints_path: Option<String>,
}

impl ServiceConfig {
    /// Look up a configured city by name, ignoring case and surrounding space.
    pub fn city(&self, name: &str) -> Option<&CityConfig> {
        let wanted = name.trim();
        self.cities
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(wanted))
    }

    /// Parsed `utc_offset`.
    pub fn local_offset(&self) -> Result<FixedOffset, Error> {
        self.utc_offset.trim().parse::<FixedOffset>().map_err(|e| {
            Error::Config(format!(
                "utc_offset '{}' is not a valid offset like +07:00: {}",
                self.utc_offset, e
            ))
        })
    }

    /// Warm set, falling back to the first configured city.
    pub fn warm_set(&self) -> Vec<String> {
        if !self.warm_cities.is_empty() {
            return self.warm_cities.clone();
        }
        self.cities.iter().take(1).map(|c| c.name.clone()).collect()
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.waqi.info".into()
}
fn default_utc_offset() -> String {
    "+07:00".into()
}

fn default_live_ttl() -> u64 {
    600
}
fn default_forecast_ttl() -> u64 {
    7200
}
fn default_snapshot_fallback() -> u64 {
    3600
}

fn default_refresh_interval() -> u64 {
    600
}
fn default_request_timeout() -> u64 {
    30
}
fn default_heartbeat_interval() -> u64 {
    60
}

fn default_sqlite_path() -> String {
    "airwatch.db".into()
}

fn default_cities() -> Vec<CityConfig> {
    vec![
        CityConfig {
            name: "Hanoi".into(),
            station: "hanoi".into(),
        },
        CityConfig {
            name: "Ho Chi Minh City".into(),
            station: "saigon".into(),
        },
    ]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            live_ttl_secs: default_live_ttl(),
            forecast_ttl_secs: default_forecast_ttl(),
            snapshot_fallback_secs: default_snapshot_fallback(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            request_timeout_secs: default_request_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            waqi_token: String::new(),
            waqi_base_url: default_base_url(),
            utc_offset: default_utc_offset(),
            cities: default_cities(),
            warm_cities: Vec::new(),
            cache: CacheConfig::default(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
            aqi: AqiConfig::default(),
        }
    }
}
