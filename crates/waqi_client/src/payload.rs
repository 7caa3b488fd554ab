//! WAQI feed response types.
//!
//! `GET /feed/{station}/?token=…` answers with an envelope whose `data`
//! is either the station object (`status: "ok"`) or a plain error string.

use std::collections::BTreeMap;

use common::{Pollutant, UpstreamError};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Station payload for a successful feed call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationData {
    /// Provider's own headline AQI; may be `"-"` when unavailable.
    #[serde(default)]
    pub aqi: serde_json::Value,
    #[serde(default)]
    pub idx: Option<i64>,
    #[serde(default)]
    pub city: Option<StationCity>,
    #[serde(rename = "dominentpol", default)]
    pub dominant_pollutant: Option<String>,
    #[serde(default)]
    pub iaqi: BTreeMap<String, IaqiValue>,
    #[serde(default)]
    pub time: Option<StationTime>,
    /// A malformed forecast block is dropped so live readings survive.
    #[serde(default, deserialize_with = "lenient_forecast")]
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationCity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub geo: Vec<f64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IaqiValue {
    pub v: f64,
}

/// Observation time as reported by the station.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StationTime {
    /// Local wall-clock string, e.g. "2024-05-01 13:00:00".
    #[serde(default)]
    pub s: Option<String>,
    #[serde(default)]
    pub tz: Option<String>,
    /// Unix epoch seconds.
    #[serde(default)]
    pub v: Option<i64>,
    #[serde(default)]
    pub iso: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Forecast {
    #[serde(default)]
    pub daily: BTreeMap<String, Vec<DailyEntry>>,
}

/// Per-pollutant daily aggregate. The provider sometimes omits fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DailyEntry {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

fn lenient_forecast<'de, D>(deserializer: D) -> Result<Option<Forecast>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(raw) {
        Ok(forecast) => Ok(Some(forecast)),
        Err(e) => {
            warn!("Ignoring malformed forecast block: {}", e);
            Ok(None)
        }
    }
}

impl StationData {
    /// Reading per supported pollutant; `None` when the station did not report it.
    pub fn concentrations(&self) -> BTreeMap<Pollutant, Option<f64>> {
        Pollutant::ALL
            .iter()
            .map(|&p| (p, self.iaqi.get(p.key()).map(|v| v.v)))
            .collect()
    }

    pub fn observed_iso(&self) -> Option<&str> {
        self.time.as_ref().and_then(|t| t.iso.as_deref())
    }

    pub fn observed_epoch(&self) -> Option<i64> {
        self.time.as_ref().and_then(|t| t.v)
    }

    pub fn station_name(&self) -> Option<&str> {
        self.city.as_ref().and_then(|c| c.name.as_deref())
    }

    /// Raw daily forecast keyed by pollutant key; empty when absent.
    pub fn daily_forecast(&self) -> BTreeMap<String, Vec<DailyEntry>> {
        self.forecast
            .as_ref()
            .map(|f| f.daily.clone())
            .unwrap_or_default()
    }
}

/// Decode a feed response body.
pub fn parse_feed(body: &str) -> Result<StationData, UpstreamError> {
    let envelope: FeedEnvelope = serde_json::from_str(body).map_err(|e| UpstreamError::Protocol {
        status: None,
        message: format!("malformed feed body: {}", e),
    })?;

    if envelope.status != "ok" {
        let reason = match envelope.data {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => format!("status '{}'", envelope.status),
            other => other.to_string(),
        };
        return Err(UpstreamError::Business(reason));
    }

    serde_json::from_value(envelope.data).map_err(|e| UpstreamError::Protocol {
        status: None,
        message: format!("unexpected station payload: {}", e),
    })
}
