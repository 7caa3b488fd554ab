//! Domain types shared across airwatch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── Pollutants ────────────────────────────────────────────────────────

/// Pollutants with a regulatory breakpoint table.
///
/// Declaration order doubles as the tie-break order when two pollutants
/// produce the same sub-index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Provider/wire key, e.g. `pm25`.
    pub fn key(self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    /// Canonical concentration unit the breakpoint table is expressed in.
    pub fn unit(self) -> &'static str {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => "µg/m³",
            Pollutant::O3 | Pollutant::No2 | Pollutant::So2 => "ppb",
            Pollutant::Co => "ppm",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::O3 => "O3",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
        };
        f.write_str(label)
    }
}

impl FromStr for Pollutant {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "o3" => Ok(Pollutant::O3),
            "no2" => Ok(Pollutant::No2),
            "so2" => Ok(Pollutant::So2),
            "co" => Ok(Pollutant::Co),
            other => Err(Error::InvalidArgument(format!("unknown pollutant '{other}'"))),
        }
    }
}

/// A validated, non-negative concentration in the pollutant's canonical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantConcentration {
    pub pollutant: Pollutant,
    pub value: f64,
}

impl PollutantConcentration {
    pub fn new(pollutant: Pollutant, value: f64) -> Result<Self, Error> {
        if !value.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "{pollutant} concentration must be a finite number, got {value}"
            )));
        }
        if value < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "{pollutant} concentration must be >= 0, got {value}"
            )));
        }
        Ok(Self { pollutant, value })
    }
}

// ── AQI ───────────────────────────────────────────────────────────────

/// Six ordered severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output of one AQI computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiResult {
    /// Max of all sub-indices, 0 when nothing was supplied.
    pub index: u32,
    pub category: AqiCategory,
    /// Only pollutants that had a concentration.
    pub sub_indices: BTreeMap<Pollutant, u32>,
}

impl AqiResult {
    pub fn empty() -> Self {
        Self {
            index: 0,
            category: AqiCategory::Good,
            sub_indices: BTreeMap::new(),
        }
    }

    /// Pollutant driving the headline index.
    pub fn dominant(&self) -> Option<Pollutant> {
        // BTreeMap iterates in declaration order, so the first max wins ties.
        let mut best: Option<(Pollutant, u32)> = None;
        for (&pollutant, &value) in &self.sub_indices {
            match best {
                Some((_, current)) if current >= value => {}
                _ => best = Some((pollutant, value)),
            }
        }
        best.map(|(p, _)| p)
    }
}

// ── Service results ───────────────────────────────────────────────────

/// Which slice of provider data a request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Live,
    Forecast,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Live => f.write_str("live"),
            DataKind::Forecast => f.write_str("forecast"),
        }
    }
}

/// Current conditions for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResult {
    pub city: String,
    pub station: String,
    #[serde(default)]
    pub station_name: Option<String>,
    pub aqi: AqiResult,
    #[serde(default)]
    pub dominant_pollutant: Option<Pollutant>,
    pub concentrations: BTreeMap<Pollutant, f64>,
    /// Observation time in the deployment's local offset.
    pub observed_at: DateTime<FixedOffset>,
    pub fetched_at: DateTime<Utc>,
}

/// Daily min/avg/max for one pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// One forecast day, merged across pollutants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub pollutants: BTreeMap<Pollutant, DailyAggregate>,
    /// Representative AQI for the day, 0 when no pollutant reported.
    pub aqi: u32,
    pub category: AqiCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub city: String,
    pub station: String,
    pub days: Vec<ForecastDay>,
    pub fetched_at: DateTime<Utc>,
}

/// Live conditions plus forecast; forecast is empty when it could not be loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteResult {
    pub live: LiveResult,
    pub forecast: Vec<ForecastDay>,
}

/// Row appended to durable storage for every successful live refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub city: String,
    pub recorded_at: DateTime<Utc>,
    pub live: LiveResult,
}

impl SnapshotRecord {
    pub fn from_live(live: &LiveResult) -> Self {
        Self {
            city: live.city.clone(),
            recorded_at: live.fetched_at,
            live: live.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_bands() {
        assert_eq!(AqiCategory::from_index(0), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(51), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_index(100), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_index(150), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(AqiCategory::from_index(200), AqiCategory::Unhealthy);
        assert_eq!(AqiCategory::from_index(300), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_index(301), AqiCategory::Hazardous);
        assert_eq!(AqiCategory::from_index(999), AqiCategory::Hazardous);
    }

    #[test]
    fn test_categories_are_ordered_by_severity() {
        assert!(AqiCategory::Good < AqiCategory::Moderate);
        assert!(AqiCategory::VeryUnhealthy < AqiCategory::Hazardous);
    }

    #[test]
    fn test_negative_concentration_rejected() {
        let err = PollutantConcentration::new(Pollutant::Pm25, -1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(PollutantConcentration::new(Pollutant::Co, f64::NAN).is_err());
        assert!(PollutantConcentration::new(Pollutant::Co, 0.0).is_ok());
    }

    #[test]
    fn test_pollutant_parses_aliases() {
        assert_eq!("PM2.5".parse::<Pollutant>().unwrap(), Pollutant::Pm25);
        assert_eq!("pm25".parse::<Pollutant>().unwrap(), Pollutant::Pm25);
        assert_eq!(" O3 ".parse::<Pollutant>().unwrap(), Pollutant::O3);
        assert!("uvi".parse::<Pollutant>().is_err());
    }

    #[test]
    fn test_dominant_prefers_declaration_order_on_ties() {
        let mut result = AqiResult::empty();
        result.sub_indices.insert(Pollutant::O3, 80);
        result.sub_indices.insert(Pollutant::Pm10, 80);
        result.sub_indices.insert(Pollutant::Co, 12);
        assert_eq!(result.dominant(), Some(Pollutant::Pm10));
        assert_eq!(AqiResult::empty().dominant(), None);
    }
}
