//! Forecast aggregation.
//!
//! The provider reports per-pollutant daily min/avg/max series. These are
//! merged by calendar day, past days are dropped, and each day gets a
//! representative AQI from the first pollutant present in
//! [`FORECAST_PRIORITY`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{AqiCategory, DailyAggregate, ForecastDay, Pollutant};
use tracing::debug;
use waqi_client::DailyEntry;

/// Pollutant whose daily average represents the day, in order of preference.
pub const FORECAST_PRIORITY: [Pollutant; 3] = [Pollutant::Pm25, Pollutant::Pm10, Pollutant::O3];

/// Merge raw daily series into one entry per day on or after `today`.
pub fn aggregate_forecast(
    daily: &BTreeMap<String, Vec<DailyEntry>>,
    today: NaiveDate,
) -> Vec<ForecastDay> {
    let mut by_day: BTreeMap<NaiveDate, BTreeMap<Pollutant, DailyAggregate>> = BTreeMap::new();

    for (key, entries) in daily {
        // Non-pollutant series such as `uvi` are ignored.
        let Ok(pollutant) = key.parse::<Pollutant>() else {
            continue;
        };

        for entry in entries {
            let date = match NaiveDate::parse_from_str(entry.day.trim(), "%Y-%m-%d") {
                Ok(d) => d,
                Err(e) => {
                    debug!("Skipping {} forecast entry with day '{}': {}", key, entry.day, e);
                    continue;
                }
            };
            if date < today {
                continue;
            }
            let (Some(min), Some(avg), Some(max)) = (entry.min, entry.avg, entry.max) else {
                debug!("Skipping incomplete {} forecast entry for {}", key, date);
                continue;
            };
            by_day
                .entry(date)
                .or_default()
                .insert(pollutant, DailyAggregate { min, avg, max });
        }
    }

    by_day
        .into_iter()
        .map(|(date, pollutants)| {
            let aqi = representative_aqi(&pollutants);
            ForecastDay {
                date,
                pollutants,
                aqi,
                category: AqiCategory::from_index(aqi),
            }
        })
        .collect()
}

fn representative_aqi(pollutants: &BTreeMap<Pollutant, DailyAggregate>) -> u32 {
    FORECAST_PRIORITY
        .iter()
        .find_map(|p| pollutants.get(p))
        .map(|agg| agg.avg.max(0.0).round() as u32)
        .unwrap_or(0)
}
