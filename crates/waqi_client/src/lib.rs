//! World Air Quality Index (aqicn.org) client.
//!
//! Exposes the upstream provider as the [`StationFeed`] capability so the
//! refresh layer can be exercised against test doubles.

pub mod client;
pub mod payload;

use async_trait::async_trait;
use common::UpstreamError;

pub use client::WaqiClient;
pub use payload::{parse_feed, DailyEntry, StationData};

/// Fetch current readings and the daily forecast for one station.
#[async_trait]
pub trait StationFeed: Send + Sync {
    async fn fetch_station(&self, station: &str) -> Result<StationData, UpstreamError>;
}
