//! Durable storage for snapshots and forecasts.
//!
//! Storage is best-effort relative to the in-memory cache: callers log and
//! swallow every error this crate returns.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, SnapshotRecord};

pub use sqlite::SqliteStore;

/// Persisted-store capability.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Append one live snapshot row.
    async fn append_snapshot(&self, record: &SnapshotRecord) -> Result<(), Error>;

    /// Insert or replace the serialized forecast for a city.
    async fn upsert_forecast(
        &self,
        city: &str,
        payload: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Most recently recorded snapshot for a city.
    async fn latest_snapshot(&self, city: &str) -> Result<Option<SnapshotRecord>, Error>;

    /// Stored forecast payload and the time it was written.
    async fn latest_forecast(&self, city: &str) -> Result<Option<(String, DateTime<Utc>)>, Error>;
}
