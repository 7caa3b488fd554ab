//! SQLite-backed [`SnapshotStore`].
//!
//! rusqlite is synchronous, so every call hops onto the blocking pool and
//! serializes on a single connection.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::{Error, SnapshotRecord};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::SnapshotStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS aqi_snapshots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    city        TEXT NOT NULL,
    station     TEXT NOT NULL,
    aqi         INTEGER NOT NULL,
    category    TEXT NOT NULL,
    observed_at TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    payload     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_aqi_snapshots_city_recorded
    ON aqi_snapshots (city, recorded_at);
CREATE TABLE IF NOT EXISTS aqi_forecasts (
    city       TEXT PRIMARY KEY,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Persistence(e.to_string())
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Persistence(format!("bad stored timestamp '{}': {}", raw, e)))
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Persistence("sqlite connection lock poisoned".into()))?;
            op(&guard)
        })
        .await
        .map_err(|e| Error::Persistence(format!("storage task failed: {}", e)))?
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn append_snapshot(&self, record: &SnapshotRecord) -> Result<(), Error> {
        let payload = serde_json::to_string(&record.live)?;
        let city = record.city.clone();
        let station = record.live.station.clone();
        let aqi = record.live.aqi.index;
        let category = record.live.aqi.category.label().to_string();
        let observed_at = record.live.observed_at.to_rfc3339();
        let recorded_at = ts(record.recorded_at);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO aqi_snapshots
                    (city, station, aqi, category, observed_at, recorded_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![city, station, aqi, category, observed_at, recorded_at, payload],
            )
            .map_err(db_err)?;
            debug!("Appended snapshot for {}", city);
            Ok(())
        })
        .await
    }

    async fn upsert_forecast(
        &self,
        city: &str,
        payload: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Error> {
        let city = city.to_string();
        let payload = payload.to_string();
        let updated_at = ts(timestamp);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO aqi_forecasts (city, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(city) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![city, payload, updated_at],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn latest_snapshot(&self, city: &str) -> Result<Option<SnapshotRecord>, Error> {
        let city = city.to_string();

        self.with_conn(move |conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT recorded_at, payload FROM aqi_snapshots
                     WHERE city = ?1
                     ORDER BY recorded_at DESC, id DESC
                     LIMIT 1",
                    params![city],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(db_err)?;

            match row {
                Some((recorded_at, payload)) => Ok(Some(SnapshotRecord {
                    city,
                    recorded_at: parse_ts(&recorded_at)?,
                    live: serde_json::from_str(&payload)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn latest_forecast(&self, city: &str) -> Result<Option<(String, DateTime<Utc>)>, Error> {
        let city = city.to_string();

        self.with_conn(move |conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT payload, updated_at FROM aqi_forecasts WHERE city = ?1",
                    params![city],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(db_err)?;

            row.map(|(payload, updated_at)| Ok((payload, parse_ts(&updated_at)?)))
                .transpose()
        })
        .await
    }
}
