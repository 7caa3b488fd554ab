//! Observation time resolution for upstream readings.
//!
//! One rule everywhere: ISO-8601 from the payload, else Unix epoch seconds,
//! else the current time. The result is always expressed in the
//! deployment's local offset.
//!
//! `now` is injected so the fallback is deterministic in tests.

use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

pub fn resolve_observed_at(
    iso: Option<&str>,
    epoch_secs: Option<i64>,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> DateTime<FixedOffset> {
    if let Some(raw) = iso {
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(t) => return t.with_timezone(&offset),
            Err(e) => debug!("Unparsable ISO timestamp '{}': {}", raw, e),
        }
    }

    if let Some(secs) = epoch_secs {
        if let Some(t) = DateTime::<Utc>::from_timestamp(secs, 0) {
            return t.with_timezone(&offset);
        }
        debug!("Epoch timestamp {} out of range", secs);
    }

    now.with_timezone(&offset)
}
