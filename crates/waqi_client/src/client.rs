//! HTTP client for `api.waqi.info`.

use std::time::Duration;

use async_trait::async_trait;
use common::{Error, UpstreamError};
use tracing::debug;

use crate::payload::{parse_feed, StationData};
use crate::StationFeed;

/// WAQI API client with connection pooling and User-Agent header.
///
/// The API token is injected at construction and only ever sent as a
/// query parameter; it is never logged.
#[derive(Clone)]
pub struct WaqiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for WaqiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaqiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WaqiClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("airwatch/0.1")
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build WAQI HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn feed_url(&self, station: &str) -> String {
        format!("{}/feed/{}/", self.base_url, station.trim())
    }
}

#[async_trait]
impl StationFeed for WaqiClient {
    async fn fetch_station(&self, station: &str) -> Result<StationData, UpstreamError> {
        let url = self.feed_url(station);
        debug!("Fetching WAQI feed: {}", url);

        let resp = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::Network(format!("HTTP error for {}: {}", station, e)))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| UpstreamError::Network(format!("body read failed for {}: {}", station, e)))?;

        if status != 200 {
            return Err(UpstreamError::Protocol {
                status: Some(status),
                message: format!(
                    "WAQI returned {} for {}: {}",
                    status,
                    station,
                    body.chars().take(500).collect::<String>()
                ),
            });
        }

        let data = parse_feed(&body)?;
        debug!(
            "Got {} readings for {} (station idx {:?})",
            data.iaqi.len(),
            station,
            data.idx
        );
        Ok(data)
    }
}
