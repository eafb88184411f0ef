//! Tertiary source: time-series price provider, one call per mint; also the
//! only source of historical prices.

use async_trait::async_trait;
use serde::Deserialize;

use super::SpotPriceSource;
use crate::error::PriceError;

pub const DEFAULT_BASE_URL: &str = "https://data.solanatracker.io";

pub struct SolanaTrackerSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct PriceResponse {
    price: Option<f64>,
}

impl SolanaTrackerSource {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self::with_base_url(http, DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    async fn fetch(&self, url: String) -> Result<Option<f64>, PriceError> {
        let mut request = self.http.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: PriceResponse = response.error_for_status()?.json().await?;
        Ok(body.price)
    }
}

#[async_trait]
impl SpotPriceSource for SolanaTrackerSource {
    async fn price(&self, mint: &str) -> Result<Option<f64>, PriceError> {
        self.fetch(format!("{}/price?token={mint}", self.base_url))
            .await
    }

    async fn price_at(&self, mint: &str, unix_ts: i64) -> Result<Option<f64>, PriceError> {
        self.fetch(format!(
            "{}/price/history/timestamp?token={mint}&timestamp={unix_ts}",
            self.base_url
        ))
        .await
    }
}
