//! Primary bulk quote source.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{BulkPriceSource, TokenPrice};
use crate::error::PriceError;

pub const DEFAULT_BASE_URL: &str = "https://fe-api.jup.ag";

/// Aggregator price API: all requested mints in one call.
pub struct JupiterSource {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PricesResponse {
    #[serde(default)]
    prices: HashMap<String, f64>,
}

impl JupiterSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BulkPriceSource for JupiterSource {
    async fn prices(&self, mints: &[String]) -> Result<Vec<TokenPrice>, PriceError> {
        if mints.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/api/v1/prices?list_address={}",
            self.base_url,
            mints.join(",")
        );
        let response: PricesResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .prices
            .into_iter()
            .map(|(id, price)| TokenPrice { id, price })
            .collect())
    }
}
