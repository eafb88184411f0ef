//! Secondary source: on-chain-pool-derived prices, chunked at the provider
//! address limit.

use async_trait::async_trait;
use serde::Deserialize;

use super::{BulkPriceSource, TokenPrice};
use crate::error::PriceError;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Addresses accepted per `tokens/multi` call.
pub const ADDRESSES_PER_CALL: usize = 30;

pub struct GeckoTerminalSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct MultiTokenResponse {
    #[serde(default)]
    data: Vec<TokenData>,
}

#[derive(Deserialize)]
struct TokenData {
    id: Option<String>,
    attributes: Option<TokenAttributes>,
}

#[derive(Deserialize)]
struct TokenAttributes {
    address: Option<String>,
    price_usd: Option<String>,
}

impl GeckoTerminalSource {
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

    async fn fetch_chunk(&self, mints: &[String]) -> Result<Vec<TokenPrice>, PriceError> {
        let url = format!(
            "{}/onchain/networks/solana/tokens/multi/{}",
            self.base_url,
            mints.join(",")
        );
        let mut request = self.http.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", api_key);
        }
        let response: MultiTokenResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .data
            .into_iter()
            .filter_map(|token| {
                let attributes = token.attributes?;
                // The address attribute is the mint; the id carries a
                // network prefix and only serves as a fallback.
                let id = attributes.address.or(token.id)?;
                let price = attributes.price_usd?.parse::<f64>().ok()?;
                Some(TokenPrice { id, price })
            })
            .collect())
    }
}

#[async_trait]
impl BulkPriceSource for GeckoTerminalSource {
    async fn prices(&self, mints: &[String]) -> Result<Vec<TokenPrice>, PriceError> {
        let mut prices = Vec::new();
        for chunk in mints.chunks(ADDRESSES_PER_CALL) {
            prices.extend(self.fetch_chunk(chunk).await?);
        }
        Ok(prices)
    }
}
