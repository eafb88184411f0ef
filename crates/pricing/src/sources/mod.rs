//! Price provider clients. Every optional field in a provider response is
//! modeled as an optional type at this boundary; defaulting happens at the
//! consumption site, never here.

mod gecko;
mod jupiter;
mod tracker;

pub use gecko::GeckoTerminalSource;
pub use jupiter::JupiterSource;
pub use tracker::SolanaTrackerSource;

use async_trait::async_trait;

use crate::error::PriceError;

/// A resolved quote for one mint.
#[derive(Debug, Clone)]
pub struct TokenPrice {
    pub id: String,
    pub price: f64,
}

/// Current prices for a list of mints in one round trip (possibly chunked
/// internally). Mints the source does not know are simply absent.
#[async_trait]
pub trait BulkPriceSource: Send + Sync {
    async fn prices(&self, mints: &[String]) -> Result<Vec<TokenPrice>, PriceError>;
}

/// Per-mint current and historical prices from a time-series provider.
#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    async fn price(&self, mint: &str) -> Result<Option<f64>, PriceError>;

    /// Price at a unix timestamp; `None` when the provider has no data
    /// around that time.
    async fn price_at(&self, mint: &str, unix_ts: i64) -> Result<Option<f64>, PriceError>;
}
