//! The price-resolution cascade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{SingleFlight, key_for_ids};
use crate::error::PriceError;
use crate::sources::{BulkPriceSource, SpotPriceSource, TokenPrice};

/// How long a resolved mint set stays shared between callers.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Resolves current USD prices through an ordered source cascade with
/// per-mint early termination, and historical prices straight from the
/// time-series provider.
///
/// The full cascade for a mint set runs at most once per TTL window:
/// concurrent callers requesting the same (sorted) id set share one
/// upstream call sequence.
pub struct PriceResolver {
    primary: Arc<dyn BulkPriceSource>,
    secondary: Arc<dyn BulkPriceSource>,
    tertiary: Arc<dyn SpotPriceSource>,
    cache: SingleFlight<Vec<TokenPrice>>,
}

impl PriceResolver {
    pub fn new(
        primary: Arc<dyn BulkPriceSource>,
        secondary: Arc<dyn BulkPriceSource>,
        tertiary: Arc<dyn SpotPriceSource>,
    ) -> Self {
        Self {
            primary,
            secondary,
            tertiary,
            cache: SingleFlight::new(CACHE_TTL),
        }
    }

    /// Current USD prices for the requested mints. Mints no source can
    /// price are absent from the map; a price is never fabricated.
    pub async fn resolve(&self, mints: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        let mut requested: Vec<String> = mints.to_vec();
        requested.sort_unstable();
        requested.dedup();
        if requested.is_empty() {
            return Ok(HashMap::new());
        }

        let key = key_for_ids(&requested);
        let prices = self
            .cache
            .get_or_compute(&key, || self.run_cascade(requested.clone()))
            .await?;

        Ok(prices
            .into_iter()
            .map(|price| (price.id, price.price))
            .collect())
    }

    /// USD price of one mint at a unix timestamp. Bypasses both the cascade
    /// and the cache: each (mint, timestamp) pair is effectively unique.
    pub async fn historical(&self, mint: &str, unix_ts: i64) -> Result<Option<f64>, PriceError> {
        self.tertiary.price_at(mint, unix_ts).await
    }

    async fn run_cascade(&self, mints: Vec<String>) -> Result<Vec<TokenPrice>, PriceError> {
        let mut resolved: Vec<TokenPrice> = Vec::new();

        // Primary: one bulk call; a request failure resolves nothing and
        // the cascade carries on.
        match self.primary.prices(&mints).await {
            Ok(prices) => {
                resolved.extend(prices.into_iter().filter(|price| price.price > 0.0));
            }
            Err(err) => warn!(error = %err, "primary price source failed"),
        }

        let mut unresolved = remaining(&mints, &resolved);
        if !unresolved.is_empty() {
            match self.secondary.prices(&unresolved).await {
                Ok(prices) => {
                    resolved.extend(prices.into_iter().filter(|price| price.price > 0.0));
                }
                Err(err) => warn!(error = %err, "secondary price source failed"),
            }
            unresolved = remaining(&mints, &resolved);
        }

        for mint in unresolved {
            match self.tertiary.price(&mint).await {
                Ok(Some(price)) if price > 0.0 => resolved.push(TokenPrice { id: mint, price }),
                Ok(_) => debug!(mint, "no source could price mint"),
                Err(err) => warn!(mint, error = %err, "tertiary price source failed"),
            }
        }

        Ok(resolved)
    }
}

fn remaining(requested: &[String], resolved: &[TokenPrice]) -> Vec<String> {
    requested
        .iter()
        .filter(|mint| !resolved.iter().any(|price| &price.id == *mint))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticBulk {
        prices: Vec<(&'static str, f64)>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl StaticBulk {
        fn new(prices: Vec<(&'static str, f64)>) -> Self {
            Self {
                prices,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BulkPriceSource for StaticBulk {
        async fn prices(&self, mints: &[String]) -> Result<Vec<TokenPrice>, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(mints.to_vec());
            Ok(self
                .prices
                .iter()
                .filter(|(id, _)| mints.iter().any(|mint| mint == id))
                .map(|(id, price)| TokenPrice {
                    id: id.to_string(),
                    price: *price,
                })
                .collect())
        }
    }

    struct StaticSpot {
        prices: Vec<(&'static str, f64)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpotPriceSource for StaticSpot {
        async fn price(&self, mint: &str) -> Result<Option<f64>, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .prices
                .iter()
                .find(|(id, _)| *id == mint)
                .map(|(_, price)| *price))
        }

        async fn price_at(&self, mint: &str, _unix_ts: i64) -> Result<Option<f64>, PriceError> {
            self.price(mint).await
        }
    }

    fn mints(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_positive_source_wins() {
        let primary = Arc::new(StaticBulk::new(vec![("sol", 150.0), ("bonk", -1.0)]));
        let secondary = Arc::new(StaticBulk::new(vec![("sol", 140.0), ("bonk", 0.00002)]));
        let tertiary = Arc::new(StaticSpot {
            prices: vec![],
            calls: AtomicUsize::new(0),
        });
        let resolver = PriceResolver::new(primary.clone(), secondary.clone(), tertiary.clone());

        let prices = resolver.resolve(&mints(&["sol", "bonk"])).await.unwrap();
        // Primary wins for sol; the non-positive bonk quote falls through to
        // the secondary.
        assert_eq!(prices["sol"], 150.0);
        assert_eq!(prices["bonk"], 0.00002);
        // The secondary only ever saw the unresolved mint.
        assert_eq!(secondary.seen.lock().unwrap()[0], mints(&["bonk"]));
        assert_eq!(tertiary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tertiary_is_last_resort_per_mint() {
        let primary = Arc::new(StaticBulk::new(vec![]));
        let secondary = Arc::new(StaticBulk::new(vec![("sol", 150.0)]));
        let tertiary = Arc::new(StaticSpot {
            prices: vec![("wif", 2.5)],
            calls: AtomicUsize::new(0),
        });
        let resolver = PriceResolver::new(primary, secondary, tertiary.clone());

        let prices = resolver
            .resolve(&mints(&["sol", "wif", "ghost"]))
            .await
            .unwrap();
        assert_eq!(prices["sol"], 150.0);
        assert_eq!(prices["wif"], 2.5);
        // A mint no source can price is absent, not zero.
        assert!(!prices.contains_key("ghost"));
        assert_eq!(tertiary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_identical_requests_share_one_cascade() {
        let primary = Arc::new(StaticBulk::new(vec![("sol", 150.0)]));
        let secondary = Arc::new(StaticBulk::new(vec![]));
        let tertiary = Arc::new(StaticSpot {
            prices: vec![],
            calls: AtomicUsize::new(0),
        });
        let resolver =
            Arc::new(PriceResolver::new(primary.clone(), secondary, tertiary));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                // Request order must not matter for the cache key.
                tokio::spawn(async move { resolver.resolve(&mints(&["b", "sol", "a"])).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }
}
