//! Pair/mint synchronization: one [`PoolProtocol`] implementation per
//! supported AMM, all driven by the same generic [`Synchronizer`].

mod meteora;
mod mints;
mod orca;
mod raydium;
mod saros;

pub use meteora::MeteoraProtocol;
pub use mints::ensure_mints;
pub use orca::OrcaProtocol;
pub use raydium::RaydiumProtocol;
pub use saros::SarosProtocol;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use poolscope_data::{Database, MintRecord, NewPair, PairSyncUpdate, PairWithMints};
use poolscope_domain::{Market, to_ui_amount};
use poolscope_pricing::{PriceResolver, SingleFlight, cache::key_for_ids};
use poolscope_protocols::rpc::{AccountFetcher, fetch_accounts_chunked};
use poolscope_protocols::token::decode_token_amount;
use poolscope_protocols::{FeeBreakdown, MAX_ACCOUNTS_PER_FETCH};

use crate::error::EngineError;

/// Identity fields of a decoded pool: written once at creation, never
/// touched by later syncs.
#[derive(Debug, Clone)]
pub struct PoolIdentity {
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    /// Farming rewards; system-program-owned slots are already filtered
    /// out.
    pub reward_mints: Vec<Pubkey>,
    /// Protocol-specific auxiliary fields (e.g. vault addresses).
    pub extra: serde_json::Value,
}

/// Protocol-specific half of the synchronizer: account decode, fee
/// normalization and vault location. The shared algorithm lives in
/// [`Synchronizer`].
#[async_trait]
pub trait PoolProtocol: Send + Sync {
    /// Decoded pool state plus whatever auxiliary accounts the fee formulas
    /// need (amm config, adaptive-fee oracle).
    type State: Send + Sync;

    const MARKET: Market;

    /// Fetches and decodes pool accounts, aligned with `ids`. Accounts that
    /// do not exist or do not decode come back as `None`; absence is not
    /// an error.
    async fn fetch_states(
        &self,
        fetcher: &dyn AccountFetcher,
        ids: &[Pubkey],
    ) -> Result<Vec<Option<Self::State>>, EngineError>;

    fn identity(&self, state: &Self::State) -> PoolIdentity;

    fn fees(&self, state: &Self::State) -> FeeBreakdown;

    /// Addresses of the two token-vault accounts backing the pool's
    /// reserves.
    fn vaults(
        &self,
        pool: &Pubkey,
        state: &Self::State,
        base_mint: &MintRecord,
        quote_mint: &MintRecord,
    ) -> Result<(Pubkey, Pubkey), EngineError>;
}

/// Single-flight cache over ensure results, shared by every synchronizer
/// and keyed on the market-prefixed, sorted pool-id set.
pub type PairCache = SingleFlight<Vec<PairWithMints>>;

/// Generic pair synchronizer: loads persisted pairs, discovers missing ones
/// on chain, upserts mints and pairs idempotently, and refreshes
/// fee/reserve fields.
pub struct Synchronizer<P: PoolProtocol> {
    protocol: P,
    db: Database,
    fetcher: Arc<dyn AccountFetcher>,
    prices: Arc<PriceResolver>,
    cache: Arc<PairCache>,
}

impl<P: PoolProtocol> Synchronizer<P> {
    pub fn new(
        protocol: P,
        db: Database,
        fetcher: Arc<dyn AccountFetcher>,
        prices: Arc<PriceResolver>,
        cache: Arc<PairCache>,
    ) -> Self {
        Self {
            protocol,
            db,
            fetcher,
            prices,
            cache,
        }
    }

    /// Returns the persisted pairs for `pool_ids`, creating any that are
    /// missing from on-chain state. Pools that do not exist on chain, or
    /// that cannot be valued this cycle, are absent from the result.
    ///
    /// Concurrent calls for the same id set collapse into one
    /// fetch/upsert sequence; late callers receive the in-flight result.
    pub async fn ensure_pairs(
        &self,
        pool_ids: &[String],
    ) -> Result<Vec<PairWithMints>, EngineError> {
        if pool_ids.len() > MAX_ACCOUNTS_PER_FETCH {
            return Err(EngineError::BatchTooLarge(pool_ids.len()));
        }
        let mut ids: Vec<String> = pool_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let key = format!("{}:{}", P::MARKET, key_for_ids(&ids));
        self.cache
            .get_or_compute(&key, || self.ensure_uncached(ids.clone()))
            .await
    }

    async fn ensure_uncached(
        &self,
        pool_ids: Vec<String>,
    ) -> Result<Vec<PairWithMints>, EngineError> {
        let mut all = self.db.pairs().find_by_ids(&pool_ids).await?;

        let missing: Vec<Pubkey> = pool_ids
            .iter()
            .filter(|id| !all.iter().any(|existing| &existing.pair.id == *id))
            .map(|id| id.parse().map_err(poolscope_protocols::ProtocolError::from))
            .collect::<Result<_, _>>()?;
        if missing.is_empty() {
            return Ok(all);
        }

        let states = self.protocol.fetch_states(self.fetcher.as_ref(), &missing).await?;
        let present: Vec<(Pubkey, P::State)> = missing
            .iter()
            .zip(states)
            .filter_map(|(pool, state)| match state {
                Some(state) => Some((*pool, state)),
                None => {
                    debug!(market = %P::MARKET, pool = %pool, "pool account absent or undecodable");
                    None
                }
            })
            .collect();
        if present.is_empty() {
            return Ok(all);
        }

        // Every mint any fetched pool references, rewards included.
        let mut mint_ids: Vec<Pubkey> = Vec::new();
        for (_, state) in &present {
            let identity = self.protocol.identity(state);
            mint_ids.push(identity.base_mint);
            mint_ids.push(identity.quote_mint);
            mint_ids.extend(identity.reward_mints);
        }
        mint_ids.sort_unstable();
        mint_ids.dedup();

        let mints = ensure_mints(&self.db, self.fetcher.as_ref(), &mint_ids).await?;
        let mint_map: HashMap<&str, &MintRecord> =
            mints.iter().map(|mint| (mint.id.as_str(), mint)).collect();

        let synced = self.value_pools(&present, &mint_map).await?;

        let mut created: Vec<NewPair> = Vec::new();
        let mut rewards: Vec<(String, String)> = Vec::new();
        for (pool, state) in &present {
            let id = pool.to_string();
            // A pool that could not be valued produces no row this cycle;
            // the next swap touching it retries creation.
            let Some(valuation) = synced.get(&id) else {
                debug!(market = %P::MARKET, pool = %id, "pool not valued, skipping creation");
                continue;
            };
            let identity = self.protocol.identity(state);
            let fees = self.protocol.fees(state);
            let (base, quote) = self.pool_mints(pool, &identity, &mint_map)?;

            created.push(NewPair {
                id: id.clone(),
                market: P::MARKET,
                name: format!("{}/{}", base.symbol, quote.symbol),
                base_mint: base.id.clone(),
                quote_mint: quote.id.clone(),
                bin_step: fees.bin_step,
                base_fee: fees.base_fee,
                max_fee: fees.max_fee,
                dynamic_fee: fees.dynamic_fee,
                protocol_fee: fees.protocol_fee,
                liquidity: valuation.liquidity,
                base_reserve_amount_usd: valuation.base_reserve_amount_usd,
                quote_reserve_amount_usd: valuation.quote_reserve_amount_usd,
                sync_at: Some(Utc::now()),
                extra: identity.extra.clone(),
            });
            rewards.extend(
                identity
                    .reward_mints
                    .iter()
                    .map(|mint| (id.clone(), mint.to_string())),
            );
        }
        if created.is_empty() {
            return Ok(all);
        }

        let created_ids = self.db.pairs().upsert_many(&created).await?;
        if !rewards.is_empty() {
            self.db.reward_mints().insert_many(&rewards).await?;
        }

        all.extend(self.db.pairs().find_by_ids(&created_ids).await?);
        Ok(all)
    }

    /// Refreshes fee/reserve/liquidity fields of already-persisted pairs.
    /// A pair whose vaults or prices are unavailable receives no update
    /// this cycle; never a partial or zeroed write.
    pub async fn sync_pairs(&self, pairs: &[PairWithMints]) -> Result<u64, EngineError> {
        if pairs.len() > MAX_ACCOUNTS_PER_FETCH {
            return Err(EngineError::BatchTooLarge(pairs.len()));
        }
        if pairs.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Pubkey> = pairs
            .iter()
            .map(|pair| {
                pair.pair
                    .id
                    .parse()
                    .map_err(poolscope_protocols::ProtocolError::from)
            })
            .collect::<Result<_, _>>()?;
        let states = self.protocol.fetch_states(self.fetcher.as_ref(), &ids).await?;

        let mut present: Vec<(Pubkey, P::State)> = Vec::new();
        let mut mint_map: HashMap<&str, &MintRecord> = HashMap::new();
        for ((pool, state), pair) in ids.iter().zip(states).zip(pairs) {
            if let Some(state) = state {
                mint_map.insert(pair.base_mint.id.as_str(), &pair.base_mint);
                mint_map.insert(pair.quote_mint.id.as_str(), &pair.quote_mint);
                present.push((*pool, state));
            } else {
                debug!(market = %P::MARKET, pool = %pool, "pool account absent, no update");
            }
        }
        if present.is_empty() {
            return Ok(0);
        }

        let synced = self.value_pools(&present, &mint_map).await?;
        let updates: Vec<PairSyncUpdate> = present
            .iter()
            .filter_map(|(pool, state)| {
                let id = pool.to_string();
                let valuation = synced.get(&id)?;
                let fees = self.protocol.fees(state);
                Some(PairSyncUpdate {
                    id,
                    bin_step: fees.bin_step,
                    base_fee: fees.base_fee,
                    max_fee: fees.max_fee,
                    dynamic_fee: fees.dynamic_fee,
                    protocol_fee: fees.protocol_fee,
                    liquidity: valuation.liquidity,
                    base_reserve_amount_usd: valuation.base_reserve_amount_usd,
                    quote_reserve_amount_usd: valuation.quote_reserve_amount_usd,
                })
            })
            .collect();

        Ok(self.db.pairs().apply_sync_updates(&updates).await?)
    }

    /// Values each pool's reserves in USD. Returns only fully valued pools:
    /// both vault balances and both prices resolved.
    async fn value_pools(
        &self,
        pools: &[(Pubkey, P::State)],
        mint_map: &HashMap<&str, &MintRecord>,
    ) -> Result<HashMap<String, Valuation>, EngineError> {
        let mut vault_keys: Vec<Pubkey> = Vec::new();
        let mut pool_vaults: Vec<(Pubkey, Pubkey, Pubkey)> = Vec::new();
        let mut price_mints: Vec<String> = Vec::new();
        for (pool, state) in pools {
            let identity = self.protocol.identity(state);
            let (base, quote) = self.pool_mints(pool, &identity, mint_map)?;
            let (base_vault, quote_vault) = self.protocol.vaults(pool, state, base, quote)?;
            vault_keys.push(base_vault);
            vault_keys.push(quote_vault);
            pool_vaults.push((*pool, base_vault, quote_vault));
            price_mints.push(base.id.clone());
            price_mints.push(quote.id.clone());
        }

        let vaults = fetch_accounts_chunked(self.fetcher.as_ref(), &vault_keys).await?;
        price_mints.sort_unstable();
        price_mints.dedup();
        let prices = self.prices.resolve(&price_mints).await?;

        let mut valuations = HashMap::new();
        for ((pool, base_vault, quote_vault), (_, state)) in pool_vaults.iter().zip(pools) {
            let identity = self.protocol.identity(state);
            let (base, quote) = self.pool_mints(pool, &identity, mint_map)?;

            let (Some(base_account), Some(quote_account)) =
                (vaults.get(base_vault), vaults.get(quote_vault))
            else {
                debug!(market = %P::MARKET, pool = %pool, "vault accounts unavailable");
                continue;
            };
            let (Some(base_price), Some(quote_price)) =
                (prices.get(&base.id), prices.get(&quote.id))
            else {
                debug!(market = %P::MARKET, pool = %pool, "prices unavailable");
                continue;
            };
            let (Ok(base_raw), Ok(quote_raw)) = (
                decode_token_amount(base_vault, &base_account.data),
                decode_token_amount(quote_vault, &quote_account.data),
            ) else {
                debug!(market = %P::MARKET, pool = %pool, "vault accounts undecodable");
                continue;
            };

            let base_reserve_amount_usd =
                to_ui_amount(base_raw as u128, base.decimals as u8) * base_price;
            let quote_reserve_amount_usd =
                to_ui_amount(quote_raw as u128, quote.decimals as u8) * quote_price;
            valuations.insert(
                pool.to_string(),
                Valuation {
                    base_reserve_amount_usd,
                    quote_reserve_amount_usd,
                    liquidity: base_reserve_amount_usd + quote_reserve_amount_usd,
                },
            );
        }
        Ok(valuations)
    }

    fn pool_mints<'a>(
        &self,
        pool: &Pubkey,
        identity: &PoolIdentity,
        mint_map: &HashMap<&str, &'a MintRecord>,
    ) -> Result<(&'a MintRecord, &'a MintRecord), EngineError> {
        let base = mint_map.get(identity.base_mint.to_string().as_str()).copied();
        let quote = mint_map
            .get(identity.quote_mint.to_string().as_str())
            .copied();
        match (base, quote) {
            (Some(base), Some(quote)) => Ok((base, quote)),
            _ => Err(EngineError::MissingMint {
                pool: pool.to_string(),
            }),
        }
    }
}

struct Valuation {
    base_reserve_amount_usd: f64,
    quote_reserve_amount_usd: f64,
    liquidity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolscope_pricing::sources::{BulkPriceSource, SpotPriceSource, TokenPrice};
    use poolscope_pricing::{PriceError, PriceResolver};
    use solana_sdk::account::Account;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AccountFetcher for CountingFetcher {
        async fn fetch_accounts(
            &self,
            keys: &[Pubkey],
        ) -> Result<Vec<Option<Account>>, poolscope_protocols::ProtocolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![None; keys.len()])
        }
    }

    struct NoPrices;

    #[async_trait]
    impl BulkPriceSource for NoPrices {
        async fn prices(&self, _mints: &[String]) -> Result<Vec<TokenPrice>, PriceError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl SpotPriceSource for NoPrices {
        async fn price(&self, _mint: &str) -> Result<Option<f64>, PriceError> {
            Ok(None)
        }

        async fn price_at(&self, _mint: &str, _ts: i64) -> Result<Option<f64>, PriceError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_oversized_batch_fails_before_any_rpc_call() {
        // A lazy pool never connects, so the cap must trip before the
        // database or the fetcher are touched.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/poolscope_unreachable")
            .unwrap();
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let prices = Arc::new(PriceResolver::new(
            Arc::new(NoPrices),
            Arc::new(NoPrices),
            Arc::new(NoPrices),
        ));
        let synchronizer = Synchronizer::new(
            MeteoraProtocol,
            Database::new(pool),
            fetcher.clone(),
            prices,
            Arc::new(PairCache::new(Duration::from_secs(60))),
        );

        let ids: Vec<String> = (0..101).map(|_| Pubkey::new_unique().to_string()).collect();
        let result = synchronizer.ensure_pairs(&ids).await;
        assert!(matches!(result, Err(EngineError::BatchTooLarge(101))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
