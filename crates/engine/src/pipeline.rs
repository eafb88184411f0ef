//! Event pipeline adapter: one consumer per protocol registered against the
//! external decoder, routing decoded swap events into the normalizer.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use poolscope_data::{Database, PairWithMints, SwapRecord};
use poolscope_domain::Market;
use poolscope_pricing::PriceResolver;
use poolscope_protocols::events::{EventDecoder, ProtocolEvent, SwapObservation};
use poolscope_protocols::rpc::{AccountFetcher, TransactionRecord};

use crate::error::EngineError;
use crate::swaps::record_swaps;
use crate::sync::{
    MeteoraProtocol, OrcaProtocol, PairCache, RaydiumProtocol, SarosProtocol, Synchronizer,
};

/// Routes decoded swap events to the right market's synchronizer and the
/// shared normalizer. Swap indices are the event's position among the
/// transaction's swap events, so several markets inside one transaction
/// cannot collide on `(signature, instruction_index)`.
pub struct SwapIndexer {
    meteora: Synchronizer<MeteoraProtocol>,
    saros: Synchronizer<SarosProtocol>,
    orca: Synchronizer<OrcaProtocol>,
    raydium: Synchronizer<RaydiumProtocol>,
    db: Database,
    prices: Arc<PriceResolver>,
}

impl SwapIndexer {
    pub fn new(
        db: Database,
        fetcher: Arc<dyn AccountFetcher>,
        prices: Arc<PriceResolver>,
        pair_cache: Arc<PairCache>,
    ) -> Self {
        Self {
            meteora: Synchronizer::new(
                MeteoraProtocol,
                db.clone(),
                fetcher.clone(),
                prices.clone(),
                pair_cache.clone(),
            ),
            saros: Synchronizer::new(
                SarosProtocol,
                db.clone(),
                fetcher.clone(),
                prices.clone(),
                pair_cache.clone(),
            ),
            orca: Synchronizer::new(
                OrcaProtocol,
                db.clone(),
                fetcher.clone(),
                prices.clone(),
                pair_cache.clone(),
            ),
            raydium: Synchronizer::new(
                RaydiumProtocol,
                db.clone(),
                fetcher,
                prices.clone(),
                pair_cache,
            ),
            db,
            prices,
        }
    }

    /// Persists every swap event of one transaction. Non-swap events are
    /// ignored here; the PnL reconstructor consumes them separately.
    pub async fn index_swaps(
        &self,
        signature: &str,
        events: &[ProtocolEvent],
    ) -> Result<Vec<SwapRecord>, EngineError> {
        let mut per_market: HashMap<Market, Vec<(i32, SwapObservation)>> = HashMap::new();
        let mut next_index = 0i32;
        for event in events {
            if let Some(observation) = event.swap_observation() {
                per_market
                    .entry(event.market())
                    .or_default()
                    .push((next_index, observation));
                next_index += 1;
            }
        }
        if per_market.is_empty() {
            return Ok(Vec::new());
        }

        let mut inserted = Vec::new();
        for market in Market::ALL {
            let Some(observations) = per_market.remove(&market) else {
                continue;
            };
            let mut pair_ids: Vec<String> = observations
                .iter()
                .map(|(_, observation)| observation.pair.to_string())
                .collect();
            pair_ids.sort_unstable();
            pair_ids.dedup();

            let pairs = self.ensure_pairs(market, &pair_ids).await?;
            debug!(
                signature,
                market = %market,
                swaps = observations.len(),
                pairs = pairs.len(),
                "recording swaps"
            );
            inserted
                .extend(record_swaps(&self.db, &self.prices, &pairs, signature, &observations).await?);
        }
        Ok(inserted)
    }

    async fn ensure_pairs(
        &self,
        market: Market,
        pair_ids: &[String],
    ) -> Result<Vec<PairWithMints>, EngineError> {
        match market {
            Market::Meteora => self.meteora.ensure_pairs(pair_ids).await,
            Market::Saros => self.saros.ensure_pairs(pair_ids).await,
            Market::Orca => self.orca.ensure_pairs(pair_ids).await,
            Market::Raydium => self.raydium.ensure_pairs(pair_ids).await,
        }
    }

    /// The Saros synchronizer, shared with the PnL reconstructor.
    pub fn saros(&self) -> &Synchronizer<SarosProtocol> {
        &self.saros
    }

    /// Periodic refresh entry point for the pair-sync job.
    pub async fn sync_market(&self, market: Market, pairs: &[PairWithMints]) -> Result<u64, EngineError> {
        match market {
            Market::Meteora => self.meteora.sync_pairs(pairs).await,
            Market::Saros => self.saros.sync_pairs(pairs).await,
            Market::Orca => self.orca.sync_pairs(pairs).await,
            Market::Raydium => self.raydium.sync_pairs(pairs).await,
        }
    }
}

/// The externally-facing adapter: feeds fetched transactions through the
/// decoder and hands swap events to the indexer. Failed transactions are
/// dropped before decoding.
pub struct Pipeline {
    decoder: Arc<dyn EventDecoder>,
    indexer: Arc<SwapIndexer>,
}

impl Pipeline {
    pub fn new(decoder: Arc<dyn EventDecoder>, indexer: Arc<SwapIndexer>) -> Self {
        Self { decoder, indexer }
    }

    pub async fn process(&self, tx: &TransactionRecord) -> Result<Vec<SwapRecord>, EngineError> {
        if tx.failed {
            debug!(signature = %tx.signature, "skipping failed transaction");
            return Ok(Vec::new());
        }
        let events = self.decoder.decode(tx)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        self.indexer.index_swaps(&tx.signature, &events).await
    }
}
