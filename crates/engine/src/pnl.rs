//! Position PnL reconstruction: a linear replay of a position's lifecycle
//! events, valued at historical prices.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use poolscope_domain::{PositionPnl, pnl_percent, to_ui_amount};
use poolscope_pricing::PriceResolver;
use poolscope_protocols::events::{EventDecoder, ProtocolEvent, SarosEvent};
use poolscope_protocols::rpc::ChainRpc;

use crate::error::EngineError;
use crate::pipeline::SwapIndexer;

/// Replays a Saros position's full signature history to compute entry/exit
/// USD value and percentage return.
pub struct PnlReconstructor {
    rpc: Arc<ChainRpc>,
    decoder: Arc<dyn EventDecoder>,
    indexer: Arc<SwapIndexer>,
    prices: Arc<PriceResolver>,
}

impl PnlReconstructor {
    pub fn new(
        rpc: Arc<ChainRpc>,
        decoder: Arc<dyn EventDecoder>,
        indexer: Arc<SwapIndexer>,
        prices: Arc<PriceResolver>,
    ) -> Self {
        Self {
            rpc,
            decoder,
            indexer,
            prices,
        }
    }

    /// `None` when the signature does not touch a position lifecycle; not
    /// every transaction is one.
    pub async fn compute(&self, signature: &str) -> Result<Option<PositionPnl>, EngineError> {
        let Some(tx) = self.rpc.get_transaction(signature).await? else {
            return Ok(None);
        };
        let events = self.decoder.decode(&tx)?;

        // The first creation or decrease event identifies the position.
        let located = events.iter().find_map(|event| match event {
            ProtocolEvent::Saros(SarosEvent::PositionCreation(event)) => {
                Some((event.pair, event.position))
            }
            ProtocolEvent::Saros(SarosEvent::PositionDecrease(event)) => {
                Some((event.pair, event.position))
            }
            _ => None,
        });
        let Some((pair_key, position)) = located else {
            return Ok(None);
        };

        let pair_id = pair_key.to_string();
        let pairs = self.indexer.saros().ensure_pairs(std::slice::from_ref(&pair_id)).await?;
        let Some(pair) = pairs.into_iter().find(|pair| pair.pair.id == pair_id) else {
            warn!(pair = %pair_id, signature, "position pair could not be resolved");
            return Ok(None);
        };

        // Full history, failed signatures excluded, replayed oldest first.
        let history = self.rpc.get_signatures_for_address(&position).await?;
        let signatures: Vec<String> = history
            .iter()
            .filter(|record| !record.failed)
            .map(|record| record.signature.clone())
            .collect();
        let mut transactions: Vec<_> = self
            .rpc
            .get_transactions(&signatures)
            .await?
            .into_iter()
            .flatten()
            .collect();
        transactions.reverse();

        let now = Utc::now().timestamp();
        let mut open_time = now;
        let mut close_time = now;
        let (mut open_base, mut open_quote) = (0u128, 0u128);
        let (mut close_base, mut close_quote) = (0u128, 0u128);

        for tx in &transactions {
            for event in self.decoder.decode(tx)? {
                match event {
                    ProtocolEvent::Saros(SarosEvent::PositionIncrease(event))
                        if event.position == position =>
                    {
                        open_base += event.amounts_x.iter().map(|amount| *amount as u128).sum::<u128>();
                        open_quote += event.amounts_y.iter().map(|amount| *amount as u128).sum::<u128>();
                        if let Some(block_time) = tx.block_time {
                            open_time = block_time;
                        }
                    }
                    ProtocolEvent::Saros(SarosEvent::PositionDecrease(event))
                        if event.position == position =>
                    {
                        close_base += event.amounts_x.iter().map(|amount| *amount as u128).sum::<u128>();
                        close_quote += event.amounts_y.iter().map(|amount| *amount as u128).sum::<u128>();
                        if let Some(block_time) = tx.block_time {
                            close_time = block_time;
                        }
                    }
                    _ => {}
                }
            }
        }

        let base_decimals = pair.base_mint.decimals as u8;
        let quote_decimals = pair.quote_mint.decimals as u8;
        let open_base_amount = to_ui_amount(open_base, base_decimals);
        let open_quote_amount = to_ui_amount(open_quote, quote_decimals);
        let close_base_amount = to_ui_amount(close_base, base_decimals);
        let close_quote_amount = to_ui_amount(close_quote, quote_decimals);

        let open_amount_usd = self
            .value_side(&pair.base_mint.id, open_base_amount, open_time)
            .await?
            + self
                .value_side(&pair.quote_mint.id, open_quote_amount, open_time)
                .await?;
        let close_amount_usd = self
            .value_side(&pair.base_mint.id, close_base_amount, close_time)
            .await?
            + self
                .value_side(&pair.quote_mint.id, close_quote_amount, close_time)
                .await?;

        Ok(Some(PositionPnl {
            name: pair.pair.name.clone(),
            open_amount_usd,
            close_amount_usd,
            delta_usd: close_amount_usd - open_amount_usd,
            pnl_percent: pnl_percent(open_amount_usd, close_amount_usd),
            duration_secs: close_time - open_time,
            tvl_at_open: open_amount_usd,
        }))
    }

    /// A side with no amount is worth zero without a lookup; a side whose
    /// historical price is unknown is valued zero as well.
    async fn value_side(
        &self,
        mint: &str,
        amount: f64,
        unix_ts: i64,
    ) -> Result<f64, EngineError> {
        if amount <= 0.0 {
            return Ok(0.0);
        }
        match self.prices.historical(mint, unix_ts).await? {
            Some(price) => Ok(price * amount),
            None => {
                debug!(mint, unix_ts, "no historical price, valuing side at zero");
                Ok(0.0)
            }
        }
    }
}
