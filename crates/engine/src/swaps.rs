//! Swap normalization: protocol swap observations valued in USD and
//! persisted with reprocessing-safe conflict semantics.

use serde_json::json;

use poolscope_data::{Database, NewSwap, PairWithMints, SwapRecord};
use poolscope_domain::to_ui_amount;
use poolscope_pricing::PriceResolver;
use poolscope_protocols::events::SwapObservation;

use crate::error::EngineError;

/// Values and persists one transaction's swap observations against pairs
/// already resolved by the synchronizer.
///
/// Hard failures: an observation whose pair is not in `pairs` (the ensure
/// step failed to create it) and a pair side without a resolved USD price
/// both abort the whole batch, surfacing to the job queue for redelivery.
pub async fn record_swaps(
    db: &Database,
    prices: &PriceResolver,
    pairs: &[PairWithMints],
    signature: &str,
    observations: &[(i32, SwapObservation)],
) -> Result<Vec<SwapRecord>, EngineError> {
    if observations.is_empty() {
        return Err(EngineError::EmptySwapBatch(signature.to_string()));
    }

    let mut mints: Vec<String> = pairs
        .iter()
        .flat_map(|pair| [pair.base_mint.id.clone(), pair.quote_mint.id.clone()])
        .collect();
    mints.sort_unstable();
    mints.dedup();
    let price_map = prices.resolve(&mints).await?;

    let mut rows = Vec::with_capacity(observations.len());
    for (instruction_index, observation) in observations {
        let pair_id = observation.pair.to_string();
        let pair = pairs
            .iter()
            .find(|pair| pair.pair.id == pair_id)
            .ok_or_else(|| EngineError::PairNotCreated {
                pair: pair_id.clone(),
                signature: signature.to_string(),
            })?;

        let base_price = *price_map
            .get(&pair.base_mint.id)
            .ok_or_else(|| EngineError::MissingPrice(pair.base_mint.id.clone()))?;
        let quote_price = *price_map
            .get(&pair.quote_mint.id)
            .ok_or_else(|| EngineError::MissingPrice(pair.quote_mint.id.clone()))?;

        let base_decimals = pair.base_mint.decimals as u8;
        let quote_decimals = pair.quote_mint.decimals as u8;
        let base_amount = to_ui_amount(observation.base_amount as u128, base_decimals);
        let quote_amount = to_ui_amount(observation.quote_amount as u128, quote_decimals);
        let base_fee = to_ui_amount(observation.base_fee as u128, base_decimals);
        let quote_fee = to_ui_amount(observation.quote_fee as u128, quote_decimals);

        rows.push(NewSwap {
            signature: signature.to_string(),
            instruction_index: *instruction_index,
            pair: pair_id,
            side: observation.side,
            base_amount_usd: base_amount * base_price,
            quote_amount_usd: quote_amount * quote_price,
            fee_usd: base_fee * base_price + quote_fee * quote_price,
            tvl: Some(pair.pair.liquidity),
            price: None,
            extra: json!({}),
        });
    }

    Ok(db.swaps().insert_many(&rows).await?)
}
