use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use poolscope_data::MintRecord;
use poolscope_domain::Market;
use poolscope_protocols::meteora::LbPair;
use poolscope_protocols::rpc::AccountFetcher;
use poolscope_protocols::FeeBreakdown;

use super::{PoolIdentity, PoolProtocol};
use crate::error::EngineError;

/// Meteora DLMM pools: vaults live in the pair account itself.
pub struct MeteoraProtocol;

#[async_trait]
impl PoolProtocol for MeteoraProtocol {
    type State = LbPair;

    const MARKET: Market = Market::Meteora;

    async fn fetch_states(
        &self,
        fetcher: &dyn AccountFetcher,
        ids: &[Pubkey],
    ) -> Result<Vec<Option<Self::State>>, EngineError> {
        let accounts = fetcher.fetch_accounts(ids).await?;
        Ok(ids
            .iter()
            .zip(accounts)
            .map(|(id, account)| {
                account.and_then(|account| LbPair::decode(id, &account.data).ok())
            })
            .collect())
    }

    fn identity(&self, state: &Self::State) -> PoolIdentity {
        PoolIdentity {
            base_mint: state.token_x_mint,
            quote_mint: state.token_y_mint,
            reward_mints: state.reward_mints(),
            extra: json!({}),
        }
    }

    fn fees(&self, state: &Self::State) -> FeeBreakdown {
        state.fees()
    }

    fn vaults(
        &self,
        _pool: &Pubkey,
        state: &Self::State,
        _base_mint: &MintRecord,
        _quote_mint: &MintRecord,
    ) -> Result<(Pubkey, Pubkey), EngineError> {
        Ok((state.reserve_x, state.reserve_y))
    }
}
