use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use poolscope_data::MintRecord;
use poolscope_domain::Market;
use poolscope_protocols::rpc::AccountFetcher;
use poolscope_protocols::saros::Pair;
use poolscope_protocols::FeeBreakdown;

use super::{PoolIdentity, PoolProtocol};
use crate::error::EngineError;

/// Saros liquidity-book pairs: vaults are associated token accounts derived
/// from the pair address and each mint's token program.
pub struct SarosProtocol;

#[async_trait]
impl PoolProtocol for SarosProtocol {
    type State = Pair;

    const MARKET: Market = Market::Saros;

    async fn fetch_states(
        &self,
        fetcher: &dyn AccountFetcher,
        ids: &[Pubkey],
    ) -> Result<Vec<Option<Self::State>>, EngineError> {
        let accounts = fetcher.fetch_accounts(ids).await?;
        Ok(ids
            .iter()
            .zip(accounts)
            .map(|(id, account)| account.and_then(|account| Pair::decode(id, &account.data).ok()))
            .collect())
    }

    fn identity(&self, state: &Self::State) -> PoolIdentity {
        PoolIdentity {
            base_mint: state.token_mint_x,
            quote_mint: state.token_mint_y,
            reward_mints: Vec::new(),
            extra: json!({}),
        }
    }

    fn fees(&self, state: &Self::State) -> FeeBreakdown {
        state.fees()
    }

    fn vaults(
        &self,
        pool: &Pubkey,
        state: &Self::State,
        base_mint: &MintRecord,
        quote_mint: &MintRecord,
    ) -> Result<(Pubkey, Pubkey), EngineError> {
        let base_program: Pubkey = base_mint
            .token_program
            .parse()
            .map_err(poolscope_protocols::ProtocolError::from)?;
        let quote_program: Pubkey = quote_mint
            .token_program
            .parse()
            .map_err(poolscope_protocols::ProtocolError::from)?;
        Ok((
            state.vault(pool, &state.token_mint_x, &base_program),
            state.vault(pool, &state.token_mint_y, &quote_program),
        ))
    }
}
