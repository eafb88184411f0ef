use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use poolscope_data::MintRecord;
use poolscope_domain::Market;
use poolscope_protocols::raydium::{AmmConfig, PoolState};
use poolscope_protocols::rpc::{AccountFetcher, fetch_accounts_chunked};
use poolscope_protocols::FeeBreakdown;

use super::{PoolIdentity, PoolProtocol};
use crate::error::EngineError;

/// Raydium CLMM pools: fee parameters live in a shared amm-config account;
/// a pool whose config cannot be fetched is skipped.
pub struct RaydiumProtocol;

#[async_trait]
impl PoolProtocol for RaydiumProtocol {
    type State = (PoolState, AmmConfig);

    const MARKET: Market = Market::Raydium;

    async fn fetch_states(
        &self,
        fetcher: &dyn AccountFetcher,
        ids: &[Pubkey],
    ) -> Result<Vec<Option<Self::State>>, EngineError> {
        let accounts = fetcher.fetch_accounts(ids).await?;
        let pools: Vec<Option<PoolState>> = ids
            .iter()
            .zip(accounts)
            .map(|(id, account)| {
                account.and_then(|account| PoolState::decode(id, &account.data).ok())
            })
            .collect();

        let mut config_keys: Vec<Pubkey> = pools
            .iter()
            .flatten()
            .map(|pool| pool.amm_config)
            .collect();
        config_keys.sort_unstable();
        config_keys.dedup();
        let config_accounts = if config_keys.is_empty() {
            Default::default()
        } else {
            fetch_accounts_chunked(fetcher, &config_keys).await?
        };

        Ok(pools
            .into_iter()
            .map(|pool| {
                let pool = pool?;
                let config = config_accounts
                    .get(&pool.amm_config)
                    .and_then(|account| AmmConfig::decode(&pool.amm_config, &account.data).ok())?;
                Some((pool, config))
            })
            .collect())
    }

    fn identity(&self, state: &Self::State) -> PoolIdentity {
        let (pool, _) = state;
        PoolIdentity {
            base_mint: pool.token_mint_0,
            quote_mint: pool.token_mint_1,
            reward_mints: pool.reward_mints(),
            extra: json!({
                "tokenVault0": pool.token_vault_0.to_string(),
                "tokenVault1": pool.token_vault_1.to_string(),
            }),
        }
    }

    fn fees(&self, state: &Self::State) -> FeeBreakdown {
        let (pool, config) = state;
        pool.fees(config)
    }

    fn vaults(
        &self,
        _pool: &Pubkey,
        state: &Self::State,
        _base_mint: &MintRecord,
        _quote_mint: &MintRecord,
    ) -> Result<(Pubkey, Pubkey), EngineError> {
        let (pool, _) = state;
        Ok((pool.token_vault_0, pool.token_vault_1))
    }
}
