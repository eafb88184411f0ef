use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use poolscope_data::MintRecord;
use poolscope_domain::Market;
use poolscope_protocols::orca::{Oracle, Whirlpool};
use poolscope_protocols::rpc::{AccountFetcher, fetch_accounts_chunked};
use poolscope_protocols::FeeBreakdown;

use super::{PoolIdentity, PoolProtocol};
use crate::error::EngineError;

/// Orca whirlpools: pools whose fee tier enables adaptive fees carry an
/// oracle account fetched alongside the pool state.
pub struct OrcaProtocol;

#[async_trait]
impl PoolProtocol for OrcaProtocol {
    type State = (Whirlpool, Option<Oracle>);

    const MARKET: Market = Market::Orca;

    async fn fetch_states(
        &self,
        fetcher: &dyn AccountFetcher,
        ids: &[Pubkey],
    ) -> Result<Vec<Option<Self::State>>, EngineError> {
        let accounts = fetcher.fetch_accounts(ids).await?;
        let whirlpools: Vec<Option<Whirlpool>> = ids
            .iter()
            .zip(accounts)
            .map(|(id, account)| {
                account.and_then(|account| Whirlpool::decode(id, &account.data).ok())
            })
            .collect();

        // One oracle PDA per adaptive-fee pool; absent oracles fall back to
        // no dynamic fee rather than failing the pool.
        let oracle_keys: Vec<Pubkey> = ids
            .iter()
            .zip(&whirlpools)
            .filter_map(|(id, whirlpool)| {
                whirlpool
                    .as_ref()
                    .filter(|whirlpool| whirlpool.has_adaptive_fee())
                    .map(|_| Whirlpool::oracle_address(id))
            })
            .collect();
        let oracle_accounts = if oracle_keys.is_empty() {
            Default::default()
        } else {
            fetch_accounts_chunked(fetcher, &oracle_keys).await?
        };

        Ok(ids
            .iter()
            .zip(whirlpools)
            .map(|(id, whirlpool)| {
                whirlpool.map(|whirlpool| {
                    let oracle = whirlpool.has_adaptive_fee().then(|| {
                        let key = Whirlpool::oracle_address(id);
                        oracle_accounts
                            .get(&key)
                            .and_then(|account| Oracle::decode(&key, &account.data).ok())
                    });
                    (whirlpool, oracle.flatten())
                })
            })
            .collect())
    }

    fn identity(&self, state: &Self::State) -> PoolIdentity {
        let (whirlpool, _) = state;
        PoolIdentity {
            base_mint: whirlpool.token_mint_a,
            quote_mint: whirlpool.token_mint_b,
            reward_mints: whirlpool.reward_mints(),
            extra: json!({}),
        }
    }

    fn fees(&self, state: &Self::State) -> FeeBreakdown {
        let (whirlpool, oracle) = state;
        whirlpool.fees(oracle.as_ref())
    }

    fn vaults(
        &self,
        _pool: &Pubkey,
        state: &Self::State,
        _base_mint: &MintRecord,
        _quote_mint: &MintRecord,
    ) -> Result<(Pubkey, Pubkey), EngineError> {
        let (whirlpool, _) = state;
        Ok((whirlpool.token_vault_a, whirlpool.token_vault_b))
    }
}
