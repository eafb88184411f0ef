//! Mint ingestion: fetch on-chain mint + metadata accounts for unknown
//! mints and upsert them conflict-safely. Decimals are written exactly once.

use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use poolscope_data::{Database, MintRecord, NewMint};
use poolscope_protocols::rpc::{AccountFetcher, fetch_accounts_chunked};
use poolscope_protocols::token::{
    decode_metadata, decode_mint_decimals, fallback_symbol, metadata_address,
};

use crate::error::EngineError;

/// Returns mint rows for every id, creating rows for mints seen for the
/// first time. Mints whose accounts are absent or undecodable are skipped;
/// callers treat the missing row as a hard error only where a pool requires
/// it.
pub async fn ensure_mints(
    db: &Database,
    fetcher: &dyn AccountFetcher,
    mint_ids: &[Pubkey],
) -> Result<Vec<MintRecord>, EngineError> {
    let ids: Vec<String> = mint_ids.iter().map(|id| id.to_string()).collect();
    let existing = db.mints().find_by_ids(&ids).await?;

    let missing: Vec<Pubkey> = mint_ids
        .iter()
        .filter(|id| {
            let id = id.to_string();
            !existing.iter().any(|mint| mint.id == id)
        })
        .copied()
        .collect();
    if missing.is_empty() {
        return Ok(existing);
    }

    let accounts = fetch_accounts_chunked(fetcher, &missing).await?;
    let metadata_keys: Vec<Pubkey> = missing.iter().map(metadata_address).collect();
    let metadata_accounts = fetch_accounts_chunked(fetcher, &metadata_keys).await?;

    let mut new_mints = Vec::new();
    for mint in &missing {
        let Some(account) = accounts.get(mint) else {
            debug!(mint = %mint, "mint account absent on chain");
            continue;
        };
        let decimals = match decode_mint_decimals(mint, &account.data) {
            Ok(decimals) => decimals,
            Err(err) => {
                debug!(mint = %mint, error = %err, "mint account undecodable");
                continue;
            }
        };

        let metadata = metadata_accounts
            .get(&metadata_address(mint))
            .and_then(|meta| decode_metadata(&metadata_address(mint), &meta.data).ok());
        let (symbol, name, extra) = match metadata {
            Some(metadata) if !metadata.symbol.is_empty() => {
                let extra = json!({ "uri": metadata.uri });
                (metadata.symbol, metadata.name, extra)
            }
            _ => (fallback_symbol(mint), mint.to_string(), json!({})),
        };

        new_mints.push(NewMint {
            id: mint.to_string(),
            symbol,
            name,
            decimals: decimals as i32,
            token_program: account.owner.to_string(),
            extra,
        });
    }

    db.mints().insert_many(&new_mints).await?;
    Ok(db.mints().find_by_ids(&ids).await?)
}
