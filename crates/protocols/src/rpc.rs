//! Chain RPC provider: batched account reads behind the [`AccountFetcher`]
//! seam, signature history and parsed-transaction fetch.

use std::collections::HashMap;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::account::Account;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::UiTransactionEncoding;
use tracing::warn;

use crate::error::ProtocolError;

/// Hard cap the RPC node places on `getMultipleAccounts`.
pub const MAX_ACCOUNTS_PER_FETCH: usize = 100;

/// Batch account reads, one chunk per call. Implementations must reject
/// batches above [`MAX_ACCOUNTS_PER_FETCH`]; use [`fetch_accounts_chunked`]
/// for arbitrarily sized key sets.
#[async_trait]
pub trait AccountFetcher: Send + Sync {
    async fn fetch_accounts(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, ProtocolError>;
}

/// Fans an arbitrarily sized key set out over the per-call account limit and
/// merges the results into an address-keyed map. Accounts that do not exist
/// are simply absent from the map.
pub async fn fetch_accounts_chunked(
    fetcher: &dyn AccountFetcher,
    keys: &[Pubkey],
) -> Result<HashMap<Pubkey, Account>, ProtocolError> {
    let mut merged = HashMap::with_capacity(keys.len());
    for chunk in keys.chunks(MAX_ACCOUNTS_PER_FETCH) {
        let accounts = fetcher.fetch_accounts(chunk).await?;
        for (key, account) in chunk.iter().zip(accounts) {
            if let Some(account) = account {
                merged.insert(*key, account);
            }
        }
    }
    Ok(merged)
}

/// One entry of an address's signature history.
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    pub signature: String,
    /// The transaction recorded an on-chain error.
    pub failed: bool,
    pub block_time: Option<i64>,
}

/// A fetched transaction in parsed encoding. `payload` is the opaque
/// parsed-transaction body (message + meta, including log messages) that the
/// event decoder consumes; this crate does not interpret it beyond the
/// decoder contract.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
    pub payload: serde_json::Value,
}

impl TransactionRecord {
    /// Log messages emitted by the transaction, if the node returned meta.
    pub fn log_messages(&self) -> Vec<&str> {
        self.payload["meta"]["logMessages"]
            .as_array()
            .map(|logs| logs.iter().filter_map(|log| log.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Thin wrapper over the nonblocking solana RPC client, confirmed
/// commitment throughout.
pub struct ChainRpc {
    client: RpcClient,
}

impl ChainRpc {
    pub fn new(url: impl ToString) -> Self {
        Self {
            client: RpcClient::new_with_commitment(
                url.to_string(),
                CommitmentConfig::confirmed(),
            ),
        }
    }

    /// Signature history for an address, newest first as the node returns it.
    pub async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
    ) -> Result<Vec<SignatureRecord>, ProtocolError> {
        let statuses = self.client.get_signatures_for_address(address).await?;
        Ok(statuses
            .into_iter()
            .map(|status| SignatureRecord {
                signature: status.signature,
                failed: status.err.is_some(),
                block_time: status.block_time,
            })
            .collect())
    }

    /// Fetches one parsed transaction. A signature that cannot be fetched or
    /// decoded is treated as absent, matching the null entries the JSON-RPC
    /// batch endpoint produces.
    pub async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionRecord>, ProtocolError> {
        let parsed: Signature = signature.parse()?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let fetched = match self.client.get_transaction_with_config(&parsed, config).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(signature, error = %err, "transaction fetch failed");
                return Ok(None);
            }
        };

        let failed = fetched
            .transaction
            .meta
            .as_ref()
            .map(|meta| meta.err.is_some())
            .unwrap_or(false);
        let payload = serde_json::to_value(&fetched.transaction)?;

        Ok(Some(TransactionRecord {
            signature: signature.to_string(),
            slot: fetched.slot,
            block_time: fetched.block_time,
            failed,
            payload,
        }))
    }

    /// Batched parsed-transaction fetch; unfetchable entries come back as
    /// `None` in input order.
    pub async fn get_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<TransactionRecord>>, ProtocolError> {
        let fetches = signatures
            .iter()
            .map(|signature| self.get_transaction(signature));
        let results = futures::future::join_all(fetches).await;
        results.into_iter().collect()
    }
}

#[async_trait]
impl AccountFetcher for ChainRpc {
    async fn fetch_accounts(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, ProtocolError> {
        if keys.len() > MAX_ACCOUNTS_PER_FETCH {
            return Err(ProtocolError::BatchTooLarge(keys.len()));
        }
        Ok(self.client.get_multiple_accounts(keys).await?)
    }
}
