use crate::rpc::MAX_ACCOUNTS_PER_FETCH;

/// Errors raised while talking to the chain or decoding on-chain state.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Programming error: a single batch call must never exceed the RPC
    /// account limit. Callers chunk above this layer.
    #[error("batch of {0} keys exceeds the {MAX_ACCOUNTS_PER_FETCH}-account rpc limit")]
    BatchTooLarge(usize),

    #[error("rpc request failed")]
    Rpc(#[from] solana_client::client_error::ClientError),

    #[error("invalid address")]
    Address(#[from] solana_sdk::pubkey::ParsePubkeyError),

    #[error("invalid signature")]
    Signature(#[from] solana_sdk::signature::ParseSignatureError),

    #[error("account {address} does not decode as {kind}: {reason}")]
    AccountData {
        address: String,
        kind: &'static str,
        reason: String,
    },

    #[error("malformed event payload: {0}")]
    Event(String),

    #[error("serialization failed")]
    Json(#[from] serde_json::Error),
}
