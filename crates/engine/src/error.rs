use poolscope_pricing::{PriceError, SharedCallError};
use poolscope_protocols::{MAX_ACCOUNTS_PER_FETCH, ProtocolError};

/// Engine failures. The first block are hard errors that abort the unit of
/// work and surface to the job queue; everything soft is logged and skipped
/// at the call site instead of raised.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Programming error: callers must never request more pools per call
    /// than one RPC batch can carry.
    #[error("cannot sync more than {MAX_ACCOUNTS_PER_FETCH} pools per call, got {0}")]
    BatchTooLarge(usize),

    /// A swap references a pair that is still missing after the ensure
    /// step; a data-consistency bug, not a transient condition.
    #[error("pair {pair} not created for swap {signature}")]
    PairNotCreated { pair: String, signature: String },

    /// A decoded pool references mint rows that could not be resolved.
    #[error("missing mint rows for pool {pool}")]
    MissingMint { pool: String },

    /// A swap being valued has no resolved USD price for one of its sides.
    #[error("missing usd price for mint {0}")]
    MissingPrice(String),

    #[error("expected at least one swap event for {0}")]
    EmptySwapBatch(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Shared(#[from] SharedCallError),
}
