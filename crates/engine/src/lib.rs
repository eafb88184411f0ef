//! The indexing engine: per-protocol pair synchronizers, the swap
//! normalizer, the event pipeline, position PnL reconstruction and the
//! bounded job worker.

pub mod error;
pub mod pipeline;
pub mod pnl;
pub mod swaps;
pub mod sync;
pub mod worker;

pub use error::EngineError;
pub use pipeline::{Pipeline, SwapIndexer};
pub use pnl::PnlReconstructor;
pub use sync::{PairCache, PoolIdentity, PoolProtocol, Synchronizer};
pub use worker::{JobQueue, WorkerConfig, spawn_worker};
