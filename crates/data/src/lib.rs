//! Persistence layer: Postgres repositories with the upsert semantics the
//! indexing pipeline relies on for idempotency.

pub mod repositories;

pub use repositories::{
    Database, MintRecord, MintRepository, NewMint, NewPair, NewSwap, PairRecord,
    PairRepository, PairSyncUpdate, PairWithMints, RewardMintRepository, SwapRecord,
    SwapRepository,
};
