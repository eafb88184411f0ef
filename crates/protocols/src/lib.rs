//! On-chain account layouts, fee normalization and typed event model for the
//! four supported AMM programs, plus the chain RPC provider they are fetched
//! through.

pub mod anchor;
pub mod error;
pub mod events;
pub mod fees;
pub mod meteora;
pub mod orca;
pub mod raydium;
pub mod rpc;
pub mod saros;
pub mod token;

pub use error::ProtocolError;
pub use fees::FeeBreakdown;
pub use rpc::{AccountFetcher, ChainRpc, MAX_ACCOUNTS_PER_FETCH};
