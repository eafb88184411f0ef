//! Core domain types shared across the poolscope workspace.

pub mod amount;
pub mod enums;
pub mod pnl;

pub use amount::to_ui_amount;
pub use enums::{Market, SwapSide};
pub use pnl::{PositionPnl, pnl_percent};
