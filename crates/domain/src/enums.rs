use serde::{Deserialize, Serialize};

/// Supported AMM protocols. The string codes are what the `pairs.market`
/// column stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Meteora,
    Saros,
    Orca,
    Raydium,
}

impl Market {
    pub const ALL: [Market; 4] = [
        Market::Meteora,
        Market::Saros,
        Market::Orca,
        Market::Raydium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Meteora => "meteora",
            Market::Saros => "saros",
            Market::Orca => "orca",
            Market::Raydium => "raydium",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Market {
    type Err = UnknownMarket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meteora" => Ok(Market::Meteora),
            "saros" => Ok(Market::Saros),
            "orca" => Ok(Market::Orca),
            "raydium" => Ok(Market::Raydium),
            other => Err(UnknownMarket(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown market: {0}")]
pub struct UnknownMarket(pub String);

/// Trade direction from the pool's point of view. Selling base for quote
/// (`swap_for_y` / `a_to_b` / `zero_for_one`) is a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapSide {
    Buy,
    Sell,
}

impl SwapSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapSide::Buy => "buy",
            SwapSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for SwapSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
