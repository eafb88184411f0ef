//! Swap repository: conflict-no-op on `(signature, instruction_index)` so
//! reprocessing a transaction never duplicates an economic event.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use std::sync::Arc;

use poolscope_domain::SwapSide;

/// Database record for one trade.
#[derive(Debug, Clone)]
pub struct SwapRecord {
    pub signature: String,
    /// Position of the swap inside its transaction.
    pub instruction_index: i32,
    pub pair: String,
    /// "buy" or "sell".
    pub swap_type: String,
    pub base_amount_usd: f64,
    pub quote_amount_usd: f64,
    pub fee_usd: f64,
    /// Pair liquidity at the time of the swap.
    pub tvl: Option<f64>,
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub extra: serde_json::Value,
}

impl SwapRecord {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            signature: row.try_get("signature")?,
            instruction_index: row.try_get("instruction_index")?,
            pair: row.try_get("pair")?,
            swap_type: row.try_get("type")?,
            base_amount_usd: row.try_get("base_amount_usd")?,
            quote_amount_usd: row.try_get("quote_amount_usd")?,
            fee_usd: row.try_get("fee_usd")?,
            tvl: row.try_get("tvl")?,
            price: row.try_get("price")?,
            created_at: row.try_get("created_at")?,
            extra: row.try_get("extra")?,
        })
    }
}

/// Values for a swap insert.
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub signature: String,
    pub instruction_index: i32,
    pub pair: String,
    pub side: SwapSide,
    pub base_amount_usd: f64,
    pub quote_amount_usd: f64,
    pub fee_usd: f64,
    pub tvl: Option<f64>,
    pub price: Option<f64>,
    pub extra: serde_json::Value,
}

#[derive(Clone)]
pub struct SwapRepository {
    pool: Arc<PgPool>,
}

impl SwapRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts swaps, returning the rows that were actually created.
    /// Replayed `(signature, instruction_index)` pairs are silently
    /// dropped; that is the idempotency guarantee job redelivery leans on.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn insert_many(&self, swaps: &[NewSwap]) -> Result<Vec<SwapRecord>, sqlx::Error> {
        if swaps.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new(
            "INSERT INTO swaps (signature, instruction_index, pair, type, base_amount_usd, \
             quote_amount_usd, fee_usd, tvl, price, extra) ",
        );
        builder.push_values(swaps, |mut row, swap| {
            row.push_bind(&swap.signature)
                .push_bind(swap.instruction_index)
                .push_bind(&swap.pair)
                .push_bind(swap.side.as_str())
                .push_bind(swap.base_amount_usd)
                .push_bind(swap.quote_amount_usd)
                .push_bind(swap.fee_usd)
                .push_bind(swap.tvl)
                .push_bind(swap.price)
                .push_bind(&swap.extra);
        });
        builder.push(" ON CONFLICT (signature, instruction_index) DO NOTHING RETURNING *");
        let rows = builder.build().fetch_all(self.pool.as_ref()).await?;
        rows.iter().map(SwapRecord::from_row).collect()
    }

    /// All swaps recorded for a transaction, in instruction order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_signature(
        &self,
        signature: &str,
    ) -> Result<Vec<SwapRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM swaps WHERE signature = $1 ORDER BY instruction_index ASC",
        )
        .bind(signature)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(SwapRecord::from_row).collect()
    }
}
