//! Pair repository: idempotent pool registry with identity-preserving
//! conflict semantics.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use poolscope_domain::Market;

use super::mint_repository::MintRecord;

/// Database record for a liquidity pool.
#[derive(Debug, Clone)]
pub struct PairRecord {
    /// On-chain pool address.
    pub id: String,
    pub market: String,
    /// "BASE/QUOTE" symbols.
    pub name: String,
    pub base_mint: String,
    pub quote_mint: String,
    /// Tick/bin granularity, protocol-specific unit.
    pub bin_step: i32,
    pub base_fee: f64,
    pub max_fee: f64,
    pub dynamic_fee: f64,
    pub protocol_fee: f64,
    /// USD TVL; equals the two reserve columns summed after every sync.
    pub liquidity: f64,
    pub base_reserve_amount_usd: f64,
    pub quote_reserve_amount_usd: f64,
    pub sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub extra: serde_json::Value,
}

impl PairRecord {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            market: row.try_get("market")?,
            name: row.try_get("name")?,
            base_mint: row.try_get("base_mint")?,
            quote_mint: row.try_get("quote_mint")?,
            bin_step: row.try_get("bin_step")?,
            base_fee: row.try_get("base_fee")?,
            max_fee: row.try_get("max_fee")?,
            dynamic_fee: row.try_get("dynamic_fee")?,
            protocol_fee: row.try_get("protocol_fee")?,
            liquidity: row.try_get("liquidity")?,
            base_reserve_amount_usd: row.try_get("base_reserve_amount_usd")?,
            quote_reserve_amount_usd: row.try_get("quote_reserve_amount_usd")?,
            sync_at: row.try_get("sync_at")?,
            created_at: row.try_get("created_at")?,
            extra: row.try_get("extra")?,
        })
    }
}

/// A pair with its base/quote mint rows resolved.
#[derive(Debug, Clone)]
pub struct PairWithMints {
    pub pair: PairRecord,
    pub base_mint: MintRecord,
    pub quote_mint: MintRecord,
}

/// Values for a pair insert.
#[derive(Debug, Clone)]
pub struct NewPair {
    pub id: String,
    pub market: Market,
    pub name: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub bin_step: i32,
    pub base_fee: f64,
    pub max_fee: f64,
    pub dynamic_fee: f64,
    pub protocol_fee: f64,
    pub liquidity: f64,
    pub base_reserve_amount_usd: f64,
    pub quote_reserve_amount_usd: f64,
    pub sync_at: Option<DateTime<Utc>>,
    pub extra: serde_json::Value,
}

/// Refreshed mutable fields for an already-persisted pair.
#[derive(Debug, Clone)]
pub struct PairSyncUpdate {
    pub id: String,
    pub bin_step: i32,
    pub base_fee: f64,
    pub max_fee: f64,
    pub dynamic_fee: f64,
    pub protocol_fee: f64,
    pub liquidity: f64,
    pub base_reserve_amount_usd: f64,
    pub quote_reserve_amount_usd: f64,
}

#[derive(Clone)]
pub struct PairRepository {
    pool: Arc<PgPool>,
}

impl PairRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds pairs by pool address with their mint rows resolved. Pairs
    /// whose mint rows are missing are dropped with a warning; that state
    /// is unreachable through the synchronizer.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<PairWithMints>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT * FROM pairs WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(self.pool.as_ref())
            .await?;
        let pairs: Vec<PairRecord> = rows
            .iter()
            .map(PairRecord::from_row)
            .collect::<Result<_, _>>()?;
        self.attach_mints(pairs).await
    }

    /// Pages pairs of one market, oldest first. Used by the periodic sync
    /// job.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn find_by_market(
        &self,
        market: Market,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<PairWithMints>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM pairs WHERE market = $1 ORDER BY created_at ASC OFFSET $2 LIMIT $3",
        )
        .bind(market.as_str())
        .bind(offset)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;
        let pairs: Vec<PairRecord> = rows
            .iter()
            .map(PairRecord::from_row)
            .collect::<Result<_, _>>()?;
        self.attach_mints(pairs).await
    }

    async fn attach_mints(
        &self,
        pairs: Vec<PairRecord>,
    ) -> Result<Vec<PairWithMints>, sqlx::Error> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let mut mint_ids: Vec<String> = pairs
            .iter()
            .flat_map(|pair| [pair.base_mint.clone(), pair.quote_mint.clone()])
            .collect();
        mint_ids.sort();
        mint_ids.dedup();

        let rows = sqlx::query("SELECT * FROM mints WHERE id = ANY($1)")
            .bind(&mint_ids)
            .fetch_all(self.pool.as_ref())
            .await?;
        let mints: HashMap<String, MintRecord> = rows
            .iter()
            .map(|row| {
                let record = MintRecord::from_row(row)?;
                Ok::<_, sqlx::Error>((record.id.clone(), record))
            })
            .collect::<Result<_, _>>()?;

        Ok(pairs
            .into_iter()
            .filter_map(|pair| {
                let base_mint = mints.get(&pair.base_mint).cloned();
                let quote_mint = mints.get(&pair.quote_mint).cloned();
                match (base_mint, quote_mint) {
                    (Some(base_mint), Some(quote_mint)) => Some(PairWithMints {
                        pair,
                        base_mint,
                        quote_mint,
                    }),
                    _ => {
                        warn!(pair = %pair.id, "pair references missing mint rows");
                        None
                    }
                }
            })
            .collect())
    }

    /// Upserts pairs: insert on first sight, and on conflict refresh only
    /// the mutable fee/reserve/liquidity fields; identity fields (market,
    /// mints, name) are never touched by a second writer.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn upsert_many(&self, pairs: &[NewPair]) -> Result<Vec<String>, sqlx::Error> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new(
            "INSERT INTO pairs (id, market, name, base_mint, quote_mint, bin_step, base_fee, \
             max_fee, dynamic_fee, protocol_fee, liquidity, base_reserve_amount_usd, \
             quote_reserve_amount_usd, sync_at, extra) ",
        );
        builder.push_values(pairs, |mut row, pair| {
            row.push_bind(&pair.id)
                .push_bind(pair.market.as_str())
                .push_bind(&pair.name)
                .push_bind(&pair.base_mint)
                .push_bind(&pair.quote_mint)
                .push_bind(pair.bin_step)
                .push_bind(pair.base_fee)
                .push_bind(pair.max_fee)
                .push_bind(pair.dynamic_fee)
                .push_bind(pair.protocol_fee)
                .push_bind(pair.liquidity)
                .push_bind(pair.base_reserve_amount_usd)
                .push_bind(pair.quote_reserve_amount_usd)
                .push_bind(pair.sync_at)
                .push_bind(&pair.extra);
        });
        builder.push(
            " ON CONFLICT (id) DO UPDATE SET \
             bin_step = EXCLUDED.bin_step, \
             base_fee = EXCLUDED.base_fee, \
             max_fee = EXCLUDED.max_fee, \
             dynamic_fee = EXCLUDED.dynamic_fee, \
             protocol_fee = EXCLUDED.protocol_fee, \
             liquidity = EXCLUDED.liquidity, \
             base_reserve_amount_usd = EXCLUDED.base_reserve_amount_usd, \
             quote_reserve_amount_usd = EXCLUDED.quote_reserve_amount_usd, \
             sync_at = EXCLUDED.sync_at \
             RETURNING id",
        );
        let rows = builder.build().fetch_all(self.pool.as_ref()).await?;
        rows.iter().map(|row| row.try_get("id")).collect()
    }

    /// Applies refreshed fee/reserve fields from a sync cycle and stamps
    /// `sync_at`.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn apply_sync_updates(
        &self,
        updates: &[PairSyncUpdate],
    ) -> Result<u64, sqlx::Error> {
        let mut updated = 0;
        for update in updates {
            let result = sqlx::query(
                "UPDATE pairs SET bin_step = $2, base_fee = $3, max_fee = $4, \
                 dynamic_fee = $5, protocol_fee = $6, liquidity = $7, \
                 base_reserve_amount_usd = $8, quote_reserve_amount_usd = $9, \
                 sync_at = NOW() WHERE id = $1",
            )
            .bind(&update.id)
            .bind(update.bin_step)
            .bind(update.base_fee)
            .bind(update.max_fee)
            .bind(update.dynamic_fee)
            .bind(update.protocol_fee)
            .bind(update.liquidity)
            .bind(update.base_reserve_amount_usd)
            .bind(update.quote_reserve_amount_usd)
            .execute(self.pool.as_ref())
            .await?;
            updated += result.rows_affected();
        }
        Ok(updated)
    }
}
