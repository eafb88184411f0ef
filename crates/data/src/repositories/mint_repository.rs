//! Mint repository: insert-only token registry.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use std::sync::Arc;

/// Database record for a fungible token.
#[derive(Debug, Clone)]
pub struct MintRecord {
    /// On-chain mint address.
    pub id: String,
    pub symbol: String,
    pub name: String,
    /// Authoritative for every fixed-point conversion; immutable once set.
    pub decimals: i32,
    /// Owning token program (legacy SPL or token-2022).
    pub token_program: String,
    pub extra: serde_json::Value,
}

impl MintRecord {
    pub(crate) fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            decimals: row.try_get("decimals")?,
            token_program: row.try_get("token_program")?,
            extra: row.try_get("extra")?,
        })
    }
}

/// Values for a mint insert.
#[derive(Debug, Clone)]
pub struct NewMint {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub decimals: i32,
    pub token_program: String,
    pub extra: serde_json::Value,
}

#[derive(Clone)]
pub struct MintRepository {
    pool: Arc<PgPool>,
}

impl MintRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds mints by address, in no particular order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<MintRecord>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT * FROM mints WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(MintRecord::from_row).collect()
    }

    /// Inserts mints, ignoring addresses that already exist; a mint's
    /// decimals are never overwritten once persisted.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn insert_many(&self, mints: &[NewMint]) -> Result<(), sqlx::Error> {
        if mints.is_empty() {
            return Ok(());
        }
        let mut builder = QueryBuilder::new(
            "INSERT INTO mints (id, symbol, name, decimals, token_program, extra) ",
        );
        builder.push_values(mints, |mut row, mint| {
            row.push_bind(&mint.id)
                .push_bind(&mint.symbol)
                .push_bind(&mint.name)
                .push_bind(mint.decimals)
                .push_bind(&mint.token_program)
                .push_bind(&mint.extra);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING");
        builder.build().execute(self.pool.as_ref()).await?;
        Ok(())
    }
}
