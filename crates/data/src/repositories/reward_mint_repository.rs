//! Reward-mint associations: insert-only, duplicate-tolerant.

use sqlx::{PgPool, QueryBuilder, Row};
use std::sync::Arc;

#[derive(Clone)]
pub struct RewardMintRepository {
    pool: Arc<PgPool>,
}

impl RewardMintRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Records `(pair, mint)` farming-reward associations; duplicates are a
    /// no-op.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn insert_many(&self, rewards: &[(String, String)]) -> Result<(), sqlx::Error> {
        if rewards.is_empty() {
            return Ok(());
        }
        let mut builder = QueryBuilder::new("INSERT INTO reward_mints (pair, mint) ");
        builder.push_values(rewards, |mut row, (pair, mint)| {
            row.push_bind(pair).push_bind(mint);
        });
        builder.push(" ON CONFLICT (pair, mint) DO NOTHING");
        builder.build().execute(self.pool.as_ref()).await?;
        Ok(())
    }

    /// Reward mints recorded for a pair.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_pair(&self, pair: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT mint FROM reward_mints WHERE pair = $1")
            .bind(pair)
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(|row| row.try_get("mint")).collect()
    }
}
