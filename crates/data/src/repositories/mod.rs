//! Repository implementations for the indexer's persistent entities.
//!
//! All writes are upserts keyed by natural on-chain identity (mint address,
//! pool address, signature + instruction index) so concurrent writers
//! converge instead of conflicting.

mod mint_repository;
mod pair_repository;
mod reward_mint_repository;
mod swap_repository;

pub use mint_repository::{MintRecord, MintRepository, NewMint};
pub use pair_repository::{NewPair, PairRecord, PairRepository, PairSyncUpdate, PairWithMints};
pub use reward_mint_repository::RewardMintRepository;
pub use swap_repository::{NewSwap, SwapRecord, SwapRepository};

use sqlx::PgPool;
use std::sync::Arc;

/// Database connection wrapper handed to every service.
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Creates a new Database wrapper from a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Creates a new database connection from a connection string.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn mints(&self) -> MintRepository {
        MintRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn pairs(&self) -> PairRepository {
        PairRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn reward_mints(&self) -> RewardMintRepository {
        RewardMintRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn swaps(&self) -> SwapRepository {
        SwapRepository::new(self.pool.clone())
    }

    /// Runs database migrations.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(include_str!("../../migrations/001_initial_schema.sql"))
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
