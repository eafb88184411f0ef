//! Postgres-backed integration tests. They exercise the idempotent upsert
//! semantics and the end-to-end swap path against a real database and are
//! ignored unless one is available:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/poolscope_test cargo test -- --ignored
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_program::program_option::COption;
use solana_program::program_pack::Pack;
use solana_sdk::account::Account;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;

use poolscope_data::Database;
use poolscope_engine::sync::PairCache;
use poolscope_engine::{Pipeline, SwapIndexer};
use poolscope_pricing::sources::{BulkPriceSource, SpotPriceSource, TokenPrice};
use poolscope_pricing::{PriceError, PriceResolver};
use poolscope_protocols::anchor::account_discriminator;
use poolscope_protocols::events::{
    EventDecoder, ProtocolEvent, SarosEvent, SarosSwapEvent,
};
use poolscope_protocols::rpc::{AccountFetcher, TransactionRecord};
use poolscope_protocols::saros::{
    DynamicFeeParameters, Pair, StaticFeeParameters,
};
use poolscope_protocols::ProtocolError;

/// Serves a fixed account map, like a chain snapshot.
struct SnapshotFetcher {
    accounts: HashMap<Pubkey, Account>,
}

#[async_trait]
impl AccountFetcher for SnapshotFetcher {
    async fn fetch_accounts(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, ProtocolError> {
        Ok(keys.iter().map(|key| self.accounts.get(key).cloned()).collect())
    }
}

struct FixedPrices {
    prices: Vec<(String, f64)>,
}

#[async_trait]
impl BulkPriceSource for FixedPrices {
    async fn prices(&self, mints: &[String]) -> Result<Vec<TokenPrice>, PriceError> {
        Ok(self
            .prices
            .iter()
            .filter(|(id, _)| mints.contains(id))
            .map(|(id, price)| TokenPrice {
                id: id.clone(),
                price: *price,
            })
            .collect())
    }
}

struct NoSpot;

#[async_trait]
impl SpotPriceSource for NoSpot {
    async fn price(&self, _mint: &str) -> Result<Option<f64>, PriceError> {
        Ok(None)
    }

    async fn price_at(&self, _mint: &str, _ts: i64) -> Result<Option<f64>, PriceError> {
        Ok(None)
    }
}

/// Decoder stub that replays canned events for any transaction.
struct CannedDecoder {
    events: Vec<ProtocolEvent>,
}

impl EventDecoder for CannedDecoder {
    fn decode(&self, _tx: &TransactionRecord) -> Result<Vec<ProtocolEvent>, ProtocolError> {
        Ok(self.events.clone())
    }
}

struct Fixture {
    db: Database,
    fetcher: Arc<SnapshotFetcher>,
    prices: Arc<PriceResolver>,
    pair: Pubkey,
    base_mint: Pubkey,
    quote_mint: Pubkey,
}

fn spl_mint_account(decimals: u8) -> Account {
    let mint = spl_token::state::Mint {
        mint_authority: COption::None,
        supply: 1_000_000_000_000,
        decimals,
        is_initialized: true,
        freeze_authority: COption::None,
    };
    let mut data = vec![0u8; spl_token::state::Mint::LEN];
    spl_token::state::Mint::pack(mint, &mut data).unwrap();
    Account {
        lamports: 1,
        data,
        owner: spl_token::id(),
        executable: false,
        rent_epoch: 0,
    }
}

fn spl_token_account(mint: Pubkey, owner: Pubkey, amount: u64) -> Account {
    let token = spl_token::state::Account {
        mint,
        owner,
        amount,
        delegate: COption::None,
        state: spl_token::state::AccountState::Initialized,
        is_native: COption::None,
        delegated_amount: 0,
        close_authority: COption::None,
    };
    let mut data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(token, &mut data).unwrap();
    Account {
        lamports: 1,
        data,
        owner: spl_token::id(),
        executable: false,
        rent_epoch: 0,
    }
}

/// One Saros pair with bin_step 1, base factor 10_000 (base fee 0.01) and
/// protocol share 2_000 (protocol fee 0.002), reserves of 100/200 units.
async fn fixture() -> Fixture {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let db = Database::connect(&database_url).await.unwrap();
    db.migrate().await.unwrap();

    let pair = Pubkey::new_unique();
    let base_mint = Pubkey::new_unique();
    let quote_mint = Pubkey::new_unique();

    let state = Pair {
        bump: [254],
        liquidity_book_config: Pubkey::new_unique(),
        bin_step: 1,
        bin_step_seed: [1],
        token_mint_x: base_mint,
        token_mint_y: quote_mint,
        static_fee_parameters: StaticFeeParameters {
            base_factor: 10_000,
            filter_period: 30,
            decay_period: 600,
            reduction_factor: 5_000,
            variable_fee_control: 0,
            max_volatility_accumulator: 350_000,
            protocol_share: 2_000,
            padding: [0; 2],
        },
        active_id: 8_388_608,
        dynamic_fee_parameters: DynamicFeeParameters {
            time_last_updated: 0,
            volatility_accumulator: 0,
            volatility_reference: 0,
            id_reference: 0,
            padding: [0; 4],
        },
        protocol_fees_x: 0,
        protocol_fees_y: 0,
        hook: None,
    };
    let mut pair_data = account_discriminator(Pair::ACCOUNT_NAME).to_vec();
    pair_data.extend(borsh::to_vec(&state).unwrap());

    let token_program: Pubkey = spl_token::id();
    let base_vault =
        get_associated_token_address_with_program_id(&pair, &base_mint, &token_program);
    let quote_vault =
        get_associated_token_address_with_program_id(&pair, &quote_mint, &token_program);

    let mut accounts = HashMap::new();
    accounts.insert(
        pair,
        Account {
            lamports: 1,
            data: pair_data,
            owner: poolscope_protocols::saros::SAROS_DLMM_PROGRAM_ID,
            executable: false,
            rent_epoch: 0,
        },
    );
    accounts.insert(base_mint, spl_mint_account(9));
    accounts.insert(quote_mint, spl_mint_account(6));
    accounts.insert(base_vault, spl_token_account(base_mint, pair, 100_000_000_000));
    accounts.insert(quote_vault, spl_token_account(quote_mint, pair, 200_000_000));

    let prices = Arc::new(PriceResolver::new(
        Arc::new(FixedPrices {
            prices: vec![
                (base_mint.to_string(), 2.0),
                (quote_mint.to_string(), 1.0),
            ],
        }),
        Arc::new(FixedPrices { prices: vec![] }),
        Arc::new(NoSpot),
    ));

    Fixture {
        db,
        fetcher: Arc::new(SnapshotFetcher { accounts }),
        prices,
        pair,
        base_mint,
        quote_mint,
    }
}

fn indexer(fixture: &Fixture) -> Arc<SwapIndexer> {
    Arc::new(SwapIndexer::new(
        fixture.db.clone(),
        fixture.fetcher.clone(),
        fixture.prices.clone(),
        Arc::new(PairCache::new(Duration::from_secs(60))),
    ))
}

fn sell_swap(pair: Pubkey) -> ProtocolEvent {
    ProtocolEvent::Saros(SarosEvent::Swap(SarosSwapEvent {
        pair,
        swap_for_y: true,
        bin_id: 8_388_608,
        amount_in: 1_000_000_000,
        amount_out: 1_990_000,
        fee: 10_000_000,
        protocol_fee: 2_000_000,
    }))
}

#[tokio::test]
#[ignore = "requires a postgres instance via DATABASE_URL"]
async fn test_end_to_end_sell_swap_creates_pair_and_swap() {
    let fixture = fixture().await;
    let signature = Pubkey::new_unique().to_string();

    let inserted = indexer(&fixture)
        .index_swaps(&signature, &[sell_swap(fixture.pair)])
        .await
        .unwrap();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].swap_type, "sell");
    assert_eq!(inserted[0].signature, signature);
    // 1 base in at $2 and the 0.01 base-side fee valued the same way.
    assert!((inserted[0].base_amount_usd - 2.0).abs() < 1e-9);
    assert!((inserted[0].fee_usd - 0.02).abs() < 1e-9);

    let pairs = fixture
        .db
        .pairs()
        .find_by_ids(&[fixture.pair.to_string()])
        .await
        .unwrap();
    assert_eq!(pairs.len(), 1);
    let pair = &pairs[0].pair;
    assert_eq!(pair.market, "saros");
    assert_eq!(pair.bin_step, 1);
    assert!((pair.base_fee - 0.01).abs() < 1e-12);
    assert!((pair.protocol_fee - 0.002).abs() < 1e-12);
    // 100 base * $2 + 200 quote * $1.
    assert!((pair.base_reserve_amount_usd - 200.0).abs() < 1e-6);
    assert!((pair.quote_reserve_amount_usd - 200.0).abs() < 1e-6);
    assert!((pair.liquidity - (pair.base_reserve_amount_usd + pair.quote_reserve_amount_usd)).abs() < 1e-9);
    assert_eq!(pairs[0].base_mint.decimals, 9);
    assert_eq!(pairs[0].quote_mint.decimals, 6);
}

#[tokio::test]
#[ignore = "requires a postgres instance via DATABASE_URL"]
async fn test_reprocessing_a_signature_inserts_no_duplicate_swaps() {
    let fixture = fixture().await;
    let signature = Pubkey::new_unique().to_string();
    let events = vec![sell_swap(fixture.pair)];

    let first = indexer(&fixture)
        .index_swaps(&signature, &events)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    // Fresh indexer (fresh single-flight cache) simulates job redelivery.
    let second = indexer(&fixture)
        .index_swaps(&signature, &events)
        .await
        .unwrap();
    assert!(second.is_empty());

    let rows = fixture.db.swaps().find_by_signature(&signature).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
#[ignore = "requires a postgres instance via DATABASE_URL"]
async fn test_ensure_twice_keeps_one_pair_with_identity_intact() {
    let fixture = fixture().await;
    let signature_a = Pubkey::new_unique().to_string();
    let signature_b = Pubkey::new_unique().to_string();
    let events = vec![sell_swap(fixture.pair)];

    indexer(&fixture).index_swaps(&signature_a, &events).await.unwrap();
    let before = fixture
        .db
        .pairs()
        .find_by_ids(&[fixture.pair.to_string()])
        .await
        .unwrap();

    indexer(&fixture).index_swaps(&signature_b, &events).await.unwrap();
    let after = fixture
        .db
        .pairs()
        .find_by_ids(&[fixture.pair.to_string()])
        .await
        .unwrap();

    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].pair.base_mint, fixture.base_mint.to_string());
    assert_eq!(after[0].pair.quote_mint, fixture.quote_mint.to_string());
    assert_eq!(after[0].pair.market, before[0].pair.market);
    assert_eq!(after[0].pair.name, before[0].pair.name);
    assert_eq!(after[0].pair.created_at, before[0].pair.created_at);
}

#[tokio::test]
#[ignore = "requires a postgres instance via DATABASE_URL"]
async fn test_pipeline_skips_failed_transactions() {
    let fixture = fixture().await;
    let signature = Pubkey::new_unique().to_string();

    let pipeline = Pipeline::new(
        Arc::new(CannedDecoder {
            events: vec![sell_swap(fixture.pair)],
        }),
        indexer(&fixture),
    );
    let tx = TransactionRecord {
        signature: signature.clone(),
        slot: 1,
        block_time: Some(1_700_000_000),
        failed: true,
        payload: serde_json::json!({}),
    };

    assert!(pipeline.process(&tx).await.unwrap().is_empty());
    let rows = fixture.db.swaps().find_by_signature(&signature).await.unwrap();
    assert!(rows.is_empty());
}
