//! poolscope command line: runs the indexing worker, refreshes persisted
//! pairs, and reconstructs position PnL.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use poolscope_data::Database;
use poolscope_domain::Market;
use poolscope_engine::sync::PairCache;
use poolscope_engine::{JobQueue, Pipeline, PnlReconstructor, SwapIndexer, WorkerConfig, spawn_worker};
use poolscope_pricing::PriceResolver;
use poolscope_pricing::sources::{GeckoTerminalSource, JupiterSource, SolanaTrackerSource};
use poolscope_protocols::events::LogEventDecoder;
use poolscope_protocols::meteora::METEORA_DLMM_PROGRAM_ID;
use poolscope_protocols::orca::WHIRLPOOL_PROGRAM_ID;
use poolscope_protocols::raydium::RAYDIUM_CLMM_PROGRAM_ID;
use poolscope_protocols::rpc::ChainRpc;
use poolscope_protocols::saros::SAROS_DLMM_PROGRAM_ID;

#[derive(Parser)]
#[command(name = "poolscope")]
#[command(about = "Indexing and USD-valuation layer for Solana AMM pools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to program logs and index swaps as they land
    Run {
        /// Seconds between periodic pair refresh cycles (0 disables)
        #[arg(long, default_value_t = 300)]
        sync_interval_secs: u64,

        /// Concurrent jobs
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
    },
    /// Refresh fee/reserve fields of already-indexed pairs
    SyncPairs {
        /// Market to refresh (meteora, saros, orca, raydium)
        #[arg(short, long)]
        market: String,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Reconstruct realized PnL for a position lifecycle transaction
    Pnl {
        /// Transaction signature of a position creation or decrease
        signature: String,
    },
}

struct Config {
    rpc_url: String,
    rpc_ws_url: String,
    database_url: String,
    coingecko_api_key: Option<String>,
    solana_tracker_api_key: Option<String>,
}

impl Config {
    fn from_env() -> Result<Self> {
        let rpc_url = std::env::var("RPC_URL").context("RPC_URL is required")?;
        let rpc_ws_url = std::env::var("RPC_WS_URL").unwrap_or_else(|_| {
            rpc_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        });
        Ok(Self {
            rpc_url,
            rpc_ws_url,
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            coingecko_api_key: std::env::var("COINGECKO_API_KEY").ok(),
            solana_tracker_api_key: std::env::var("SOLANA_TRACKER_API_KEY").ok(),
        })
    }
}

struct Services {
    db: Database,
    rpc: Arc<ChainRpc>,
    prices: Arc<PriceResolver>,
    indexer: Arc<SwapIndexer>,
}

async fn build_services(config: &Config) -> Result<Services> {
    let db = Database::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    db.migrate().await.context("running migrations")?;

    let rpc = Arc::new(ChainRpc::new(&config.rpc_url));
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;
    let prices = Arc::new(PriceResolver::new(
        Arc::new(JupiterSource::new(http.clone())),
        Arc::new(GeckoTerminalSource::new(
            http.clone(),
            config.coingecko_api_key.clone(),
        )),
        Arc::new(SolanaTrackerSource::new(
            http,
            config.solana_tracker_api_key.clone(),
        )),
    ));
    let indexer = Arc::new(SwapIndexer::new(
        db.clone(),
        rpc.clone(),
        prices.clone(),
        Arc::new(PairCache::new(Duration::from_secs(60))),
    ));

    Ok(Services {
        db,
        rpc,
        prices,
        indexer,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run {
            sync_interval_secs,
            concurrency,
        } => run(config, sync_interval_secs, concurrency).await,
        Commands::SyncPairs {
            market,
            offset,
            limit,
        } => sync_pairs(config, &market, offset, limit).await,
        Commands::Pnl { signature } => pnl(config, &signature).await,
    }
}

async fn run(config: Config, sync_interval_secs: u64, concurrency: usize) -> Result<()> {
    let services = build_services(&config).await?;
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(LogEventDecoder::new()),
        services.indexer.clone(),
    ));
    let (queue, worker) = spawn_worker(
        WorkerConfig {
            concurrency,
            ..WorkerConfig::default()
        },
        services.rpc.clone(),
        pipeline,
    );

    let programs = [
        METEORA_DLMM_PROGRAM_ID,
        SAROS_DLMM_PROGRAM_ID,
        WHIRLPOOL_PROGRAM_ID,
        RAYDIUM_CLMM_PROGRAM_ID,
    ];
    for program in programs {
        tokio::spawn(subscribe_logs(
            config.rpc_ws_url.clone(),
            program,
            queue.clone(),
        ));
    }

    if sync_interval_secs > 0 {
        let indexer = services.indexer.clone();
        let db = services.db.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(sync_interval_secs));
            loop {
                ticker.tick().await;
                for market in Market::ALL {
                    if let Err(err) = sync_market_pages(&db, &indexer, market).await {
                        error!(market = %market, error = %err, "pair sync cycle failed");
                    }
                }
            }
        });
    }

    info!("poolscope indexing started");
    worker.await.ok();
    Ok(())
}

/// Streams log notifications for one program, reconnecting on failure.
/// Signatures of failed transactions are never enqueued.
async fn subscribe_logs(ws_url: String, program: Pubkey, queue: JobQueue) {
    loop {
        let client = match PubsubClient::new(&ws_url).await {
            Ok(client) => client,
            Err(err) => {
                warn!(program = %program, error = %err, "pubsub connect failed, retrying");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        let subscription = client
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![program.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(CommitmentConfig::confirmed()),
                },
            )
            .await;
        let (mut stream, _unsubscribe) = match subscription {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(program = %program, error = %err, "logs subscribe failed, retrying");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        info!(program = %program, "subscribed to program logs");
        while let Some(response) = stream.next().await {
            let log = response.value;
            info!(signature = %log.signature, program = %program, "program.onLogs");
            if log.err.is_some() {
                continue;
            }
            queue.enqueue(&log.signature).await;
        }
        warn!(program = %program, "log stream closed, reconnecting");
    }
}

/// Pages through a market's persisted pairs and refreshes each page.
async fn sync_market_pages(
    db: &Database,
    indexer: &SwapIndexer,
    market: Market,
) -> Result<()> {
    let limit = 100i64;
    let mut offset = 0i64;
    loop {
        let pairs = db.pairs().find_by_market(market, offset, limit).await?;
        if pairs.is_empty() {
            break;
        }
        let updated = indexer.sync_market(market, &pairs).await?;
        info!(market = %market, offset, updated, "pair sync page done");
        if (pairs.len() as i64) < limit {
            break;
        }
        offset += limit;
    }
    Ok(())
}

async fn sync_pairs(config: Config, market: &str, offset: i64, limit: i64) -> Result<()> {
    let market = Market::from_str(market)?;
    let services = build_services(&config).await?;
    let pairs = services.db.pairs().find_by_market(market, offset, limit).await?;
    if pairs.is_empty() {
        info!(market = %market, "no pairs to sync");
        return Ok(());
    }
    let updated = services.indexer.sync_market(market, &pairs).await?;
    info!(market = %market, total = pairs.len(), updated, "pair sync done");
    Ok(())
}

async fn pnl(config: Config, signature: &str) -> Result<()> {
    let services = build_services(&config).await?;
    let reconstructor = PnlReconstructor::new(
        services.rpc.clone(),
        Arc::new(LogEventDecoder::new()),
        services.indexer.clone(),
        services.prices.clone(),
    );
    match reconstructor.compute(signature).await? {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => println!("no position lifecycle event found for {signature}"),
    }
    Ok(())
}
