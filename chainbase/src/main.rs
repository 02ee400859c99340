//! chainbase: scheduled options-chain harvester.
//!
//! # Usage
//!
//! ```bash
//! export TRADIER_API_KEY=... FMP_API_KEY=... DATABASE_URL=postgres://...
//!
//! # Create the options_chains table
//! chainbase init-db
//!
//! # Harvest every hour, forever
//! chainbase run --config config/default.toml
//!
//! # Single cycle for a custom universe
//! chainbase run --tickers AAPL,SPY.ETF --once
//!
//! # Show what a cycle would fetch, without writing anything
//! chainbase explore --tickers SPY.ETF
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use chainbase::config::{Credentials, HarvestConfig};
use chainbase::data::{ApiClient, Auth, FmpClient, OptionRecord, RateLimiter, TradierClient};
use chainbase::harvest::{Harvester, Scheduler};
use chainbase::storage::{PgOptionStore, RecordSink, StorageError};

const SEPARATOR: &str = "============================================================";

/// Options-chain harvester CLI.
#[derive(Parser)]
#[command(name = "chainbase")]
#[command(about = "Harvest option chains for tickers and ETF holdings into PostgreSQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest on a fixed schedule
    Run {
        /// Comma-separated tickers, overriding the config (e.g., AAPL,SPY.ETF)
        #[arg(long)]
        tickers: Option<String>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Create the options_chains table if missing
    InitDb,

    /// Resolve the universe and list eligible expirations without persisting
    Explore {
        /// Comma-separated tickers, overriding the config
        #[arg(long)]
        tickers: Option<String>,
    },
}

/// Sink for exploration: nothing reaches the database.
struct DiscardSink;

impl RecordSink for DiscardSink {
    async fn commit(&self, _records: &[OptionRecord]) -> Result<u64, StorageError> {
        Ok(0)
    }
}

fn load_config(path: Option<&PathBuf>, tickers: Option<&str>) -> Result<HarvestConfig> {
    let mut config = match path {
        Some(p) => HarvestConfig::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => HarvestConfig::default(),
    };
    if let Some(csv) = tickers {
        config.override_tickers(csv);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_sources(config: &HarvestConfig, creds: &Credentials) -> Result<(TradierClient, FmpClient)> {
    let tradier_limiter = Arc::new(RateLimiter::per_minute("tradier", config.tradier.calls_per_minute));
    let fmp_limiter = Arc::new(RateLimiter::per_minute("fmp", config.fmp.calls_per_minute));

    let tradier = ApiClient::new(
        config.tradier_base_url(),
        Auth::Bearer(creds.tradier_api_key.clone()),
        tradier_limiter,
        config.tradier.timeout(),
    )
    .context("Failed to build Tradier client")?;
    let fmp = ApiClient::new(
        config.fmp_base_url(),
        Auth::Query {
            param: "apikey",
            value: creds.fmp_api_key.clone(),
        },
        fmp_limiter,
        config.fmp.timeout(),
    )
    .context("Failed to build FMP client")?;

    Ok((TradierClient::new(tradier), FmpClient::new(fmp)))
}

async fn connect_store(config: &HarvestConfig, creds: &Credentials) -> Result<PgOptionStore> {
    let store = PgOptionStore::connect(&creds.database_url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    store.ensure_schema().await.context("Failed to create schema")?;
    Ok(store)
}

async fn cmd_run(config: HarvestConfig, once: bool) -> Result<()> {
    let creds = Credentials::from_env(&config)?;
    let timezone = config.timezone()?;
    let (tradier, fmp) = build_sources(&config, &creds)?;
    let store = connect_store(&config, &creds).await?;

    let harvester = Harvester::new(tradier, fmp, store, config.entries(), config.window)
        .with_max_concurrent_tickers(config.harvest.max_concurrent_tickers);
    let scheduler = Scheduler::new(config.interval(), timezone)
        .with_trading_hours(config.schedule.trading_hours)
        .with_max_cycles(once.then_some(1));

    info!(
        entries = harvester.entries().len(),
        min_dte = config.window.min_dte,
        max_dte = config.window.max_dte,
        "starting harvester"
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("interrupt received, stopping after the current cycle"),
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await
            }
        }
    };
    let ticks = scheduler.run_until(&harvester, shutdown).await;
    info!(ticks, "harvester finished");

    info!(
        tradier_requests = harvester.options().request_count(),
        fmp_requests = harvester.holdings().request_count(),
        "upstream usage"
    );
    Ok(())
}

async fn cmd_init_db(config: HarvestConfig) -> Result<()> {
    let database_url = Credentials::database_url_from_env(&config)?;

    let store = PgOptionStore::connect(&database_url, 1)
        .await
        .context("Failed to connect to database")?;
    store.ensure_schema().await.context("Failed to create schema")?;
    println!("options_chains table ready");
    Ok(())
}

async fn cmd_explore(config: HarvestConfig) -> Result<()> {
    let creds = Credentials::from_env(&config)?;
    let timezone = config.timezone()?;
    let (tradier, fmp) = build_sources(&config, &creds)?;

    let harvester = Harvester::new(tradier, fmp, DiscardSink, config.entries(), config.window);
    let now = chrono::Utc::now().with_timezone(&timezone);

    println!("{}", SEPARATOR);
    println!("Harvest exploration @ {}", now.format("%Y-%m-%d %H:%M %Z"));
    println!("{}", SEPARATOR);

    println!("\n1. Expanding universe...");
    let expansion = harvester.expand().await;
    println!("   ETFs resolved: {}", expansion.etfs_resolved);
    if !expansion.etfs_skipped.is_empty() {
        println!("   ETFs skipped: {}", expansion.etfs_skipped.join(", "));
    }
    println!("   Tickers: {}", expansion.universe.len());

    println!(
        "\n2. Eligible expirations (DTE {}..={})...",
        config.window.min_dte, config.window.max_dte
    );
    let mut total = 0usize;
    for symbol in expansion.universe.tickers() {
        match harvester.eligible_for(symbol, &now).await {
            Ok(dates) => {
                total += dates.len();
                let first = dates.first().map(|d| d.to_string()).unwrap_or("-".into());
                let last = dates.last().map(|d| d.to_string()).unwrap_or("-".into());
                println!("   {:<8} {:>3} expirations  {} .. {}", symbol, dates.len(), first, last);
            }
            Err(e) => println!("   {:<8} ERROR - {}", symbol, e),
        }
    }

    println!("\n3. Cycle estimate:");
    println!("   Chain requests per cycle: ~{}", total);
    println!(
        "   Minutes at {} calls/min: ~{:.1}",
        config.tradier.calls_per_minute,
        (total + expansion.universe.len()) as f64 / config.tradier.calls_per_minute.max(1) as f64
    );
    println!("\n{}", SEPARATOR);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chainbase=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { tickers, once } => {
            let config = load_config(cli.config.as_ref(), tickers.as_deref())?;
            cmd_run(config, once).await?;
        }
        Commands::InitDb => {
            let config = match &cli.config {
                Some(p) => HarvestConfig::load(p).with_context(|| format!("loading {}", p.display()))?,
                None => HarvestConfig::default(),
            };
            cmd_init_db(config).await?;
        }
        Commands::Explore { tickers } => {
            let config = load_config(cli.config.as_ref(), tickers.as_deref())?;
            cmd_explore(config).await?;
        }
    }

    Ok(())
}
