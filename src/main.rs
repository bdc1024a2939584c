#![forbid(unsafe_code)]

use std::{fs, fs::File, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use broker_oxidizer::{
    enrich_transactions, identify_accounts, parse_transactions, read_rows, BrokerFormat,
    CacheConfig, EnrichmentOptions, ExportFormat, FileTickerCache, FileTickerResolver,
    QuoteSearch, TickerResolver, YahooClient, YahooIsinResolver, YahooNameResolver,
};
use clap::{Args, Parser, Subcommand};

/// Parse broker transaction CSVs and export them to other formats.
#[derive(Debug, Parser)]
#[command(name = "broker-oxidizer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export a broker CSV to another format, resolving tickers on the way.
    Export(ExportArgs),
    /// List the accounts found in a broker CSV with their transaction counts.
    Accounts {
        /// Path to the broker CSV file.
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Path to the broker CSV file.
    file: PathBuf,

    /// Broker format (auto, avanza, nordnet).
    #[arg(short, long, default_value = "auto")]
    format: BrokerFormat,

    /// Exporter to use.
    #[arg(short, long, default_value = "yahoo")]
    exporter: ExportFormat,

    /// Output file path, defaults to the exporter's file name.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON or CSV file mapping ISINs or names to tickers, tried first.
    #[arg(long)]
    ticker_file: Option<PathBuf>,

    /// Disable Yahoo Finance ticker resolution.
    #[arg(long)]
    no_yahoo: bool,

    /// Use Yahoo Finance ISIN search even when --no-yahoo is given.
    #[arg(long)]
    yahoo_isin: bool,

    /// Use Yahoo Finance name search even when --no-yahoo is given.
    #[arg(long)]
    yahoo_name: bool,

    /// Local JSON file caching ticker resolutions.
    #[arg(long, default_value = ".ticker-cache.json")]
    cache: PathBuf,

    /// Disable the ticker cache.
    #[arg(long)]
    no_cache: bool,

    /// Quiet period before cache writes reach disk.
    #[arg(long, default_value_t = 500)]
    cache_debounce_ms: u64,

    /// Re-resolve transactions that already carry a ticker.
    #[arg(long)]
    no_skip_existing: bool,

    /// Run every resolver even after one has found a ticker.
    #[arg(long)]
    all_resolvers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match Cli::parse().command {
        Command::Export(args) => export(args).await,
        Command::Accounts { file } => accounts(file),
    }
}

fn resolver_chain(args: &ExportArgs) -> Result<Vec<Arc<dyn TickerResolver>>> {
    let mut resolvers: Vec<Arc<dyn TickerResolver>> = vec![];
    if let Some(ticker_file) = &args.ticker_file {
        resolvers.push(Arc::new(FileTickerResolver::new(ticker_file)));
    }
    let use_isin = !args.no_yahoo || args.yahoo_isin;
    let use_name = !args.no_yahoo || args.yahoo_name;
    if use_isin || use_name {
        let client: Arc<dyn QuoteSearch> =
            Arc::new(YahooClient::new().context("creating Yahoo Finance client")?);
        if use_isin {
            resolvers.push(Arc::new(YahooIsinResolver::new(client.clone())));
        }
        if use_name {
            resolvers.push(Arc::new(YahooNameResolver::new(client)));
        }
    }
    Ok(resolvers)
}

async fn export(args: ExportArgs) -> Result<()> {
    let mut input_file = File::open(&args.file)
        .with_context(|| format!("opening broker file {}", args.file.display()))?;
    let transactions = parse_transactions(&mut input_file, args.format)?;
    if transactions.is_empty() {
        bail!("no transactions could be parsed from {}", args.file.display());
    }

    let resolvers = resolver_chain(&args)?;
    let transactions = if resolvers.is_empty() {
        transactions
    } else {
        let names: Vec<&str> = resolvers.iter().map(|resolver| resolver.name()).collect();
        log::info!("Resolving tickers using: {}", names.join(", "));
        let cache = (!args.no_cache).then(|| {
            FileTickerCache::with_config(
                &args.cache,
                CacheConfig {
                    debounce: Duration::from_millis(args.cache_debounce_ms),
                    ..CacheConfig::default()
                },
            )
        });
        let mut options = EnrichmentOptions::new(&resolvers)
            .skip_if_present(!args.no_skip_existing)
            .stop_on_first_match(!args.all_resolvers);
        if let Some(cache) = &cache {
            options = options.with_cache(cache);
        }
        let enriched = enrich_transactions(transactions, &options).await;
        if let Some(cache) = &cache {
            if let Err(error) = cache.flush().await {
                log::warn!("Failed to save ticker cache: {:#}", anyhow::Error::from(error));
            }
        }
        let resolved = enriched.iter().filter(|tx| tx.ticker.is_some()).count();
        log::info!("Resolved tickers for {}/{} transactions", resolved, enriched.len());
        enriched
    };

    let result = args.exporter.export(&transactions)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&result.filename));
    fs::write(&output, &result.content)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("Exported to {}", output.display());
    Ok(())
}

fn accounts(file: PathBuf) -> Result<()> {
    let mut input_file =
        File::open(&file).with_context(|| format!("opening broker file {}", file.display()))?;
    let rows = read_rows(&mut input_file).context("reading broker export")?;
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(&["account", "transactions"])?;
    for account in identify_accounts(&rows) {
        writer.write_record(&[account.id, account.count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
