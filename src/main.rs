use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use property_scout::config::{Config, LoggingConfig};
use property_scout::crawl::{load_url_list, CrawlSummary, Crawler, Discovery, RecordStore};
use property_scout::features::build_features;
use property_scout::scrapers::{BrowserFetcher, HttpFetcher, ListingParser, PageFetcher};

#[derive(Debug, Parser)]
#[command(
    name = "property-scout",
    version,
    about = "Scrape and prepare ikman.lk property listings"
)]
struct Cli {
    /// TOML config file (defaults to ./scout.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// How pages are loaded
    #[arg(long, value_enum, global = true, default_value_t = FetcherKind::Browser)]
    fetcher: FetcherKind,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Record store CSV
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Discovered URL list
    #[arg(long, global = true)]
    url_file: Option<PathBuf>,

    /// Index pages to visit per category
    #[arg(long, global = true)]
    max_pages: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FetcherKind {
    Browser,
    Http,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover URLs if needed, then scrape every listing
    Crawl,
    /// Only collect listing URLs
    Discover,
    /// Scrape listings from an existing URL list
    Extract,
    /// Build the model feature table from the record store
    Preprocess {
        #[arg(long, default_value = "clean_properties.csv")]
        clean_file: PathBuf,
        /// Where the encoder and feature name files go
        #[arg(long, default_value = ".")]
        artifacts_dir: PathBuf,
    },
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(output) = &self.output {
            config.crawl.output_file = output.clone();
        }
        if let Some(url_file) = &self.url_file {
            config.crawl.url_file = url_file.clone();
        }
        if let Some(max_pages) = self.max_pages {
            config.crawl.max_pages_per_category = max_pages;
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.directory)?;
    let appender = tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

fn build_fetcher(kind: FetcherKind, config: &Config) -> Result<Box<dyn PageFetcher>> {
    Ok(match kind {
        FetcherKind::Browser => Box::new(BrowserFetcher::launch(&config.browser, &config.crawl)?),
        FetcherKind::Http => Box::new(HttpFetcher::new(&config.browser, &config.crawl)?),
    })
}

fn report(summary: &CrawlSummary, config: &Config) {
    info!(
        discovered = summary.discovered,
        skipped = summary.skipped,
        scraped = summary.scraped,
        failed = summary.failed,
        "Crawl summary"
    );
    if summary.interrupted {
        warn!(
            "Stopped early with {} listings saved; run again to resume",
            summary.total_records
        );
    } else {
        info!(
            "🎉 Done! {} listings → {}",
            summary.total_records,
            config.crawl.output_file.display()
        );
    }
}

fn preprocess(config: &Config, clean_file: &Path, artifacts_dir: &Path) -> Result<()> {
    let records = RecordStore::new(&config.crawl.output_file).load()?;
    if records.is_empty() {
        bail!(
            "No records in {}; run `crawl` first",
            config.crawl.output_file.display()
        );
    }
    build_features(&records).write(clean_file, artifacts_dir)
}

fn crawler(kind: FetcherKind, config: &Config, shutdown: CancellationToken) -> Result<Crawler> {
    let parser = ListingParser::new(
        &config.site,
        config.alias_table()?,
        config.district_resolver()?,
    )?;
    let fetcher = build_fetcher(kind, config)?;
    info!(fetcher = fetcher.name(), "Page fetcher ready");
    Ok(Crawler::new(fetcher, parser, config.crawl.clone(), shutdown))
}

/// The first interrupt cancels `token` so the crawl can save and stop; a
/// second one calls `force_quit` while a browser load is still blocking.
async fn relay_interrupts<S, F>(
    mut signal: S,
    token: CancellationToken,
    force_quit: impl FnOnce(),
) where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if signal().await.is_err() {
        return;
    }
    warn!("Interrupt received, stopping after the current step (Ctrl-C again to quit now)...");
    token.cancel();

    if signal().await.is_ok() {
        error!("Second interrupt, exiting without a final checkpoint");
        force_quit();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let _guard = init_tracing(&config.logging)?;

    info!("🏠 Property Scout - ikman.lk");
    info!("============================");

    let shutdown = CancellationToken::new();
    tokio::spawn(relay_interrupts(
        tokio::signal::ctrl_c,
        shutdown.clone(),
        || {
            std::process::exit(130);
        },
    ));

    let summary = match &cli.command {
        Command::Preprocess {
            clean_file,
            artifacts_dir,
        } => return preprocess(&config, clean_file, artifacts_dir),
        Command::Crawl => crawler(cli.fetcher, &config, shutdown)?.run().await?,
        Command::Discover => {
            match crawler(cli.fetcher, &config, shutdown)?.discover().await? {
                Discovery::Complete(urls) => info!(total = urls.len(), "Discovery finished"),
                Discovery::Interrupted => warn!("Discovery interrupted"),
            }
            return Ok(());
        }
        Command::Extract => {
            if !config.crawl.url_file.exists() {
                bail!(
                    "No URL list at {}; run `discover` first",
                    config.crawl.url_file.display()
                );
            }
            let urls = load_url_list(&config.crawl.url_file)?;
            crawler(cli.fetcher, &config, shutdown)?.extract(urls).await?
        }
    };

    report(&summary, &config);
    Ok(())
}
