//! Two-phase crawl: discover listing URLs, then scrape them with
//! checkpoints so an interrupted run can pick up where it stopped.

pub mod state;
pub mod store;

use std::time::Duration;

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{CategorySource, CrawlConfig};
use crate::error::FetchError;
use crate::models::{Category, DiscoveredUrl};
use crate::scrapers::{ListingParser, PageFetcher, PageKind};

pub use state::{load_url_list, save_url_list, CrawlState};
pub use store::RecordStore;

/// Outcome of one crawl invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// URLs in the discovery list.
    pub discovered: usize,
    /// URLs already present in the store when extraction began.
    pub skipped: usize,
    pub scraped: usize,
    pub failed: usize,
    /// Records in the store after the final flush.
    pub total_records: usize,
    pub interrupted: bool,
}

/// Result of the discovery phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Complete(Vec<DiscoveredUrl>),
    /// Stopped by the operator; no URL list was written.
    Interrupted,
}

/// Sequential crawl driver. Owns the only page fetcher and the record
/// accumulator, so nothing here needs locking.
pub struct Crawler {
    fetcher: Box<dyn PageFetcher>,
    parser: ListingParser,
    config: CrawlConfig,
    shutdown: CancellationToken,
}

impl Crawler {
    pub fn new(
        fetcher: Box<dyn PageFetcher>,
        parser: ListingParser,
        config: CrawlConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            parser,
            config,
            shutdown,
        }
    }

    /// Discover first if no URL list exists yet, then extract.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let urls = if self.config.url_file.exists() {
            info!(path = %self.config.url_file.display(), "Using existing URL list");
            load_url_list(&self.config.url_file)?
        } else {
            match self.discover().await? {
                Discovery::Complete(urls) => urls,
                Discovery::Interrupted => {
                    return Ok(CrawlSummary {
                        interrupted: true,
                        ..CrawlSummary::default()
                    })
                }
            }
        };

        self.extract(urls).await
    }

    /// Phase 1: paginate every category index and persist the URL list.
    pub async fn discover(&self) -> Result<Discovery> {
        info!(fetcher = self.fetcher.name(), "📋 PHASE 1: Collecting URLs...");

        let mut all: IndexMap<String, Category> = IndexMap::new();
        for source in &self.config.categories {
            info!(category = %source.category, "Collecting category");
            let Some(urls) = self.collect_category(source).await else {
                warn!("⚠️  Interrupted during discovery, URL list not written");
                return Ok(Discovery::Interrupted);
            };
            info!(category = %source.category, unique = urls.len(), "Category done");
            for url in urls {
                all.entry(url).or_insert(source.category);
            }
        }

        let urls: Vec<DiscoveredUrl> = all
            .into_iter()
            .map(|(url, category)| DiscoveredUrl { url, category })
            .collect();
        save_url_list(&self.config.url_file, &urls)?;
        info!(
            total = urls.len(),
            path = %self.config.url_file.display(),
            "✅ Saved unique listing URLs"
        );

        Ok(Discovery::Complete(urls))
    }

    /// `None` when interrupted.
    async fn collect_category(&self, source: &CategorySource) -> Option<Vec<String>> {
        let mut urls = IndexSet::new();
        let category = source.category;

        for page in 1..=self.config.max_pages_per_category {
            let page_url = match index_page_url(&source.index_url, page) {
                Ok(u) => u,
                Err(e) => {
                    error!(
                        %category,
                        index = %source.index_url,
                        error = %e,
                        "Bad index URL, skipping category"
                    );
                    break;
                }
            };

            let html = match self.fetch(&page_url, PageKind::Index).await? {
                Ok(html) => html,
                Err(e) => {
                    error!(%category, page, error = %e, "Index page failed");
                    continue;
                }
            };

            let links = match self.parser.listing_links(&html, &page_url) {
                Ok(links) => links,
                Err(e) => {
                    error!(%category, page, error = %e, "Could not read index page");
                    continue;
                }
            };

            if links.is_empty() {
                info!(%category, page, "Page empty, stopping");
                break;
            }

            let found = links.len();
            urls.extend(links);
            info!(
                %category,
                page,
                max_pages = self.config.max_pages_per_category,
                found,
                total = urls.len(),
                "Index page collected"
            );
        }

        Some(urls.into_iter().collect())
    }

    /// Phase 2: scrape every discovered URL not yet in the store.
    pub async fn extract(&self, discovered: Vec<DiscoveredUrl>) -> Result<CrawlSummary> {
        info!("🔍 PHASE 2: Scraping listings...");

        let store = RecordStore::new(&self.config.output_file);
        let existing = store.load()?;
        let mut state = CrawlState::new(discovered, existing);
        let remaining = state.remaining();

        let mut summary = CrawlSummary {
            discovered: state.discovered(),
            skipped: state.discovered() - remaining.len(),
            ..CrawlSummary::default()
        };
        info!(
            total = summary.discovered,
            already_scraped = summary.skipped,
            remaining = remaining.len(),
            "Resume state"
        );

        let total = remaining.len();
        for (i, item) in remaining.iter().enumerate() {
            let n = i + 1;
            if self.shutdown.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            info!("[{}/{}]", n, total);
            match self.fetch(&item.url, PageKind::Listing).await {
                None => {
                    summary.interrupted = true;
                    break;
                }
                Some(Ok(html)) => {
                    let record = self.parser.parse(&html, &item.url, item.category);
                    let title: String = record.title.chars().take(45).collect();
                    info!(
                        title = %title,
                        price = ?record.price_lkr,
                        beds = ?record.bedrooms,
                        baths = ?record.bathrooms,
                        land_p = ?record.land_size_p,
                        floor_sqft = ?record.floor_area_sqft,
                        district = %record.district,
                        "  ✓ Listing scraped"
                    );
                    state.record(record);
                    summary.scraped += 1;
                }
                Some(Err(e)) => {
                    error!(url = %item.url, error = %e, "  ✗ Listing failed");
                    summary.failed += 1;
                }
            }

            if every(n, self.config.checkpoint_every) {
                if let Err(e) = flush(&store, &mut state) {
                    let reason = format!("{:#}", e);
                    error!(error = %reason, "Checkpoint failed, will retry at the next one");
                }
            }

            if every(n, self.config.cooldown_every) && n < total {
                let pause = self.config.cooldown.sample();
                info!("  😴 Cool-down {:.0}s...", pause.as_secs_f64());
                if !self.pause(pause).await {
                    summary.interrupted = true;
                    break;
                }
            }
        }

        if summary.interrupted {
            warn!("⚠️  Interrupted, saving progress...");
        }
        flush(&store, &mut state)?;
        summary.total_records = state.record_count();

        Ok(summary)
    }

    /// `None` when the crawl was interrupted before the page arrived.
    async fn fetch(&self, url: &str, kind: PageKind) -> Option<Result<String, FetchError>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            result = self.fetcher.fetch(url, kind) => Some(result),
        }
    }

    /// Sleep unless interrupted. Returns false when interrupted.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn every(n: usize, interval: usize) -> bool {
    interval > 0 && n % interval == 0
}

fn flush(store: &RecordStore, state: &mut CrawlState) -> Result<()> {
    if state.pending() == 0 {
        return Ok(());
    }
    let written = store.save(state.records())?;
    state.mark_flushed();
    info!(records = written, path = %store.path().display(), "  💾 Checkpoint");
    Ok(())
}

/// `<index>?page=<n>`, keeping any query the index URL already has.
fn index_page_url(index_url: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(index_url)?;
    url.query_pairs_mut().append_pair("page", &page.to_string());
    Ok(url.into())
}
