use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::config::{BrowserConfig, CrawlConfig, DelayRange};
use crate::error::FetchError;
use crate::scrapers::traits::{PageFetcher, PageKind};

/// Plain HTTP page fetcher.
///
/// Only sees server-rendered markup, so it suits mirrors and pre-rendered
/// snapshots of the portal rather than the live site.
pub struct HttpFetcher {
    client: Client,
    wait_selector: Selector,
    wait_selector_src: String,
    page_delay: DelayRange,
    listing_delay: DelayRange,
}

impl HttpFetcher {
    pub fn new(settings: &BrowserConfig, crawl: &CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.navigation_timeout())
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        let wait_selector = Selector::parse(&settings.wait_selector).map_err(|e| {
            anyhow::anyhow!("invalid wait selector '{}': {}", settings.wait_selector, e)
        })?;

        Ok(Self {
            client,
            wait_selector,
            wait_selector_src: settings.wait_selector.clone(),
            page_delay: crawl.page_delay,
            listing_delay: crawl.listing_delay,
        })
    }
}

fn has_element(html: &str, selector: &Selector) -> bool {
    Html::parse_document(html).select(selector).next().is_some()
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<String, FetchError> {
        debug!(url, "Fetching URL");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::navigation(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::navigation(url, e))?;
        debug!(url, bytes = html.len(), "Downloaded HTML");

        let settle = match kind {
            PageKind::Index => self.page_delay.sample(),
            PageKind::Listing => {
                if !has_element(&html, &self.wait_selector) {
                    return Err(FetchError::ElementMissing {
                        url: url.to_string(),
                        selector: self.wait_selector_src.clone(),
                    });
                }
                self.listing_delay.sample()
            }
        };
        tokio::time::sleep(settle).await;

        Ok(html)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
