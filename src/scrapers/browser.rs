use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::config::{BrowserConfig, CrawlConfig, DelayRange};
use crate::error::FetchError;
use crate::scrapers::traits::{PageFetcher, PageKind};

/// Cool-downs can leave the browser silent for a while; keep the
/// connection well beyond the longest pause.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const PLATFORM: &str = "Win32";

/// Page fetcher driving a single headless Chrome tab.
///
/// The portal renders listings client-side, so pages are loaded in a real
/// browser and read back once the content element is present.
pub struct BrowserFetcher {
    // Dropping the browser kills the Chrome process; it must outlive `tab`.
    _browser: Browser,
    tab: Arc<Tab>,
    wait_selector: String,
    wait_timeout: Duration,
    page_delay: DelayRange,
    listing_delay: DelayRange,
}

impl BrowserFetcher {
    /// Launch Chrome with automation fingerprints masked.
    pub fn launch(settings: &BrowserConfig, crawl: &CrawlConfig) -> Result<Self> {
        info!(headless = settings.headless, "Launching Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .sandbox(false)
            .window_size(Some((settings.window_width, settings.window_height)))
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .ignore_default_args(vec![OsStr::new("--enable-automation")])
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;

        // Hides navigator.webdriver and friends on every new document.
        tab.enable_stealth_mode()
            .context("Failed to enable stealth mode")?;
        tab.set_user_agent(&settings.user_agent, Some(ACCEPT_LANGUAGE), Some(PLATFORM))
            .context("Failed to set user agent")?;
        tab.set_default_timeout(settings.navigation_timeout());

        Ok(Self {
            _browser: browser,
            tab,
            wait_selector: settings.wait_selector.clone(),
            wait_timeout: settings.wait_timeout(),
            page_delay: crawl.page_delay,
            listing_delay: crawl.listing_delay,
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<String, FetchError> {
        let (wait, settle) = match kind {
            PageKind::Index => (None, self.page_delay.sample()),
            PageKind::Listing => (
                Some((self.wait_selector.clone(), self.wait_timeout)),
                self.listing_delay.sample(),
            ),
        };
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();

        tokio::task::spawn_blocking(move || render(&tab, &url, wait, settle)).await?
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

fn render(
    tab: &Tab,
    url: &str,
    wait: Option<(String, Duration)>,
    settle: Duration,
) -> Result<String, FetchError> {
    debug!(url, "Navigating");
    tab.navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| FetchError::navigation(url, format!("{:#}", e)))?;

    if let Some((selector, timeout)) = wait {
        tab.wait_for_element_with_custom_timeout(&selector, timeout)
            .map_err(|_| FetchError::PageLoadTimeout {
                url: url.to_string(),
                selector: selector.clone(),
                timeout,
            })?;
    }

    // Human-paced pause; also gives late client-side content time to land.
    thread::sleep(settle);

    tab.get_content()
        .map_err(|e| FetchError::Browser(format!("{:#}", e)))
}
