//! Runtime configuration, loaded from an optional TOML file.
//!
//! Every field has a default, so an empty or missing file yields a
//! working configuration for ikman.lk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::district::DistrictResolver;
use crate::models::Category;
use crate::scrapers::extract::AliasTable;

pub const DEFAULT_CONFIG_FILE: &str = "scout.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub browser: BrowserConfig,
    pub site: SiteProfile,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load `path` if given, else `scout.toml` when it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Config::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn alias_table(&self) -> Result<AliasTable> {
        match &self.data.aliases_file {
            Some(path) => AliasTable::from_file(path),
            None => AliasTable::bundled(),
        }
    }

    pub fn district_resolver(&self) -> Result<DistrictResolver> {
        match &self.data.sub_areas_file {
            Some(path) => DistrictResolver::from_file(path),
            None => DistrictResolver::bundled(),
        }
    }
}

/// A listing index to paginate during discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySource {
    pub category: Category,
    pub index_url: String,
}

/// Uniform random delay between `min_secs` and `max_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn sample(&self) -> Duration {
        let lo = self.min_secs.max(0.0);
        let hi = self.max_secs.max(lo);
        let secs = if hi > lo {
            rand::thread_rng().gen_range(lo..hi)
        } else {
            lo
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub categories: Vec<CategorySource>,
    pub max_pages_per_category: u32,
    /// Settle time after an index page loads.
    pub page_delay: DelayRange,
    /// Settle time after a listing page loads.
    pub listing_delay: DelayRange,
    pub checkpoint_every: usize,
    pub cooldown_every: usize,
    pub cooldown: DelayRange,
    pub output_file: PathBuf,
    pub url_file: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                CategorySource {
                    category: Category::Houses,
                    index_url: "https://ikman.lk/en/ads/sri-lanka/houses-for-sale".to_string(),
                },
                CategorySource {
                    category: Category::Land,
                    index_url: "https://ikman.lk/en/ads/sri-lanka/land-for-sale".to_string(),
                },
                CategorySource {
                    category: Category::Apartments,
                    index_url: "https://ikman.lk/en/ads/sri-lanka/apartments-for-sale"
                        .to_string(),
                },
            ],
            max_pages_per_category: 40,
            page_delay: DelayRange::new(3.0, 5.0),
            listing_delay: DelayRange::new(2.0, 4.0),
            checkpoint_every: 25,
            cooldown_every: 150,
            cooldown: DelayRange::new(15.0, 25.0),
            output_file: PathBuf::from("raw_properties.csv"),
            url_file: PathBuf::from("listing_urls.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Element whose presence marks a listing page as rendered.
    pub wait_selector: String,
    pub wait_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
}

impl BrowserConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            window_width: 1920,
            window_height: 1080,
            wait_selector: "h1".to_string(),
            wait_timeout_secs: 12,
            navigation_timeout_secs: 30,
        }
    }
}

/// CSS selectors and patterns for the portal's markup. Each list is tried
/// in order; the first element with non-empty text wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Substring an anchor's href must contain to count as a listing link.
    pub listing_link_pattern: String,
    pub title_selector: String,
    pub price_selectors: Vec<String>,
    pub location_selectors: Vec<String>,
    pub description_selectors: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            listing_link_pattern: "/ad/".to_string(),
            title_selector: "h1".to_string(),
            price_selectors: vec![
                "span.price--3SnqI".to_string(),
                "[class*='price']".to_string(),
            ],
            location_selectors: vec![
                "span.town--3UEQE".to_string(),
                "[class*='location']".to_string(),
                "[class*='town']".to_string(),
            ],
            description_selectors: vec![
                "div.description--2-ez3".to_string(),
                "[class*='description--']".to_string(),
                "[class*='_description']".to_string(),
            ],
        }
    }
}

/// Override paths for the bundled lookup tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub aliases_file: Option<PathBuf>,
    pub sub_areas_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: "scraper.log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.crawl.checkpoint_every, 25);
        assert_eq!(config.crawl.categories.len(), 3);
        assert_eq!(config.browser.wait_selector, "h1");
        assert_eq!(config.browser.wait_timeout(), Duration::from_secs(12));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawl]
            cooldown_every = 300
            output_file = "out.csv"
            cooldown = { min_secs = 1.0, max_secs = 2.0 }

            [[crawl.categories]]
            category = "land"
            index_url = "https://example.com/land"

            [browser]
            headless = false
            "#,
        )
        .unwrap();

        assert_eq!(config.crawl.cooldown_every, 300);
        assert_eq!(config.crawl.checkpoint_every, 25);
        assert_eq!(config.crawl.output_file, PathBuf::from("out.csv"));
        assert_eq!(config.crawl.categories.len(), 1);
        assert_eq!(config.crawl.categories[0].category, Category::Land);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window_width, 1920);
    }

    #[test]
    fn delay_samples_stay_in_range() {
        let range = DelayRange::new(1.0, 2.0);
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= Duration::from_secs(1) && d < Duration::from_secs(2));
        }
        assert_eq!(DelayRange::none().sample(), Duration::ZERO);
    }
}
