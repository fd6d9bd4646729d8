use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::warn;

use crate::crawl::store::temp_path;
use crate::models::{Category, DiscoveredUrl, ListingRecord};

/// Read the `<url>\t<category>` list written by discovery.
///
/// Lines without a category are treated as houses. Repeated URLs keep
/// their first category.
pub fn load_url_list(path: &Path) -> Result<Vec<DiscoveredUrl>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split('\t');
        let url = parts.next().unwrap_or_default().trim();
        let category = match parts.next().map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => raw
                .parse::<Category>()
                .with_context(|| format!("{}:{}", path.display(), i + 1))?,
            None => Category::Houses,
        };

        if !seen.insert(url.to_string()) {
            warn!(url, line = i + 1, "Duplicate URL in list, keeping the first");
            continue;
        }
        urls.push(DiscoveredUrl {
            url: url.to_string(),
            category,
        });
    }
    Ok(urls)
}

pub fn save_url_list(path: &Path, urls: &[DiscoveredUrl]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let tmp = temp_path(path);
    let mut file =
        fs::File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    for item in urls {
        writeln!(file, "{}\t{}", item.url, item.category)?;
    }
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} to {}", tmp.display(), path.display()))
}

/// Progress of one extraction run.
///
/// Holds the discovered URLs, every record known so far keyed by URL (those
/// read from the store plus those scraped this run), and how many records
/// arrived since the last flush.
#[derive(Debug)]
pub struct CrawlState {
    discovered: Vec<DiscoveredUrl>,
    records: IndexMap<String, ListingRecord>,
    pending: usize,
}

impl CrawlState {
    pub fn new(discovered: Vec<DiscoveredUrl>, existing: Vec<ListingRecord>) -> Self {
        let mut records = IndexMap::with_capacity(existing.len());
        for record in existing {
            records.entry(record.url.clone()).or_insert(record);
        }
        Self {
            discovered,
            records,
            pending: 0,
        }
    }

    pub fn discovered(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_done(&self, url: &str) -> bool {
        self.records.contains_key(url)
    }

    /// Discovered URLs that have no record yet, in discovery order.
    pub fn remaining(&self) -> Vec<DiscoveredUrl> {
        self.discovered
            .iter()
            .filter(|item| !self.is_done(&item.url))
            .cloned()
            .collect()
    }

    pub fn record(&mut self, record: ListingRecord) {
        self.records.insert(record.url.clone(), record);
        self.pending += 1;
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn mark_flushed(&mut self) {
        self.pending = 0;
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &ListingRecord> {
        self.records.values()
    }
}
