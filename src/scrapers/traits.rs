use async_trait::async_trait;

use crate::error::FetchError;

/// What kind of page is being fetched; decides waits and settle delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A paginated search-results page.
    Index,
    /// A single listing's detail page.
    Listing,
}

/// Common trait for page sources.
/// The crawler only ever sees rendered HTML, so a headless browser and a
/// plain HTTP client are interchangeable behind it.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page and return its HTML once it is usable.
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<String, FetchError>;

    /// Get the name of the fetcher, for logs
    fn name(&self) -> &'static str;
}
