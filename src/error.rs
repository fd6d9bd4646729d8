use std::time::Duration;

use thiserror::Error;

/// Why a page could not be fetched. Always recoverable at the crawl level:
/// the caller logs it and moves on to the next page or listing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {timeout:?} waiting for '{selector}' on {url}")]
    PageLoadTimeout {
        url: String,
        selector: String,
        timeout: Duration,
    },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("'{selector}' not present in {url}")]
    ElementMissing { url: String, selector: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl FetchError {
    pub fn navigation(url: &str, reason: impl std::fmt::Display) -> Self {
        FetchError::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
