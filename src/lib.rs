//! Property listing scout for ikman.lk.
//!
//! Discovers listing URLs per category, scrapes each listing with a
//! rendering browser, normalizes prices and sizes, and keeps a resumable CSV
//! store. A separate preprocessing step turns the store into model features.

pub mod config;
pub mod crawl;
pub mod district;
pub mod error;
pub mod features;
pub mod models;
pub mod normalize;
pub mod scrapers;
