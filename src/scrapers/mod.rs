pub mod browser;
pub mod extract;
pub mod http;
pub mod listing;
pub mod traits;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;
pub use listing::ListingParser;
pub use traits::{PageFetcher, PageKind};
