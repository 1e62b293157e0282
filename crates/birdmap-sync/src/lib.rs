//! eBird notable-observation source: query configuration, HTTP client, and
//! collection of API entries into sighting batches.

mod error;
mod source;

#[cfg(feature = "http")]
pub mod http;

pub use error::SyncError;
pub use source::{ApiKey, NotableSource, RegionQuery, collect_notable};

#[cfg(feature = "http")]
pub use http::{ClientConfig, EbirdClient};
