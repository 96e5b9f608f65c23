//! Upstream availability sources
//!
//! A fetcher turns one title into the provider records the cache stores.
//! Fetchers never fail: network errors, timeouts and bad payloads all come
//! back as an empty list, which callers read as "no known availability".

use async_trait::async_trait;

use crate::models::{ProviderRecord, TitleIdentity};

pub mod tmdb;

pub use tmdb::TmdbFetcher;

/// Trait for availability fetchers
///
/// The region is fixed per fetcher instance, so callers only pass the title.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityFetcher: Send + Sync {
    /// Fetch every stream/rent/buy offer for a title in the configured region
    async fn fetch(&self, title: &TitleIdentity) -> Vec<ProviderRecord>;

    /// Fetcher name for logging and debugging
    fn name(&self) -> &'static str;
}
