use crate::{
    error::AppResult,
    models::{CacheEntry, ProviderRecord, TitleIdentity},
};

/// Persistent availability cache keyed by (title, region)
///
/// Implementations hold at most one entry per key. `put` replaces the whole
/// provider list atomically: a concurrent `get` sees either the old list or
/// the new one, never a mix. No retries happen at this layer.
#[async_trait::async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Returns the entry if present, fresh or not
    async fn get(&self, title: &TitleIdentity, region: &str) -> AppResult<Option<CacheEntry>>;

    /// Replaces any existing entry, stamped with the current time
    async fn put(
        &self,
        title: &TitleIdentity,
        region: &str,
        providers: Vec<ProviderRecord>,
    ) -> AppResult<()>;

    /// Removes the entry; a missing entry is not an error
    async fn delete(&self, title: &TitleIdentity, region: &str) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
