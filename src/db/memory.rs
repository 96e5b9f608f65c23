use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    db::AvailabilityStore,
    error::AppResult,
    models::{CacheEntry, ProviderRecord, TitleIdentity},
    services::freshness::{Clock, SystemClock},
};

type EntryKey = (TitleIdentity, String);

/// In-process availability store
///
/// Entries are swapped whole under their shard lock, which is what makes
/// `put` an atomic replace. Writes to keys in different shards proceed in
/// parallel. Contents do not survive a restart.
#[derive(Clone)]
pub struct MemoryAvailabilityStore {
    entries: Arc<DashMap<EntryKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryAvailabilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Inserts a prepared entry as-is, keeping its timestamp
    pub fn insert_entry(&self, entry: CacheEntry) {
        let key = (entry.title, entry.region.clone());
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl AvailabilityStore for MemoryAvailabilityStore {
    async fn get(&self, title: &TitleIdentity, region: &str) -> AppResult<Option<CacheEntry>> {
        let key = (*title, region.to_string());
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        title: &TitleIdentity,
        region: &str,
        providers: Vec<ProviderRecord>,
    ) -> AppResult<()> {
        let entry = CacheEntry {
            title: *title,
            region: region.to_string(),
            providers,
            fetched_at: self.clock.now(),
        };

        self.entries.insert((*title, region.to_string()), entry);

        Ok(())
    }

    async fn delete(&self, title: &TitleIdentity, region: &str) -> AppResult<()> {
        self.entries.remove(&(*title, region.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
