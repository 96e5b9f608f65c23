use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::{
    db::AvailabilityStore,
    error::{AppError, AppResult},
    models::{
        OfferKind, ProviderIndex, ProviderRecord, TitleIdentity, WatchlistAvailability,
        WatchlistEntry, WatchlistFilter, WatchlistItem, WatchlistSections,
    },
    services::{
        freshness::{Clock, FreshnessPolicy, SystemClock},
        normalizer::ProviderCatalog,
        providers::AvailabilityFetcher,
    },
};

/// Service for fetching and caching streaming availability data
///
/// Serves cached provider slates while they are fresh and refreshes them
/// from upstream otherwise. Every answer is read back from the store after
/// any write, which is what lets stale data win over an empty fetch.
#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    fetcher: Arc<dyn AvailabilityFetcher>,
    catalog: Arc<ProviderCatalog>,
    policy: FreshnessPolicy,
    region: String,
    clock: Arc<dyn Clock>,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn AvailabilityStore>,
        fetcher: Arc<dyn AvailabilityFetcher>,
        catalog: Arc<ProviderCatalog>,
        policy: FreshnessPolicy,
        region: String,
    ) -> Self {
        Self {
            store,
            fetcher,
            catalog,
            policy,
            region,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for freshness decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns cached providers if fresh, otherwise refreshes first
    pub async fn get_or_refresh(&self, title: &TitleIdentity) -> AppResult<Vec<ProviderRecord>> {
        // Check the store
        let entry = self.store.get(title, &self.region).await?;

        if self.policy.is_fresh(entry.as_ref(), self.clock.now()) {
            tracing::debug!(title = %title, "Cache hit");
            return Ok(entry.map(|e| e.providers).unwrap_or_default());
        }

        // Cache miss or stale - go upstream
        tracing::debug!(title = %title, cached = entry.is_some(), "Cache miss or stale entry");

        self.refresh(title).await
    }

    /// Fetches from upstream regardless of freshness, then reads the store
    ///
    /// An empty fetch leaves the existing entry untouched.
    pub async fn refresh(&self, title: &TitleIdentity) -> AppResult<Vec<ProviderRecord>> {
        let providers = self.fetcher.fetch(title).await;

        // Only a non-empty answer replaces what we hold
        if providers.is_empty() {
            tracing::info!(title = %title, "No providers fetched, keeping cached data");
        } else {
            self.store.put(title, &self.region, providers).await?;
        }

        // Read back whatever the store now has
        let entry = self.store.get(title, &self.region).await?;
        Ok(entry.map(|e| e.providers).unwrap_or_default())
    }

    /// Drops the cached entry once no watchlist entry needs it
    pub async fn forget(&self, title: &TitleIdentity) -> AppResult<()> {
        self.store.delete(title, &self.region).await?;
        tracing::debug!(title = %title, "Cached availability removed");
        Ok(())
    }

    /// Resolves providers for a whole watchlist in one pass
    ///
    /// Each distinct title is looked up once, however many entries share it.
    /// The provider filter narrows the sections only; the returned index is
    /// built from every title in scope so the selected option never vanishes.
    pub async fn aggregate(
        &self,
        entries: &[WatchlistEntry],
        filter: &WatchlistFilter,
    ) -> AppResult<WatchlistAvailability> {
        let scoped: Vec<&WatchlistEntry> = entries
            .iter()
            .filter(|e| filter.category.map_or(true, |c| e.title.category == c))
            .collect();

        let mut seen = HashSet::new();
        let distinct: Vec<TitleIdentity> = scoped
            .iter()
            .map(|e| e.title)
            .filter(|title| seen.insert(*title))
            .collect();

        let lookups = self.lookup_all(&distinct).await?;

        let providers = self.build_index(distinct.iter().filter_map(|t| lookups.get(t)));

        let provider_filter = filter
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let mut sections = WatchlistSections::default();
        for entry in scoped {
            let records = lookups.get(&entry.title).cloned().unwrap_or_default();

            if let Some(wanted) = provider_filter {
                if !self.streams_on(&records, wanted) {
                    continue;
                }
            }

            sections.push(WatchlistItem {
                title: entry.title,
                status: entry.status,
                label: entry.label.clone(),
                providers: records,
            });
        }

        tracing::info!(
            entries = entries.len(),
            distinct_titles = distinct.len(),
            shown = sections.len(),
            filter_options = providers.len(),
            "Watchlist availability aggregated"
        );

        Ok(WatchlistAvailability {
            sections,
            providers,
        })
    }

    /// True when a Stream record canonicalizes to `canonical`
    pub fn streams_on(&self, records: &[ProviderRecord], canonical: &str) -> bool {
        records
            .iter()
            .filter(|r| r.offer_kind == OfferKind::Stream)
            .any(|r| self.catalog.canonicalize(&r.display_name) == canonical)
    }

    /// Builds the filter-option index; the first logo seen for a name wins
    fn build_index<'a>(
        &self,
        slates: impl Iterator<Item = &'a Vec<ProviderRecord>>,
    ) -> ProviderIndex {
        let mut index = ProviderIndex::new();

        for record in slates.flatten() {
            if record.offer_kind != OfferKind::Stream {
                continue;
            }

            let canonical = self.catalog.canonicalize(&record.display_name);
            if self.catalog.is_listed(&canonical) {
                index
                    .entry(canonical)
                    .or_insert_with(|| record.logo_ref.clone());
            }
        }

        index
    }

    /// Runs `get_or_refresh` for each title in parallel
    ///
    /// The map lives only for the current pass. Any store failure fails the
    /// whole pass, and lookups still in flight are aborted with it.
    async fn lookup_all(
        &self,
        titles: &[TitleIdentity],
    ) -> AppResult<HashMap<TitleIdentity, Vec<ProviderRecord>>> {
        let mut tasks = JoinSet::new();

        for title in titles {
            let service = self.clone();
            let title = *title;
            tasks.spawn(async move {
                let providers = service.get_or_refresh(&title).await;
                (title, providers)
            });
        }

        let mut results = HashMap::with_capacity(titles.len());

        // Dropping the set on an early return aborts the remaining tasks
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((title, Ok(providers))) => {
                    results.insert(title, providers);
                }
                Ok((title, Err(e))) => {
                    tracing::error!(title = %title, error = %e, "Availability lookup failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Task join error");
                    return Err(AppError::Internal(e.to_string()));
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{
            default_provider_allow_list, default_provider_overrides, default_provider_suffixes,
            parse_overrides,
        },
        db::MemoryAvailabilityStore,
        models::{CacheEntry, Category, WatchStatus},
        services::{
            freshness::FixedClock,
            normalizer::{NameNormalizer, NormalizerConfig},
            providers::MockAvailabilityFetcher,
        },
    };
    use chrono::{Duration, TimeZone, Utc};
    use mockall::predicate::eq;

    fn catalog() -> Arc<ProviderCatalog> {
        let normalizer = NameNormalizer::new(NormalizerConfig::new(
            default_provider_suffixes(),
            parse_overrides(&default_provider_overrides()),
        ));
        Arc::new(ProviderCatalog::new(normalizer, default_provider_allow_list()))
    }

    fn service(
        store: Arc<dyn AvailabilityStore>,
        fetcher: MockAvailabilityFetcher,
    ) -> AvailabilityService {
        AvailabilityService::new(
            store,
            Arc::new(fetcher),
            catalog(),
            FreshnessPolicy::default(),
            "GB".to_string(),
        )
    }

    fn record(name: &str, kind: OfferKind) -> ProviderRecord {
        ProviderRecord {
            display_name: name.to_string(),
            logo_ref: Some(format!("/{}.png", name.to_lowercase().replace(' ', "_"))),
            offer_kind: kind,
            region: "GB".to_string(),
        }
    }

    fn entry(title: TitleIdentity, status: WatchStatus) -> WatchlistEntry {
        WatchlistEntry {
            title,
            status,
            label: None,
        }
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl AvailabilityStore for FailingStore {
        async fn get(&self, _: &TitleIdentity, _: &str) -> AppResult<Option<CacheEntry>> {
            Err(AppError::Internal("store offline".to_string()))
        }

        async fn put(&self, _: &TitleIdentity, _: &str, _: Vec<ProviderRecord>) -> AppResult<()> {
            Err(AppError::Internal("store offline".to_string()))
        }

        async fn delete(&self, _: &TitleIdentity, _: &str) -> AppResult<()> {
            Err(AppError::Internal("store offline".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_get_or_refresh_fresh_entry_skips_fetcher() {
        let store = Arc::new(MemoryAvailabilityStore::new());
        let title = TitleIdentity::movie(27205);
        store
            .put(&title, "GB", vec![record("Netflix", OfferKind::Stream)])
            .await
            .unwrap();

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().never();

        let service = service(store, fetcher);
        let providers = service.get_or_refresh(&title).await.unwrap();

        assert_eq!(providers, vec![record("Netflix", OfferKind::Stream)]);
    }

    #[tokio::test]
    async fn test_get_or_refresh_miss_fetches_and_stores() {
        let store = Arc::new(MemoryAvailabilityStore::new());
        let title = TitleIdentity::movie(27205);

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq(title))
            .times(1)
            .returning(|_| {
                vec![
                    record("Netflix Standard with Ads", OfferKind::Stream),
                    record("Amazon Video", OfferKind::Rent),
                ]
            });

        let service = service(store.clone(), fetcher);
        let providers = service.get_or_refresh(&title).await.unwrap();

        assert_eq!(providers.len(), 2);
        let stored = store.get(&title, "GB").await.unwrap().unwrap();
        assert_eq!(stored.providers, providers);
    }

    #[tokio::test]
    async fn test_get_or_refresh_stale_entry_survives_empty_fetch() {
        let store = Arc::new(MemoryAvailabilityStore::new());
        let title = TitleIdentity::series(1396);
        let stale = CacheEntry {
            title,
            region: "GB".to_string(),
            providers: vec![record("Netflix", OfferKind::Stream)],
            fetched_at: Utc::now() - Duration::days(8),
        };
        store.insert_entry(stale.clone());

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_| Vec::new());

        let service = service(store.clone(), fetcher);
        let providers = service.get_or_refresh(&title).await.unwrap();

        assert_eq!(providers, stale.providers);
        assert_eq!(store.get(&title, "GB").await.unwrap(), Some(stale));
    }

    #[tokio::test]
    async fn test_get_or_refresh_never_cached_and_empty_fetch() {
        let store = Arc::new(MemoryAvailabilityStore::new());

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_| Vec::new());

        let service = service(store.clone(), fetcher);
        let providers = service
            .get_or_refresh(&TitleIdentity::movie(1))
            .await
            .unwrap();

        assert!(providers.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_refresh_respects_injected_clock() {
        let fetched_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let store = Arc::new(MemoryAvailabilityStore::new());
        let title = TitleIdentity::movie(42);
        store
            .insert_entry(CacheEntry {
                title,
                region: "GB".to_string(),
                providers: vec![record("NOW", OfferKind::Stream)],
                fetched_at,
            });

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().never();

        let service = service(store, fetcher)
            .with_clock(Arc::new(FixedClock(fetched_at + Duration::days(6))));

        let providers = service.get_or_refresh(&title).await.unwrap();
        assert_eq!(providers[0].display_name, "NOW");
    }

    #[tokio::test]
    async fn test_refresh_ignores_freshness() {
        let store = Arc::new(MemoryAvailabilityStore::new());
        let title = TitleIdentity::movie(7);
        store
            .put(&title, "GB", vec![record("Netflix", OfferKind::Stream)])
            .await
            .unwrap();

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| vec![record("Disney Plus", OfferKind::Stream)]);

        let service = service(store, fetcher);
        let providers = service.refresh(&title).await.unwrap();

        assert_eq!(providers, vec![record("Disney Plus", OfferKind::Stream)]);
    }

    #[tokio::test]
    async fn test_forget_removes_entry() {
        let store = Arc::new(MemoryAvailabilityStore::new());
        let title = TitleIdentity::movie(7);
        store
            .put(&title, "GB", vec![record("Netflix", OfferKind::Stream)])
            .await
            .unwrap();

        let service = service(store.clone(), MockAvailabilityFetcher::new());
        service.forget(&title).await.unwrap();
        service.forget(&title).await.unwrap();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().never();

        let service = service(Arc::new(FailingStore), fetcher);
        let result = service.get_or_refresh(&TitleIdentity::movie(1)).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    /// Fails lookups for one title and delegates everything else
    struct PartlyFailingStore {
        inner: MemoryAvailabilityStore,
        broken: TitleIdentity,
    }

    #[async_trait::async_trait]
    impl AvailabilityStore for PartlyFailingStore {
        async fn get(&self, title: &TitleIdentity, region: &str) -> AppResult<Option<CacheEntry>> {
            if *title == self.broken {
                return Err(AppError::Internal("store offline".to_string()));
            }
            self.inner.get(title, region).await
        }

        async fn put(
            &self,
            title: &TitleIdentity,
            region: &str,
            providers: Vec<ProviderRecord>,
        ) -> AppResult<()> {
            self.inner.put(title, region, providers).await
        }

        async fn delete(&self, title: &TitleIdentity, region: &str) -> AppResult<()> {
            self.inner.delete(title, region).await
        }

        fn name(&self) -> &'static str {
            "partly-failing"
        }
    }

    /// Answers after a delay and counts the answers it got to give
    #[derive(Default)]
    struct SlowFetcher {
        finished: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AvailabilityFetcher for SlowFetcher {
        async fn fetch(&self, _: &TitleIdentity) -> Vec<ProviderRecord> {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            self.finished
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            vec![record("Netflix", OfferKind::Stream)]
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_aggregate_failure_aborts_pending_lookups() {
        let broken = TitleIdentity::movie(1);
        let slow = TitleIdentity::movie(2);
        let store = Arc::new(PartlyFailingStore {
            inner: MemoryAvailabilityStore::new(),
            broken,
        });
        let fetcher = Arc::new(SlowFetcher::default());

        let service = AvailabilityService::new(
            store.clone(),
            fetcher.clone(),
            catalog(),
            FreshnessPolicy::default(),
            "GB".to_string(),
        );
        let entries = vec![entry(broken, WatchStatus::Want), entry(slow, WatchStatus::Want)];

        let result = service.aggregate(&entries, &WatchlistFilter::default()).await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        // Give a detached lookup time to finish if it had survived
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        assert_eq!(
            fetcher.finished.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_looks_up_each_title_once() {
        let a = TitleIdentity::movie(1);
        let b = TitleIdentity::series(2);

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq(a))
            .times(1)
            .returning(|_| vec![record("Netflix", OfferKind::Stream)]);
        fetcher
            .expect_fetch()
            .with(eq(b))
            .times(1)
            .returning(|_| vec![record("Disney Plus", OfferKind::Stream)]);

        let service = service(Arc::new(MemoryAvailabilityStore::new()), fetcher);
        let entries = vec![
            entry(a, WatchStatus::Want),
            entry(a, WatchStatus::Watched),
            entry(b, WatchStatus::Progress),
        ];

        let result = service
            .aggregate(&entries, &WatchlistFilter::default())
            .await
            .unwrap();

        assert_eq!(result.sections.want.len(), 1);
        assert_eq!(result.sections.progress.len(), 1);
        assert_eq!(result.sections.watched.len(), 1);
        assert_eq!(
            result.providers.keys().collect::<Vec<_>>(),
            vec!["Disney+", "Netflix"]
        );
    }

    #[tokio::test]
    async fn test_aggregate_provider_filter_keeps_index_stable() {
        let a = TitleIdentity::movie(1);
        let b = TitleIdentity::movie(2);

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().with(eq(a)).returning(|_| {
            vec![
                record("Netflix Basic", OfferKind::Stream),
                record("Disney+", OfferKind::Rent),
            ]
        });
        fetcher
            .expect_fetch()
            .with(eq(b))
            .returning(|_| vec![record("Disney Plus with Ads", OfferKind::Stream)]);

        let service = service(Arc::new(MemoryAvailabilityStore::new()), fetcher);
        let entries = vec![entry(a, WatchStatus::Want), entry(b, WatchStatus::Want)];
        let filter = WatchlistFilter {
            provider: Some("Netflix".to_string()),
            category: None,
        };

        let result = service.aggregate(&entries, &filter).await.unwrap();

        assert_eq!(result.providers.len(), 2);
        assert!(result.providers.contains_key("Netflix"));
        assert!(result.providers.contains_key("Disney+"));
        assert_eq!(result.sections.want.len(), 1);
        assert_eq!(result.sections.want[0].title, a);
    }

    #[tokio::test]
    async fn test_aggregate_index_first_logo_wins_and_allow_list_applies() {
        let a = TitleIdentity::movie(1);
        let b = TitleIdentity::movie(2);

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().with(eq(a)).returning(|_| {
            vec![
                record("Netflix", OfferKind::Stream),
                record("Obscure Anime Club", OfferKind::Stream),
            ]
        });
        fetcher
            .expect_fetch()
            .with(eq(b))
            .returning(|_| vec![record("Netflix Standard with Ads", OfferKind::Stream)]);

        let service = service(Arc::new(MemoryAvailabilityStore::new()), fetcher);
        let entries = vec![entry(a, WatchStatus::Want), entry(b, WatchStatus::Watched)];

        let result = service
            .aggregate(&entries, &WatchlistFilter::default())
            .await
            .unwrap();

        assert_eq!(result.providers.len(), 1);
        assert_eq!(
            result.providers.get("Netflix"),
            Some(&Some("/netflix.png".to_string()))
        );
        // Non-listed providers stay attached to the title for display
        assert_eq!(result.sections.want[0].providers.len(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_category_filter_scopes_pass() {
        let movie = TitleIdentity::movie(1);
        let series = TitleIdentity::series(1);

        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq(series))
            .times(1)
            .returning(|_| vec![record("NOW", OfferKind::Stream)]);
        fetcher.expect_fetch().with(eq(movie)).never();

        let service = service(Arc::new(MemoryAvailabilityStore::new()), fetcher);
        let entries = vec![
            entry(movie, WatchStatus::Want),
            entry(series, WatchStatus::Want),
        ];
        let filter = WatchlistFilter {
            provider: None,
            category: Some(Category::Series),
        };

        let result = service.aggregate(&entries, &filter).await.unwrap();

        assert_eq!(result.sections.len(), 1);
        assert_eq!(result.sections.want[0].title, series);
        assert_eq!(result.providers.keys().collect::<Vec<_>>(), vec!["NOW"]);
    }

    #[tokio::test]
    async fn test_aggregate_blank_provider_filter_is_ignored() {
        let mut fetcher = MockAvailabilityFetcher::new();
        fetcher.expect_fetch().returning(|_| Vec::new());

        let service = service(Arc::new(MemoryAvailabilityStore::new()), fetcher);
        let entries = vec![entry(TitleIdentity::movie(3), WatchStatus::Want)];
        let filter = WatchlistFilter {
            provider: Some("  ".to_string()),
            category: None,
        };

        let result = service.aggregate(&entries, &filter).await.unwrap();
        assert_eq!(result.sections.want.len(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_store_failure_fails_pass() {
        let service = service(Arc::new(FailingStore), MockAvailabilityFetcher::new());
        let entries = vec![entry(TitleIdentity::movie(3), WatchStatus::Want)];

        let result = service.aggregate(&entries, &WatchlistFilter::default()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_streams_on_ignores_rent_and_buy() {
        let service = service(
            Arc::new(MemoryAvailabilityStore::new()),
            MockAvailabilityFetcher::new(),
        );
        let records = vec![
            record("Netflix", OfferKind::Rent),
            record("Disney Plus with Ads", OfferKind::Stream),
        ];

        assert!(!service.streams_on(&records, "Netflix"));
        assert!(service.streams_on(&records, "Disney+"));
    }
}
