use chrono::Utc;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;

use crate::db::AvailabilityStore;
use crate::error::AppError;
use crate::error::AppResult;
use crate::models::{CacheEntry, ProviderRecord, TitleIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Availability { title: TitleIdentity, region: String },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Availability { title, region } => write!(
                f,
                "avail:{}:{}:{}",
                region.to_lowercase(),
                title.category,
                title.external_id
            ),
        }
    }
}

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Availability store backed by Redis
///
/// Each entry is a single JSON value, so `SET` is the atomic replace. Keys
/// carry no TTL: a stale entry must stay readable as the fallback when a
/// refresh comes back empty. Writes are awaited rather than queued, because
/// the orchestrator re-reads the store right after writing.
#[derive(Clone)]
pub struct RedisAvailabilityStore {
    redis_client: Client,
}

impl RedisAvailabilityStore {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }

    fn key(title: &TitleIdentity, region: &str) -> String {
        CacheKey::Availability {
            title: *title,
            region: region.to_string(),
        }
        .to_string()
    }
}

#[async_trait::async_trait]
impl AvailabilityStore for RedisAvailabilityStore {
    async fn get(&self, title: &TitleIdentity, region: &str) -> AppResult<Option<CacheEntry>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let cached: Option<String> = conn.get(Self::key(title, region)).await.map_err(|e| {
            tracing::warn!(error = %e, "Redis get failed");
            e
        })?;

        match cached {
            Some(json) => {
                let entry = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
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
            fetched_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(Self::key(title, region), json).await.map_err(|e| {
            tracing::warn!(error = %e, "Redis set failed");
            e
        })?;

        tracing::debug!(title = %title, providers = entry.providers.len(), "Cached availability");

        Ok(())
    }

    async fn delete(&self, title: &TitleIdentity, region: &str) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::key(title, region)).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
