use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::AvailabilityStore,
    error::{AppError, AppResult},
    models::{CacheEntry, ProviderRecord, TitleIdentity},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Availability store backed by PostgreSQL
///
/// One row per (title, region). The upsert swaps the provider list and the
/// timestamp in a single statement, so readers never see a partial slate.
#[derive(Clone)]
pub struct PgAvailabilityStore {
    pool: PgPool,
}

impl PgAvailabilityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AvailabilityStore for PgAvailabilityStore {
    async fn get(&self, title: &TitleIdentity, region: &str) -> AppResult<Option<CacheEntry>> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT providers, fetched_at
            FROM availability_entries
            WHERE external_id = $1 AND category = $2 AND region = $3
            "#,
        )
        .bind(title.external_id)
        .bind(title.category.as_str())
        .bind(region)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((providers, fetched_at)) => {
                let providers: Vec<ProviderRecord> =
                    serde_json::from_str(&providers).map_err(|e| {
                        AppError::Internal(format!("Stored providers are corrupt: {}", e))
                    })?;

                Ok(Some(CacheEntry {
                    title: *title,
                    region: region.to_string(),
                    providers,
                    fetched_at,
                }))
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
        let json = serde_json::to_string(&providers)
            .map_err(|e| AppError::Internal(format!("Provider serialization error: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO availability_entries (external_id, category, region, providers, fetched_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id, category, region)
            DO UPDATE SET providers = EXCLUDED.providers, fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(title.external_id)
        .bind(title.category.as_str())
        .bind(region)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!(title = %title, providers = providers.len(), "Stored availability");

        Ok(())
    }

    async fn delete(&self, title: &TitleIdentity, region: &str) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM availability_entries WHERE external_id = $1 AND category = $2 AND region = $3",
        )
        .bind(title.external_id)
        .bind(title.category.as_str())
        .bind(region)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
