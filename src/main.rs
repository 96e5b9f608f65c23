use std::sync::Arc;

use shelfwatch_api::{
    config::{CacheBackend, Config},
    db::{
        create_pool, create_redis_client, AvailabilityStore, MemoryAvailabilityStore,
        PgAvailabilityStore, RedisAvailabilityStore,
    },
    routes::{create_router, AppState},
    services::{
        providers::{AvailabilityFetcher, TmdbFetcher},
        AvailabilityService, FreshnessPolicy, NameNormalizer, ProviderCatalog,
    },
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = build_store(&config).await?;

    let fetcher: Arc<dyn AvailabilityFetcher> = Arc::new(TmdbFetcher::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        config.tmdb_image_base.clone(),
        config.provider_region.clone(),
        config.upstream_timeout(),
    )?);

    let catalog = ProviderCatalog::new(
        NameNormalizer::new(config.normalizer_config()),
        config.provider_allow_list.clone(),
    );

    tracing::info!(
        store = store.name(),
        fetcher = fetcher.name(),
        region = %config.provider_region,
        max_age_days = config.provider_cache_days,
        "Availability cache configured"
    );

    let availability = AvailabilityService::new(
        store,
        fetcher,
        Arc::new(catalog),
        FreshnessPolicy::new(config.max_cache_age()),
        config.provider_region.clone(),
    );

    let app = create_router(Arc::new(AppState::new(availability))).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn AvailabilityStore>> {
    let store: Arc<dyn AvailabilityStore> = match config.cache_backend {
        CacheBackend::Memory => Arc::new(MemoryAvailabilityStore::new()),
        CacheBackend::Redis => Arc::new(RedisAvailabilityStore::new(create_redis_client(
            &config.redis_url,
        )?)),
        CacheBackend::Postgres => {
            Arc::new(PgAvailabilityStore::new(create_pool(&config.database_url).await?))
        }
    };
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
