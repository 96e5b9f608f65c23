//! TMDB watch-providers fetcher
//!
//! API Flow:
//! `GET /{category}/{id}/watch/providers?api_key=...` returns offers keyed by
//! country code, each country holding up to three buckets: `flatrate`
//! (subscription streaming), `rent` and `buy`.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::{
    error::AppResult,
    models::{ApiWatchProvider, OfferKind, ProviderRecord, TitleIdentity},
    services::providers::AvailabilityFetcher,
};

/// Bucket name -> offer kind, in the order records are emitted
const BUCKETS: [(&str, OfferKind); 3] = [
    ("flatrate", OfferKind::Stream),
    ("rent", OfferKind::Rent),
    ("buy", OfferKind::Buy),
];

const UNKNOWN_PROVIDER: &str = "Unknown";

#[derive(Clone)]
pub struct TmdbFetcher {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    image_base: String,
    region: String,
}

impl TmdbFetcher {
    /// Builds a fetcher whose every request is bounded by `timeout`
    pub fn new(
        api_key: String,
        api_url: String,
        image_base: String,
        region: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            image_base,
            region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn call_api(&self, title: &TitleIdentity) -> Result<Value, String> {
        let url = format!(
            "{}/{}/{}/watch/providers",
            self.api_url, title.category, title.external_id
        );

        tracing::debug!(title = %title, "Fetching watch providers from TMDB");

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned status {}: {}", status, body));
        }

        response.json::<Value>().await.map_err(|e| e.to_string())
    }

    /// Flattens the configured region's buckets into provider records
    ///
    /// Anything that does not have the expected shape is skipped, so a bad
    /// bucket or a bad provider never discards the rest of the response.
    fn convert_api_response(&self, data: &Value) -> Vec<ProviderRecord> {
        let Some(region_data) = data.get("results").and_then(|r| r.get(&self.region)) else {
            return Vec::new();
        };

        let mut providers = Vec::new();

        for (bucket, offer_kind) in BUCKETS {
            let Some(items) = region_data.get(bucket).and_then(Value::as_array) else {
                continue;
            };

            for item in items {
                let Ok(provider) = serde_json::from_value::<ApiWatchProvider>(item.clone()) else {
                    tracing::debug!(bucket = bucket, "Skipping malformed provider");
                    continue;
                };

                providers.push(ProviderRecord {
                    display_name: provider
                        .provider_name
                        .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string()),
                    logo_ref: provider
                        .logo_path
                        .map(|path| format!("{}{}", self.image_base, path)),
                    offer_kind,
                    region: self.region.clone(),
                });
            }
        }

        providers
    }
}

#[async_trait::async_trait]
impl AvailabilityFetcher for TmdbFetcher {
    async fn fetch(&self, title: &TitleIdentity) -> Vec<ProviderRecord> {
        match self.call_api(title).await {
            Ok(data) => {
                let providers = self.convert_api_response(&data);
                tracing::info!(
                    title = %title,
                    providers = providers.len(),
                    fetcher = self.name(),
                    "Availability fetched"
                );
                providers
            }
            Err(e) => {
                tracing::warn!(
                    title = %title,
                    error = %e,
                    fetcher = self.name(),
                    "Availability fetch failed, treating as no providers"
                );
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
