use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

/// Kind of title, doubling as the upstream path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "tv")]
    Series,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Series => "tv",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Category::Movie),
            "tv" => Ok(Category::Series),
            other => Err(format!("Unknown category '{}'", other)),
        }
    }
}

/// Identifies a title across the cache, the fetcher and watchlist filtering
///
/// This is a lookup key shared by every watchlist entry that references the
/// same catalog title, not an ownership relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TitleIdentity {
    pub external_id: i64,
    pub category: Category,
}

impl TitleIdentity {
    pub fn new(external_id: i64, category: Category) -> Self {
        Self {
            external_id,
            category,
        }
    }

    pub fn movie(external_id: i64) -> Self {
        Self::new(external_id, Category::Movie)
    }

    pub fn series(external_id: i64) -> Self {
        Self::new(external_id, Category::Series)
    }
}

impl Display for TitleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.external_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferKind {
    Stream,
    Rent,
    Buy,
}

/// One row of availability as received from upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Raw vendor name, not normalized
    pub display_name: String,
    pub logo_ref: Option<String>,
    pub offer_kind: OfferKind,
    pub region: String,
}

/// Cached provider slate for one (title, region)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub title: TitleIdentity,
    pub region: String,
    pub providers: Vec<ProviderRecord>,
    pub fetched_at: DateTime<Utc>,
}

/// A title's providers grouped by how they are offered
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderSlate {
    pub stream: Vec<ProviderRecord>,
    pub rent: Vec<ProviderRecord>,
    pub buy: Vec<ProviderRecord>,
}

impl ProviderSlate {
    pub fn from_records(records: Vec<ProviderRecord>) -> Self {
        let mut slate = Self::default();
        for record in records {
            match record.offer_kind {
                OfferKind::Stream => slate.stream.push(record),
                OfferKind::Rent => slate.rent.push(record),
                OfferKind::Buy => slate.buy.push(record),
            }
        }
        slate
    }
}

// ============================================================================
// Watchlist Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Want,
    Progress,
    Watched,
}

/// One tracked title as supplied by the watchlist store, in display order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub title: TitleIdentity,
    pub status: WatchStatus,
    /// Opaque presentation label passed through untouched
    #[serde(default)]
    pub label: Option<String>,
}

/// Filters for one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WatchlistFilter {
    /// Canonical provider name; restricts sections, never the provider index
    #[serde(default)]
    pub provider: Option<String>,
    /// Restricts the whole pass to one category
    #[serde(default)]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistItem {
    pub title: TitleIdentity,
    pub status: WatchStatus,
    pub label: Option<String>,
    pub providers: Vec<ProviderRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatchlistSections {
    pub want: Vec<WatchlistItem>,
    pub progress: Vec<WatchlistItem>,
    pub watched: Vec<WatchlistItem>,
}

impl WatchlistSections {
    pub fn push(&mut self, item: WatchlistItem) {
        match item.status {
            WatchStatus::Want => self.want.push(item),
            WatchStatus::Progress => self.progress.push(item),
            WatchStatus::Watched => self.watched.push(item),
        }
    }

    pub fn len(&self) -> usize {
        self.want.len() + self.progress.len() + self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical provider name -> representative logo, ordered by name
pub type ProviderIndex = BTreeMap<String, Option<String>>;

/// Result of one aggregation pass over a watchlist
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatchlistAvailability {
    pub sections: WatchlistSections,
    pub providers: ProviderIndex,
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Provider object inside a TMDB watch-providers bucket
#[derive(Debug, Clone, Deserialize)]
pub struct ApiWatchProvider {
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, kind: OfferKind) -> ProviderRecord {
        ProviderRecord {
            display_name: name.to_string(),
            logo_ref: None,
            offer_kind: kind,
            region: "GB".to_string(),
        }
    }

    #[test]
    fn test_title_identity_display() {
        assert_eq!(format!("{}", TitleIdentity::movie(27205)), "movie/27205");
        assert_eq!(format!("{}", TitleIdentity::series(1396)), "tv/1396");
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("movie".parse::<Category>(), Ok(Category::Movie));
        assert_eq!("tv".parse::<Category>(), Ok(Category::Series));
        assert!("person".parse::<Category>().is_err());
    }

    #[test]
    fn test_title_identity_serde() {
        let id = TitleIdentity::series(1396);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"external_id":1396,"category":"tv"}"#);
    }

    #[test]
    fn test_watchlist_entry_label_defaults_to_none() {
        let entry: WatchlistEntry = serde_json::from_str(
            r#"{"title":{"external_id":27205,"category":"movie"},"status":"progress"}"#,
        )
        .unwrap();
        assert_eq!(entry.status, WatchStatus::Progress);
        assert_eq!(entry.label, None);
    }

    #[test]
    fn test_provider_slate_groups_by_kind() {
        let slate = ProviderSlate::from_records(vec![
            record("Netflix", OfferKind::Stream),
            record("Amazon Video", OfferKind::Rent),
            record("Apple TV", OfferKind::Buy),
            record("Amazon Video", OfferKind::Buy),
        ]);

        assert_eq!(slate.stream.len(), 1);
        assert_eq!(slate.rent.len(), 1);
        assert_eq!(slate.buy.len(), 2);
        assert_eq!(slate.buy[1].display_name, "Amazon Video");
    }

    #[test]
    fn test_sections_route_by_status() {
        let mut sections = WatchlistSections::default();
        for status in [WatchStatus::Want, WatchStatus::Watched, WatchStatus::Want] {
            sections.push(WatchlistItem {
                title: TitleIdentity::movie(1),
                status,
                label: None,
                providers: vec![],
            });
        }

        assert_eq!(sections.want.len(), 2);
        assert!(sections.progress.is_empty());
        assert_eq!(sections.watched.len(), 1);
        assert_eq!(sections.len(), 3);
    }
}
