pub mod availability;
pub mod freshness;
pub mod normalizer;
pub mod providers;

pub use availability::AvailabilityService;
pub use freshness::FreshnessPolicy;
pub use normalizer::{NameNormalizer, NormalizerConfig, ProviderCatalog};
