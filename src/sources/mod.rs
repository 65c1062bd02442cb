//! Source adapters for GPU rental marketplaces

mod runpod;
mod vastai;

pub use runpod::RunPodSource;
pub use vastai::VastAiSource;

use crate::config::Config;
use crate::services::normalizer::{is_known_gpu, normalize_gpu_name};
use crate::types::{AdapterError, GpuModel, GpuScoutError, PriceQuote, RawOffer, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Trait for fetching live GPU prices from one marketplace
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source id (e.g., "vastai")
    fn name(&self) -> &str;

    /// Whether the credential this source needs is present
    fn is_configured(&self) -> bool;

    /// Fetch and decode the vendor's offers.
    ///
    /// Called only when `is_configured()` is true. Must not retry.
    async fn fetch_offers(&self) -> std::result::Result<Vec<RawOffer>, AdapterError>;

    /// Fetch normalized quotes, one per canonical model.
    ///
    /// An unconfigured source returns an empty list rather than an error.
    async fn fetch(&self) -> std::result::Result<Vec<PriceQuote>, AdapterError> {
        if !self.is_configured() {
            tracing::debug!(source = %self.name(), "no credential, skipping");
            return Ok(Vec::new());
        }
        match self.fetch_offers().await {
            Ok(offers) => Ok(collapse_offers(self.name(), offers, Utc::now())),
            Err(AdapterError::ConfigMissing { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Normalize offers, drop non-positive prices and keep the cheapest offer
/// per canonical model. Output is ordered by model name.
pub fn collapse_offers(
    source: &str,
    offers: Vec<RawOffer>,
    fetched_at: DateTime<Utc>,
) -> Vec<PriceQuote> {
    let mut best: HashMap<GpuModel, PriceQuote> = HashMap::new();

    for offer in offers {
        if !(offer.price_per_hour.is_finite() && offer.price_per_hour > 0.0) {
            continue;
        }

        if !is_known_gpu(&offer.name) {
            tracing::debug!(source = %source, name = %offer.name, "unmapped GPU name, using fallback");
        }
        let model = normalize_gpu_name(&offer.name);

        match best.get(&model) {
            // First seen wins on equal price
            Some(existing) if existing.price_per_hour <= offer.price_per_hour => {}
            _ => {
                best.insert(
                    model.clone(),
                    PriceQuote {
                        gpu_type: model,
                        price_per_hour: offer.price_per_hour,
                        source: source.to_string(),
                        memory_gb: offer.memory_gb,
                        availability: offer.availability,
                        fetched_at,
                    },
                );
            }
        }
    }

    let mut quotes: Vec<PriceQuote> = best.into_values().collect();
    quotes.sort_by(|a, b| a.gpu_type.cmp(&b.gpu_type));
    quotes
}

/// Build the HTTP client shared by a source's requests
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("gpuscout/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GpuScoutError::Http(format!("HTTP client error: {}", e)))
}

/// Registry of sources in registration order.
///
/// Registration order is the tie-break order when two sources quote the
/// same price for a model.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Create a registry with the default marketplaces
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            sources: vec![
                Arc::new(VastAiSource::from_config(config)?),
                Arc::new(RunPodSource::from_config(config)?),
            ],
        })
    }

    /// Create a registry from explicit sources
    pub fn with_sources(sources: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { sources }
    }

    /// Get all registered sources
    pub fn sources(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.sources
    }

    /// Find a source by name
    pub fn get(&self, name: &str) -> Option<&dyn SourceAdapter> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}
