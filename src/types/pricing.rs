//! Pricing types shared by sources, aggregator and cache

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical, vendor-agnostic GPU model identifier (e.g. "NVIDIA H100")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuModel(String);

impl GpuModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GpuModel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Available,
    Limited,
    Unavailable,
}

impl Availability {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Limited => "limited",
            Self::Unavailable => "unavailable",
        }
    }
}

/// One vendor offer after wire decoding, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawOffer {
    pub name: String,
    pub price_per_hour: f64,
    pub memory_gb: Option<u32>,
    pub availability: Availability,
}

/// One priced offer for a canonical GPU model from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub gpu_type: GpuModel,
    /// USD per hour, always > 0
    pub price_per_hour: f64,
    pub source: String,
    #[serde(default, rename = "memoryGB")]
    pub memory_gb: Option<u32>,
    pub availability: Availability,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Equality ignoring `fetched_at`
    pub fn same_offer(&self, other: &PriceQuote) -> bool {
        self.gpu_type == other.gpu_type
            && self.price_per_hour == other.price_per_hour
            && self.source == other.source
            && self.memory_gb == other.memory_gb
            && self.availability == other.availability
    }
}

/// Best quote for a model plus every contributing quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrices {
    pub best: PriceQuote,
    /// In source registration order
    pub quotes: Vec<PriceQuote>,
}

/// Entry of the cheapest-first list handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceListing {
    pub gpu_type: GpuModel,
    pub price_per_hour: f64,
    pub source: String,
    pub availability: Availability,
}

impl From<&PriceQuote> for PriceListing {
    fn from(quote: &PriceQuote) -> Self {
        Self {
            gpu_type: quote.gpu_type.clone(),
            price_per_hour: quote.price_per_hour,
            source: quote.source.clone(),
            availability: quote.availability,
        }
    }
}

/// Per-model best prices merged across all sources.
///
/// Rebuilt from scratch every refresh cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedPricingDirectory {
    pub models: BTreeMap<GpuModel, ModelPrices>,
}

impl AggregatedPricingDirectory {
    pub fn get(&self, model: &str) -> Option<&ModelPrices> {
        self.models.get(&GpuModel::new(model))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Best quote per model, ascending by price (ties by model name)
    pub fn cheapest_first(&self) -> Vec<PriceListing> {
        let mut listings: Vec<PriceListing> = self
            .models
            .values()
            .map(|prices| PriceListing::from(&prices.best))
            .collect();
        listings.sort_by(|a, b| {
            a.price_per_hour
                .total_cmp(&b.price_per_hour)
                .then_with(|| a.gpu_type.cmp(&b.gpu_type))
        });
        listings
    }

    /// Same keys and same best offers, ignoring fetch timestamps
    pub fn same_prices(&self, other: &AggregatedPricingDirectory) -> bool {
        self.models.len() == other.models.len()
            && self.models.iter().zip(other.models.iter()).all(|(a, b)| {
                a.0 == b.0
                    && a.1.best.same_offer(&b.1.best)
                    && a.1.quotes.len() == b.1.quotes.len()
                    && a.1
                        .quotes
                        .iter()
                        .zip(b.1.quotes.iter())
                        .all(|(x, y)| x.same_offer(y))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// No refresh has run yet
    Pending,
    Healthy,
    /// Credential absent
    Disabled,
    Errored,
}

impl SourceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Healthy => "healthy",
            Self::Disabled => "disabled",
            Self::Errored => "errored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source: String,
    pub status: SourceStatus,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Quotes returned by the last successful fetch
    pub quote_count: usize,
}

impl SourceHealth {
    pub fn pending(source: &str) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Pending,
            last_success_at: None,
            last_attempt_at: None,
            last_error: None,
            consecutive_failures: 0,
            quote_count: 0,
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>, quote_count: usize) {
        self.status = SourceStatus::Healthy;
        self.last_success_at = Some(at);
        self.last_attempt_at = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
        self.quote_count = quote_count;
    }

    pub fn record_disabled(&mut self, at: DateTime<Utc>) {
        self.status = SourceStatus::Disabled;
        self.last_attempt_at = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
        self.quote_count = 0;
    }

    /// Keeps `last_success_at` so callers can tell how old the good data is
    pub fn record_failure(&mut self, at: DateTime<Utc>, error: String) {
        self.status = SourceStatus::Errored;
        self.last_attempt_at = Some(at);
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}
