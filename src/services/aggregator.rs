//! Aggregator service for merging quotes across sources

use crate::sources::{SourceAdapter, SourceRegistry};
use crate::types::{
    AdapterError, AggregatedPricingDirectory, AllSourcesFailed, GpuModel, ModelPrices, PriceQuote,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// What one source contributed to a refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Fetched(Vec<PriceQuote>),
    /// Credential absent
    Disabled,
    Failed(AdapterError),
}

/// Result of one fan-out over every registered source
#[derive(Debug)]
pub struct AggregationResult {
    /// One entry per source, in registration order
    pub outcomes: Vec<(String, SourceOutcome)>,
    pub directory: Result<AggregatedPricingDirectory, AllSourcesFailed>,
}

/// Runs all sources concurrently and merges their quotes
pub struct Aggregator {
    registry: SourceRegistry,
    source_timeout: Duration,
}

impl Aggregator {
    pub fn new(registry: SourceRegistry, source_timeout: Duration) -> Self {
        Self {
            registry,
            source_timeout,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Fetch every source concurrently, wait for all, then merge.
    ///
    /// Never fails outright: source errors are reported per source, and a
    /// cycle where every configured source failed yields `AllSourcesFailed`
    /// instead of an empty directory.
    pub async fn refresh(&self) -> AggregationResult {
        let fetches = self
            .registry
            .sources()
            .iter()
            .map(|source| fetch_one(Arc::clone(source), self.source_timeout));
        let outcomes: Vec<(String, SourceOutcome)> = join_all(fetches).await;

        for (name, outcome) in &outcomes {
            match outcome {
                SourceOutcome::Fetched(quotes) => {
                    tracing::debug!(source = %name, quotes = quotes.len(), "source fetched")
                }
                SourceOutcome::Disabled => tracing::debug!(source = %name, "source disabled"),
                SourceOutcome::Failed(e) => {
                    tracing::warn!(source = %name, error = %e, "source failed")
                }
            }
        }

        let directory = Self::build(&outcomes);
        AggregationResult {
            outcomes,
            directory,
        }
    }

    /// Turn settled outcomes into a directory, or report total failure
    pub fn build(
        outcomes: &[(String, SourceOutcome)],
    ) -> Result<AggregatedPricingDirectory, AllSourcesFailed> {
        let failed: Vec<String> = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SourceOutcome::Failed(_)))
            .map(|(name, _)| name.clone())
            .collect();
        let any_fetched = outcomes
            .iter()
            .any(|(_, o)| matches!(o, SourceOutcome::Fetched(_)));

        if !failed.is_empty() && !any_fetched {
            return Err(AllSourcesFailed { failed });
        }

        let fetched = outcomes.iter().filter_map(|(_, o)| match o {
            SourceOutcome::Fetched(quotes) => Some(quotes),
            _ => None,
        });
        Ok(Self::merge(fetched))
    }

    /// Merge per-source quote lists, given in registration order, by model.
    ///
    /// Best is the strictly lowest price; on a tie the earlier source keeps it.
    pub fn merge<'a, I>(per_source: I) -> AggregatedPricingDirectory
    where
        I: IntoIterator<Item = &'a Vec<PriceQuote>>,
    {
        let mut models: BTreeMap<GpuModel, ModelPrices> = BTreeMap::new();

        for quotes in per_source {
            for quote in quotes.iter() {
                match models.get_mut(&quote.gpu_type) {
                    Some(prices) => {
                        if quote.price_per_hour < prices.best.price_per_hour {
                            prices.best = quote.clone();
                        }
                        prices.quotes.push(quote.clone());
                    }
                    None => {
                        models.insert(
                            quote.gpu_type.clone(),
                            ModelPrices {
                                best: quote.clone(),
                                quotes: vec![quote.clone()],
                            },
                        );
                    }
                }
            }
        }

        AggregatedPricingDirectory { models }
    }
}

async fn fetch_one(source: Arc<dyn SourceAdapter>, timeout: Duration) -> (String, SourceOutcome) {
    let name = source.name().to_string();
    if !source.is_configured() {
        return (name, SourceOutcome::Disabled);
    }

    let outcome = match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(Ok(quotes)) => SourceOutcome::Fetched(quotes),
        Ok(Err(e)) => SourceOutcome::Failed(e),
        Err(_) => SourceOutcome::Failed(AdapterError::unavailable(
            &name,
            format!("no response within {}s", timeout.as_secs_f64()),
        )),
    };
    (name, outcome)
}
