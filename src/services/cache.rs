//! In-memory pricing directory cache
//!
//! Holds the last merged directory and per-source health. Reads are served
//! from memory; only `refresh()` touches the network, and concurrent
//! refreshes share one round of upstream calls.

use crate::config::Config;
use crate::services::aggregator::{AggregationResult, Aggregator, SourceOutcome};
use crate::sources::SourceRegistry;
use crate::types::{AggregatedPricingDirectory, ModelPrices, PriceListing, Result, SourceHealth};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Immutable view of the cache at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSnapshot {
    pub directory: AggregatedPricingDirectory,
    /// When `directory` was built; `None` before the first good refresh
    pub built_at: Option<DateTime<Utc>>,
    /// Set when the last refresh failed on every configured source
    pub stale: bool,
    /// One entry per source, in registration order
    pub health: Vec<SourceHealth>,
}

impl PricingSnapshot {
    fn empty(sources: &[String]) -> Self {
        Self {
            directory: AggregatedPricingDirectory::default(),
            built_at: None,
            stale: false,
            health: sources.iter().map(|s| SourceHealth::pending(s)).collect(),
        }
    }

    pub fn cheapest_first(&self) -> Vec<PriceListing> {
        self.directory.cheapest_first()
    }

    pub fn get(&self, model: &str) -> Option<&ModelPrices> {
        self.directory.get(model)
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn health(&self, source: &str) -> Option<&SourceHealth> {
        self.health.iter().find(|h| h.source == source)
    }

    /// Next snapshot after a refresh cycle.
    ///
    /// On total failure the current directory is carried over and flagged stale.
    fn advance(&self, result: AggregationResult, now: DateTime<Utc>) -> Self {
        let mut health = self.health.clone();
        for (name, outcome) in &result.outcomes {
            let idx = match health.iter().position(|h| &h.source == name) {
                Some(idx) => idx,
                None => {
                    health.push(SourceHealth::pending(name));
                    health.len() - 1
                }
            };
            let entry = &mut health[idx];
            match outcome {
                SourceOutcome::Fetched(quotes) => entry.record_success(now, quotes.len()),
                SourceOutcome::Disabled => entry.record_disabled(now),
                SourceOutcome::Failed(e) => entry.record_failure(now, e.to_string()),
            }
        }

        match result.directory {
            Ok(directory) => Self {
                directory,
                built_at: Some(now),
                stale: false,
                health,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    models = self.directory.len(),
                    "keeping previous pricing directory as stale"
                );
                Self {
                    directory: self.directory.clone(),
                    built_at: self.built_at,
                    stale: true,
                    health,
                }
            }
        }
    }
}

type RefreshFuture = BoxFuture<'static, Arc<PricingSnapshot>>;

struct CacheInner {
    aggregator: Aggregator,
    current: RwLock<Arc<PricingSnapshot>>,
    /// The refresh currently running, if any. Held weakly so a refresh
    /// whose callers all went away is dropped instead of parked.
    in_flight: Mutex<Option<WeakShared<RefreshFuture>>>,
    closed: AtomicBool,
}

impl CacheInner {
    fn current(&self) -> Arc<PricingSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn run_refresh(self: Arc<Self>) -> Arc<PricingSnapshot> {
        let result = self.aggregator.refresh().await;

        let installed = self.install(result);

        *self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        match installed {
            Some(snapshot) => {
                if !snapshot.stale {
                    tracing::info!(models = snapshot.directory.len(), "pricing directory refreshed");
                }
                snapshot
            }
            None => {
                tracing::debug!("cache closed during refresh, discarding results");
                self.current()
            }
        }
    }

    /// Swap in the snapshot built from `result`; `None` once the cache is closed
    fn install(&self, result: AggregationResult) -> Option<Arc<PricingSnapshot>> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let next = Arc::new(current.advance(result, Utc::now()));
        *current = Arc::clone(&next);
        Some(next)
    }
}

/// Lifecycle-owned pricing directory.
///
/// Cloning is cheap and every clone shares the same snapshot and
/// in-flight refresh.
#[derive(Clone)]
pub struct PricingDirectoryCache {
    inner: Arc<CacheInner>,
}

impl PricingDirectoryCache {
    /// Create an empty cache; nothing is fetched until `refresh()`
    pub fn init(aggregator: Aggregator) -> Self {
        let initial = PricingSnapshot::empty(&aggregator.source_names());
        Self {
            inner: Arc::new(CacheInner {
                aggregator,
                current: RwLock::new(Arc::new(initial)),
                in_flight: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a cache over the default marketplaces
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = SourceRegistry::new(config)?;
        Ok(Self::init(Aggregator::new(registry, config.request_timeout)))
    }

    /// Current snapshot. Never does network I/O.
    pub fn snapshot(&self) -> Arc<PricingSnapshot> {
        self.inner.current()
    }

    pub fn cheapest_first(&self) -> Vec<PriceListing> {
        self.snapshot().cheapest_first()
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot().stale
    }

    /// Fetch all sources and install the merged directory.
    ///
    /// If a refresh is already running, waits for that one instead of
    /// starting another. Returns the installed snapshot; after `teardown()`
    /// returns the current snapshot without fetching.
    ///
    /// Dropping every caller of a running refresh cancels it, and the cache
    /// is left untouched.
    pub async fn refresh(&self) -> Arc<PricingSnapshot> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return self.snapshot();
        }

        let shared = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref().and_then(WeakShared::upgrade) {
                Some(running) => running,
                None => {
                    let refresh: Shared<RefreshFuture> =
                        Arc::clone(&self.inner).run_refresh().boxed().shared();
                    *slot = refresh.downgrade();
                    refresh
                }
            }
        };

        shared.await
    }

    /// Stop accepting refreshes and discard any refresh in flight.
    ///
    /// The current snapshot stays readable.
    pub fn teardown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}
