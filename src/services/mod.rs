//! Services for price aggregation and caching

pub mod aggregator;
pub mod cache;
pub mod normalizer;
pub mod scheduler;

pub use aggregator::{AggregationResult, Aggregator, SourceOutcome};
pub use cache::{PricingDirectoryCache, PricingSnapshot};
pub use normalizer::{is_known_gpu, normalize_gpu_name};
pub use scheduler::RefreshScheduler;
