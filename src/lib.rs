//! Cheapest-first GPU rental prices aggregated across marketplaces

pub mod config;
pub mod services;
pub mod sources;
pub mod types;

pub use config::Config;
pub use services::{PricingDirectoryCache, PricingSnapshot, RefreshScheduler};
