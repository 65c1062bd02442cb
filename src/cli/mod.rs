use clap::{Parser, Subcommand};
use gpuscout::config::{RUNPOD_API_KEY_ENV, VASTAI_API_KEY_ENV};
use gpuscout::{Config, PricingDirectoryCache, PricingSnapshot, RefreshScheduler};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Cheapest-first GPU rental prices across marketplaces
#[derive(Parser)]
#[command(name = "gpuscout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the best price per GPU model, cheapest first (default)
    Prices {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Show every source's quote per model
        #[arg(long)]
        compare: bool,
    },

    /// Show per-source fetch health
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep refreshing in the background and print each new listing
    Watch {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::from_env()?;
        if config.configured_sources() == 0 {
            eprintln!(
                "No marketplace credentials set ({} or {}); the directory will be empty.",
                VASTAI_API_KEY_ENV, RUNPOD_API_KEY_ENV
            );
        }
        let cache = PricingDirectoryCache::from_config(&config)?;

        match self.command {
            None => print_prices(&cache, false, false).await,
            Some(Commands::Prices { json, compare }) => print_prices(&cache, json, compare).await,
            Some(Commands::Health { json }) => {
                let snapshot = cache.refresh().await;
                cache.teardown();
                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshot.health)?);
                } else {
                    print!("{}", render_health(&snapshot));
                }
                Ok(())
            }
            Some(Commands::Watch { json }) => watch(cache, &config, json).await,
        }
    }
}

async fn print_prices(cache: &PricingDirectoryCache, json: bool, compare: bool) -> anyhow::Result<()> {
    let snapshot = cache.refresh().await;
    cache.teardown();
    warn_if_stale(&snapshot);
    println!("{}", render_snapshot(&snapshot, json, compare)?);
    Ok(())
}

async fn watch(cache: PricingDirectoryCache, config: &Config, json: bool) -> anyhow::Result<()> {
    let scheduler =
        RefreshScheduler::spawn(cache.clone(), config.refresh_interval, config.max_backoff);
    let mut shown = cache.snapshot();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let current = cache.snapshot();
                if Arc::ptr_eq(&current, &shown) {
                    continue;
                }
                warn_if_stale(&current);
                println!("{}", render_snapshot(&current, json, false)?);
                shown = current;
            }
        }
    }

    scheduler.shutdown().await;
    cache.teardown();
    Ok(())
}

fn warn_if_stale(snapshot: &PricingSnapshot) {
    if snapshot.stale {
        eprintln!("Warning: every marketplace failed; showing the last good prices.");
        for health in snapshot.health.iter().filter(|h| h.last_error.is_some()) {
            eprintln!(
                "  {}: {}",
                health.source,
                health.last_error.as_deref().unwrap_or_default()
            );
        }
    }
}

fn render_snapshot(snapshot: &PricingSnapshot, json: bool, compare: bool) -> anyhow::Result<String> {
    Ok(match (json, compare) {
        (true, false) => serde_json::to_string_pretty(&snapshot.cheapest_first())?,
        (true, true) => serde_json::to_string_pretty(&snapshot.directory)?,
        (false, false) => render_prices(snapshot),
        (false, true) => render_comparison(snapshot),
    })
}

fn render_prices(snapshot: &PricingSnapshot) -> String {
    let listings = snapshot.cheapest_first();
    if listings.is_empty() {
        return "No GPU prices available.".to_string();
    }

    let mut out = format!("{:<24} {:>9}  {:<8} {}\n", "GPU", "$/HR", "SOURCE", "AVAILABILITY");
    for listing in &listings {
        let _ = writeln!(
            out,
            "{:<24} {:>9.3}  {:<8} {}",
            listing.gpu_type.as_str(),
            listing.price_per_hour,
            listing.source,
            listing.availability.label()
        );
    }
    out.truncate(out.trim_end().len());
    out
}

fn render_comparison(snapshot: &PricingSnapshot) -> String {
    if snapshot.directory.is_empty() {
        return "No GPU prices available.".to_string();
    }

    let mut out = String::new();
    for listing in snapshot.cheapest_first() {
        let Some(prices) = snapshot.get(listing.gpu_type.as_str()) else {
            continue;
        };
        let _ = writeln!(out, "{}", listing.gpu_type);
        for quote in &prices.quotes {
            let marker = if quote.same_offer(&prices.best) { "*" } else { " " };
            let memory = quote
                .memory_gb
                .map(|gb| format!("{} GB", gb))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} {:<8} {:>9.3}  {:<11} {}",
                marker,
                quote.source,
                quote.price_per_hour,
                quote.availability.label(),
                memory
            );
        }
    }
    out.truncate(out.trim_end().len());
    out
}

fn render_health(snapshot: &PricingSnapshot) -> String {
    let mut out = format!(
        "{:<8} {:<9} {:>6} {:>8}  {}\n",
        "SOURCE", "STATUS", "QUOTES", "FAILURES", "LAST ERROR"
    );
    for health in &snapshot.health {
        let _ = writeln!(
            out,
            "{:<8} {:<9} {:>6} {:>8}  {}",
            health.source,
            health.status.label(),
            health.quote_count,
            health.consecutive_failures,
            health.last_error.as_deref().unwrap_or("-")
        );
    }
    out
}
