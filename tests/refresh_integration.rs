//! End-to-end refresh through both marketplace adapters against mock servers

use gpuscout::types::{Availability, SourceStatus};
use gpuscout::{Config, PricingDirectoryCache};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VASTAI_FIXTURE: &str = include_str!("fixtures/vastai-bundles.json");
const RUNPOD_FIXTURE: &str = include_str!("fixtures/runpod-gpu-types.json");

struct Marketplaces {
    vastai: MockServer,
    runpod: MockServer,
}

impl Marketplaces {
    async fn start() -> Self {
        Self {
            vastai: MockServer::start().await,
            runpod: MockServer::start().await,
        }
    }

    async fn vastai_responds(&self, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/bundles/"))
            .respond_with(template)
            .mount(&self.vastai)
            .await;
    }

    async fn runpod_responds(&self, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(template)
            .mount(&self.runpod)
            .await;
    }

    fn config(&self) -> Config {
        Config {
            vastai_api_key: Some("vk-test".into()),
            runpod_api_key: Some("rp-test".into()),
            vastai_base_url: self.vastai.uri(),
            runpod_base_url: self.runpod.uri(),
            request_timeout: Duration::from_secs(2),
            ..Config::default()
        }
    }

    fn cache(&self) -> PricingDirectoryCache {
        PricingDirectoryCache::from_config(&self.config()).unwrap()
    }
}

fn ok(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

#[tokio::test]
async fn test_refresh_merges_both_marketplaces() {
    let markets = Marketplaces::start().await;
    markets.vastai_responds(ok(VASTAI_FIXTURE)).await;
    markets.runpod_responds(ok(RUNPOD_FIXTURE)).await;
    let cache = markets.cache();

    let snapshot = cache.refresh().await;

    assert!(!snapshot.stale);
    let models: Vec<&str> = snapshot
        .directory
        .models
        .keys()
        .map(|m| m.as_str())
        .collect();
    assert_eq!(
        models,
        vec!["AMD MI300X", "NVIDIA H100", "NVIDIA L40S", "NVIDIA RTX 4090"]
    );

    // vastai H100 PCIE 1.867 beats runpod 2.39
    let h100 = snapshot.get("NVIDIA H100").unwrap();
    assert_eq!(h100.best.source, "vastai");
    assert!((h100.best.price_per_hour - 1.867).abs() < 1e-9);
    assert_eq!(h100.quotes.len(), 2);

    // runpod 0.34 beats vastai 0.35
    let rtx = snapshot.get("NVIDIA RTX 4090").unwrap();
    assert_eq!(rtx.best.source, "runpod");

    // 0.79 on both sides, vastai registered first
    let l40s = snapshot.get("NVIDIA L40S").unwrap();
    assert_eq!(l40s.best.source, "vastai");

    let mi300x = snapshot.get("AMD MI300X").unwrap();
    assert_eq!(mi300x.best.availability, Availability::Unavailable);
}

#[tokio::test]
async fn test_cheapest_first_listing() {
    let markets = Marketplaces::start().await;
    markets.vastai_responds(ok(VASTAI_FIXTURE)).await;
    markets.runpod_responds(ok(RUNPOD_FIXTURE)).await;
    let cache = markets.cache();

    cache.refresh().await;
    let listing = cache.cheapest_first();

    let prices: Vec<f64> = listing.iter().map(|l| l.price_per_hour).collect();
    assert_eq!(listing.len(), 4);
    assert!(prices.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(listing[0].gpu_type.as_str(), "NVIDIA RTX 4090");
}

#[tokio::test]
async fn test_refresh_survives_one_marketplace_down() {
    let markets = Marketplaces::start().await;
    markets.vastai_responds(ResponseTemplate::new(503)).await;
    markets.runpod_responds(ok(RUNPOD_FIXTURE)).await;
    let cache = markets.cache();

    let snapshot = cache.refresh().await;

    assert!(!snapshot.stale);
    assert_eq!(snapshot.directory.len(), 4);
    assert!(snapshot
        .directory
        .models
        .values()
        .all(|p| p.best.source == "runpod"));
    let vastai = snapshot.health("vastai").unwrap();
    assert_eq!(vastai.status, SourceStatus::Errored);
    assert!(vastai.last_error.as_deref().unwrap().contains("503"));
    assert_eq!(snapshot.health("runpod").unwrap().status, SourceStatus::Healthy);
}

#[tokio::test]
async fn test_refresh_with_slow_marketplace_times_out() {
    let markets = Marketplaces::start().await;
    markets
        .vastai_responds(ok(VASTAI_FIXTURE).set_delay(Duration::from_secs(10)))
        .await;
    markets.runpod_responds(ok(RUNPOD_FIXTURE)).await;
    let cache = markets.cache();

    let snapshot = cache.refresh().await;

    assert_eq!(snapshot.directory.len(), 4);
    assert_eq!(snapshot.health("vastai").unwrap().status, SourceStatus::Errored);
}

#[tokio::test]
async fn test_total_outage_keeps_last_good_directory() {
    let markets = Marketplaces::start().await;
    markets.vastai_responds(ok(VASTAI_FIXTURE)).await;
    markets.runpod_responds(ok(RUNPOD_FIXTURE)).await;
    let cache = markets.cache();
    let good = cache.refresh().await;

    markets.vastai.reset().await;
    markets.runpod.reset().await;
    markets.vastai_responds(ResponseTemplate::new(500)).await;
    markets
        .runpod_responds(ok(r#"{"errors":[{"message":"internal"}],"data":null}"#))
        .await;
    let degraded = cache.refresh().await;

    assert!(degraded.stale);
    assert!(degraded.directory.same_prices(&good.directory));
    assert_eq!(degraded.health("vastai").unwrap().consecutive_failures, 1);
    assert_eq!(degraded.health("runpod").unwrap().consecutive_failures, 1);
}

#[tokio::test]
async fn test_missing_credential_disables_marketplace() {
    let markets = Marketplaces::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&markets.vastai)
        .await;
    markets.runpod_responds(ok(RUNPOD_FIXTURE)).await;
    let config = Config {
        vastai_api_key: None,
        ..markets.config()
    };
    let cache = PricingDirectoryCache::from_config(&config).unwrap();

    let snapshot = cache.refresh().await;

    assert!(!snapshot.stale);
    assert_eq!(snapshot.health("vastai").unwrap().status, SourceStatus::Disabled);
    assert_eq!(snapshot.directory.len(), 4);
}

#[tokio::test]
async fn test_concurrent_refreshes_hit_each_marketplace_once() {
    let markets = Marketplaces::start().await;
    Mock::given(method("GET"))
        .and(path("/bundles/"))
        .respond_with(ok(VASTAI_FIXTURE).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&markets.vastai)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ok(RUNPOD_FIXTURE).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&markets.runpod)
        .await;
    let cache = markets.cache();

    let (a, b, c) = tokio::join!(cache.refresh(), cache.refresh(), cache.refresh());

    assert_eq!(a.directory.len(), 4);
    assert!(a.directory.same_prices(&b.directory));
    assert!(b.directory.same_prices(&c.directory));
    markets.vastai.verify().await;
    markets.runpod.verify().await;
}
