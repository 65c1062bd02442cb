//! Vast.ai REST source (`GET /bundles/`)

use crate::config::Config;
use crate::types::{AdapterError, Availability, RawOffer, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{http_client, SourceAdapter};

const SOURCE_ID: &str = "vastai";

#[derive(Deserialize)]
struct BundlesResponse {
    offers: Vec<VastOffer>,
}

#[derive(Deserialize)]
struct VastOffer {
    gpu_name: String,
    /// Total $/hour for the machine
    dph_total: f64,
    /// Per-GPU memory in MiB
    #[serde(default)]
    gpu_ram: Option<f64>,
    #[serde(default)]
    rentable: Option<bool>,
}

impl From<VastOffer> for RawOffer {
    fn from(offer: VastOffer) -> Self {
        RawOffer {
            name: offer.gpu_name,
            price_per_hour: offer.dph_total,
            memory_gb: offer
                .gpu_ram
                .filter(|mib| *mib > 0.0)
                .map(|mib| (mib / 1024.0).round() as u32),
            availability: match offer.rentable {
                Some(false) => Availability::Unavailable,
                _ => Availability::Available,
            },
        }
    }
}

/// Source for Vast.ai marketplace offers
pub struct VastAiSource {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl VastAiSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            api_key: config.vastai_api_key.clone(),
            base_url: config.vastai_base_url.trim_end_matches('/').to_string(),
            client: http_client(config.request_timeout)?,
        })
    }

    fn bundles_url(&self) -> String {
        format!("{}/bundles/", self.base_url)
    }
}

#[async_trait]
impl SourceAdapter for VastAiSource {
    fn name(&self) -> &str {
        SOURCE_ID
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_offers(&self) -> std::result::Result<Vec<RawOffer>, AdapterError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::ConfigMissing {
                source_id: SOURCE_ID.to_string(),
            })?;

        let response = self
            .client
            .get(self.bundles_url())
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SOURCE_ID, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::status(
                SOURCE_ID,
                status.as_u16(),
                format!("GET /bundles/ returned {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::from_reqwest(SOURCE_ID, &e))?;
        let bundles: BundlesResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::schema(SOURCE_ID, format!("JSON parse error: {}", e)))?;

        Ok(bundles.offers.into_iter().map(RawOffer::from).collect())
    }
}
