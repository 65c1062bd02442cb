//! RunPod GraphQL source (`gpuTypes` query)

use crate::config::Config;
use crate::types::{AdapterError, Availability, RawOffer, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{http_client, SourceAdapter};

const SOURCE_ID: &str = "runpod";

const GPU_TYPES_QUERY: &str = "query GpuTypes { gpuTypes { id displayName memoryInGb \
communityPrice securePrice oneMonthPrice lowestPrice(input: { gpuCount: 1 }) { stockStatus } } }";

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GpuTypesData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct GpuTypesData {
    #[serde(rename = "gpuTypes")]
    gpu_types: Option<Vec<GpuType>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GpuType {
    display_name: String,
    #[serde(default)]
    memory_in_gb: Option<u32>,
    #[serde(default)]
    community_price: Option<f64>,
    #[serde(default)]
    secure_price: Option<f64>,
    #[serde(default)]
    one_month_price: Option<f64>,
    #[serde(default)]
    lowest_price: Option<LowestPrice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LowestPrice {
    #[serde(default)]
    stock_status: Option<String>,
}

impl GpuType {
    /// Community, then secure, then one-month; first strictly positive wins
    fn selected_price(&self) -> Option<f64> {
        [self.community_price, self.secure_price, self.one_month_price]
            .into_iter()
            .flatten()
            .find(|p| p.is_finite() && *p > 0.0)
    }

    fn availability(&self) -> Availability {
        match &self.lowest_price {
            None => Availability::Available,
            Some(lowest) => match lowest.stock_status.as_deref() {
                Some("High") | Some("Medium") => Availability::Available,
                Some("Low") => Availability::Limited,
                _ => Availability::Unavailable,
            },
        }
    }
}

/// Source for RunPod GPU type pricing
pub struct RunPodSource {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl RunPodSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            api_key: config.runpod_api_key.clone(),
            base_url: config.runpod_base_url.trim_end_matches('/').to_string(),
            client: http_client(config.request_timeout)?,
        })
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url)
    }
}

#[async_trait]
impl SourceAdapter for RunPodSource {
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
            .post(self.graphql_url())
            .query(&[("api_key", api_key)])
            .json(&json!({ "query": GPU_TYPES_QUERY }))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SOURCE_ID, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::status(
                SOURCE_ID,
                status.as_u16(),
                format!("POST /graphql returned {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::from_reqwest(SOURCE_ID, &e))?;
        let parsed: GraphQlResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::schema(SOURCE_ID, format!("JSON parse error: {}", e)))?;

        let gpu_types = match parsed.data.and_then(|data| data.gpu_types) {
            Some(types) => types,
            None => match parsed.errors {
                Some(errors) if !errors.is_empty() => {
                    let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
                    return Err(AdapterError::unavailable(
                        SOURCE_ID,
                        format!("GraphQL errors: {}", messages.join("; ")),
                    ));
                }
                _ => return Err(AdapterError::schema(SOURCE_ID, "missing data.gpuTypes")),
            },
        };

        Ok(gpu_types
            .into_iter()
            .filter_map(|gpu| {
                let price = gpu.selected_price()?;
                Some(RawOffer {
                    availability: gpu.availability(),
                    price_per_hour: price,
                    memory_gb: gpu.memory_in_gb,
                    name: gpu.display_name,
                })
            })
            .collect())
    }
}
