use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Response,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

pub const POAP_API_BASE_URL: &str = "https://api.poap.tech";
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(20);

const CARD_TITLE: &str = "CLAIM YOUR POAP!";
const CARD_TEXT: &str = "Thanks for attending our event!";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("POAP API Error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("POAP API Error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid POAP API key")]
    InvalidApiKey,
}

/// Event metadata as returned by the POAP API. Unknown fields are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoapEventInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub address: String,
    pub events: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    #[serde(rename = "eventId")]
    pub event_id: String,
    pub secret_codes: String,
    pub addresses: Vec<DeliveryAddress>,
}

/// Body posted to `/deliveries`: the request enriched with the event's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryPayload {
    #[serde(flatten)]
    pub request: DeliveryRequest,
    pub slug: String,
    pub image: String,
    pub page_title_image: String,
    pub event_ids: String,
    pub metadata_title: String,
    pub metadata_description: String,
    pub card_title: String,
    pub card_text: String,
    pub page_title: String,
    pub page_text: String,
}

/// Lower-cased event name with spaces replaced by dashes
pub fn delivery_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

impl DeliveryPayload {
    pub fn new(request: DeliveryRequest, info: &PoapEventInfo) -> Self {
        Self {
            slug: delivery_slug(&info.name),
            image: info.image_url.clone(),
            page_title_image: info.image_url.clone(),
            event_ids: request.event_id.clone(),
            metadata_title: info.name.clone(),
            metadata_description: info.description.clone(),
            card_title: CARD_TITLE.to_string(),
            card_text: CARD_TEXT.to_string(),
            page_title: info.name.clone(),
            page_text: info.description.clone(),
            request,
        }
    }
}

/// Client for the POAP issuance API.
#[derive(Debug, Clone)]
pub struct PoapGatewayClient {
    client: Client,
    base_url: String,
}

impl PoapGatewayClient {
    pub fn new(api_key: &str, base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-API-Key",
            HeaderValue::from_str(api_key).map_err(|_| GatewayError::InvalidApiKey)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(GATEWAY_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_event_info(&self, event_id: &str) -> Result<PoapEventInfo, GatewayError> {
        let response = self
            .client
            .get(format!("{}/events/id/{}", self.base_url, event_id))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    #[instrument(skip(self, request), fields(event_id = %request.event_id))]
    pub async fn create_delivery(&self, request: DeliveryRequest) -> Result<Value, GatewayError> {
        let info = self.get_event_info(&request.event_id).await?;
        let payload = DeliveryPayload::new(request, &info);
        debug!("creating delivery {}", payload.slug);

        let response = self
            .client
            .post(format!("{}/deliveries", self.base_url))
            .json(&payload)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Prefer the API's `message` field, fall back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
