use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AppConfig;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("{0}")]
    Api(String),
    #[error("network error: {0}")]
    Http(String),
    #[error("unexpected search response: {0}")]
    Decode(String),
    #[error("Backend is not healthy")]
    Unhealthy,
}

/// Body of `POST {base}/search`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchRequest {
    pub artist: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

pub fn iso_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub events: Vec<BackendEventRecord>,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BackendPriceTier {
    pub name: String,
    #[serde(deserialize_with = "de_price")]
    pub min_price: f64,
    #[serde(deserialize_with = "de_price")]
    pub max_price: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BackendEventRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist: String,
    pub venue_name: String,
    pub date: String,
    #[serde(default)]
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(deserialize_with = "de_price")]
    pub min_price: f64,
    #[serde(deserialize_with = "de_price")]
    pub max_price: f64,
    pub vendor: String,
    #[serde(default)]
    pub vendor_url: String,
    #[serde(default)]
    pub price_tiers: Vec<BackendPriceTier>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// Decimal prices arrive either as JSON numbers or as strings like "45.00".
fn de_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    let price = match Price::deserialize(deserializer)? {
        Price::Number(n) => n,
        Price::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|err| serde::de::Error::custom(format!("invalid price {s:?}: {err}")))?,
    };
    if !price.is_finite() {
        return Err(serde::de::Error::custom(format!("non-finite price {price}")));
    }
    Ok(price)
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search_events(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError>;
    async fn check_health(&self) -> Result<HealthStatus, BackendError>;
}

pub struct BackendApi {
    base_url: String,
    client: Client,
}

impl BackendApi {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, BackendError> {
        // Searches run live lookups and may take minutes; no client timeout.
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| BackendError::Http(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        Self::new(config.backend_url.clone(), &config.user_agent)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SearchBackend for BackendApi {
    async fn search_events(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        let url = self.endpoint("search");
        debug!(%url, artist = %request.artist, "posting search");

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| BackendError::Http(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| BackendError::Http(err.to_string()))?;

        if !status.is_success() {
            warn!(%status, "search request rejected");
            return Err(BackendError::Api(failure_message(status, &body)));
        }

        serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))
    }

    async fn check_health(&self) -> Result<HealthStatus, BackendError> {
        let response = self
            .client
            .get(self.endpoint("health"))
            .send()
            .await
            .map_err(|err| {
                warn!(%err, "health check failed");
                BackendError::Unhealthy
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "health check failed");
            return Err(BackendError::Unhealthy);
        }

        response.json().await.map_err(|err| {
            warn!(%err, "health payload unreadable");
            BackendError::Unhealthy
        })
    }
}

/// Message surfaced for a non-2xx search response.
pub fn failure_message(status: StatusCode, body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return "Search failed".to_string(),
    };

    match parsed.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
        Some(Value::Null) | None => format!("Search failed: {}", status_text(status)),
        Some(Value::String(_)) => format!("Search failed: {}", status_text(status)),
        Some(other) => other.to_string(),
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}
