//! Prometheus client for reading alerts and metrics.
//!
//! Provides functions to query Prometheus for:
//! - Currently active alerts (`/api/v1/alerts`)
//! - Ad hoc instant queries (`/api/v1/query`)
//! - Server health

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::alert::{Normalize, PolledAlert};

/// Default Prometheus URL.
pub const DEFAULT_PROMETHEUS_URL: &str = "http://192.168.1.103:9090";

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL for the Prometheus API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROMETHEUS_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Alerts endpoint response
#[derive(Debug, Deserialize)]
struct AlertsResponse {
    status: String,
    #[serde(default)]
    data: Option<AlertsData>,
}

#[derive(Debug, Deserialize)]
struct AlertsData {
    #[serde(default)]
    alerts: Vec<serde_json::Value>,
}

/// Prometheus query response
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    metric: HashMap<String, String>,
    value: Option<(f64, String)>,
}

/// A metric sample from Prometheus
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    /// Labels associated with this metric
    pub labels: HashMap<String, String>,
    /// The metric value
    pub value: f64,
    /// Timestamp of the sample
    pub timestamp: DateTime<Utc>,
}

/// Prometheus client for querying alerts and metrics
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    config: PrometheusConfig,
    client: reqwest::Client,
}

impl PrometheusClient {
    /// Create a new Prometheus client with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Get all active alerts.
    ///
    /// Individual elements are parsed leniently: an element with an
    /// unexpected shape keeps only its `state` instead of failing the whole
    /// list. A non-`success` status yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the request fails or the envelope cannot be parsed.
    pub async fn get_alerts(&self) -> Result<Vec<PolledAlert>> {
        let url = self.url("/api/v1/alerts");
        debug!(url = %url, "Fetching Prometheus alerts");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to Prometheus")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus alerts request failed with status {status}: {body}");
        }

        let alerts: AlertsResponse = response
            .json()
            .await
            .context("Failed to parse Prometheus alerts response")?;

        if alerts.status != "success" {
            warn!(status = %alerts.status, "Prometheus alerts returned non-success status");
            return Ok(vec![]);
        }

        Ok(alerts
            .data
            .map(|data| {
                data.alerts
                    .iter()
                    .map(PolledAlert::from_value)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Execute an instant query.
    ///
    /// # Errors
    /// Returns an error if the query fails or response cannot be parsed.
    pub async fn query(&self, query: &str) -> Result<Vec<MetricSample>> {
        let url = self.url("/api/v1/query");

        debug!(query = %query, "Executing Prometheus query");

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .context("Failed to send request to Prometheus")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus query failed with status {status}: {body}");
        }

        let prom_response: QueryResponse = response
            .json()
            .await
            .context("Failed to parse Prometheus response")?;

        if prom_response.status != "success" {
            anyhow::bail!("Prometheus query returned status: {}", prom_response.status);
        }

        Ok(parse_results(prom_response.data.result))
    }

    /// Check Prometheus health.
    pub async fn health_check(&self) -> bool {
        let url = self.url("/-/healthy");

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Prometheus health check failed");
                false
            }
        }
    }
}

/// Parse instant query results.
fn parse_results(results: Vec<QueryResult>) -> Vec<MetricSample> {
    results
        .into_iter()
        .filter_map(|result| {
            let (timestamp, value_str) = result.value?;
            let value: f64 = value_str.parse().unwrap_or(0.0);
            #[allow(clippy::cast_possible_truncation)]
            let ts = DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_else(Utc::now);

            Some(MetricSample {
                labels: result.metric,
                value,
                timestamp: ts,
            })
        })
        .collect()
}
