//! Alert normalization.
//!
//! Prometheus (`/api/v1/alerts`) and Alertmanager-style webhooks describe the
//! same alert with slightly different layouts. Both are reduced here to a
//! single [`Alert`] record so the policy engine never sees the transport.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value of the state/status field for an active alert.
const FIRING: &str = "firing";

/// Alert kinds the policy engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// Scrape target is down
    InstanceDown,
    /// CPU usage above threshold
    HighCpuUsage,
    /// Memory usage above threshold
    HighMemoryUsage,
    /// Anything else
    Unknown,
}

impl AlertKind {
    /// Parse the `alertname` label.
    #[must_use]
    pub fn from_alert_name(name: &str) -> Self {
        match name {
            "InstanceDown" => Self::InstanceDown,
            "HighCPUUsage" => Self::HighCpuUsage,
            "HighMemoryUsage" => Self::HighMemoryUsage,
            _ => Self::Unknown,
        }
    }

    /// The `alertname` label value for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InstanceDown => "InstanceDown",
            Self::HighCpuUsage => "HighCPUUsage",
            Self::HighMemoryUsage => "HighMemoryUsage",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    /// What kind of alert this is
    pub kind: AlertKind,
    /// Scrape target the alert is about (`host:port`), empty when unknown
    pub instance_key: String,
    /// Whether the alert is currently firing
    pub firing: bool,
}

impl Alert {
    /// Build a firing alert.
    #[must_use]
    pub fn firing(kind: AlertKind, instance_key: impl Into<String>) -> Self {
        Self {
            kind,
            instance_key: instance_key.into(),
            firing: true,
        }
    }

    /// Whether the source payload lacked an instance label.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.instance_key.is_empty()
    }

    fn from_parts(labels: Option<&HashMap<String, String>>, indicator: Option<&str>) -> Self {
        let Some(labels) = labels else {
            return Self {
                kind: AlertKind::Unknown,
                instance_key: String::new(),
                firing: indicator == Some(FIRING),
            };
        };

        Self {
            kind: labels
                .get("alertname")
                .map_or(AlertKind::Unknown, |name| AlertKind::from_alert_name(name)),
            instance_key: labels.get("instance").cloned().unwrap_or_default(),
            firing: indicator == Some(FIRING),
        }
    }
}

/// Providers whose alert payloads can be normalized.
pub trait Normalize: DeserializeOwned {
    /// Field carrying the firing indicator in this layout.
    const INDICATOR: &'static str;

    /// Payload without labels, keeping only the firing indicator.
    fn unlabelled(indicator: Option<String>) -> Self;

    /// Reduce the payload to an [`Alert`]. Never fails.
    fn normalize(&self) -> Alert;

    /// Parse a single element without failing its batch.
    ///
    /// Elements that do not match the expected shape keep only their
    /// indicator, so they normalize to a malformed [`Alert`] that is firing
    /// exactly when the indicator says so.
    fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| {
            Self::unlabelled(
                value
                    .get(Self::INDICATOR)
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string),
            )
        })
    }
}

/// One element of `data.alerts` in a Prometheus `/api/v1/alerts` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolledAlert {
    /// Alert labels
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// `firing`, `pending` or `inactive`
    #[serde(default)]
    pub state: Option<String>,
}

impl Normalize for PolledAlert {
    const INDICATOR: &'static str = "state";

    fn unlabelled(state: Option<String>) -> Self {
        Self {
            labels: None,
            state,
        }
    }

    fn normalize(&self) -> Alert {
        Alert::from_parts(self.labels.as_ref(), self.state.as_deref())
    }
}

/// One element of `alerts` in a pushed webhook delivery.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookAlert {
    /// Alert labels
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// `firing` or `resolved`
    #[serde(default)]
    pub status: Option<String>,
}

impl Normalize for WebhookAlert {
    const INDICATOR: &'static str = "status";

    fn unlabelled(status: Option<String>) -> Self {
        Self {
            labels: None,
            status,
        }
    }

    fn normalize(&self) -> Alert {
        Alert::from_parts(self.labels.as_ref(), self.status.as_deref())
    }
}

/// Normalize a batch and keep only firing alerts.
pub fn firing_alerts<'a, T, I>(raw: I) -> Vec<Alert>
where
    T: Normalize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    raw.into_iter()
        .map(Normalize::normalize)
        .filter(|alert| alert.firing)
        .collect()
}
