//! VM control plane client.
//!
//! [`ControlClient`] is the seam between the policy engine and the hypervisor
//! API. [`ProxmoxClient`] implements it against the Proxmox VE REST API.
//!
//! API Documentation: <https://pve.proxmox.com/pve-docs/api-viewer/>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::resolver::VmId;

/// Default Proxmox API base URL.
pub const DEFAULT_PROXMOX_API_URL: &str = "https://192.168.1.10:8006/api2/json";

/// Default Proxmox node name.
pub const DEFAULT_PROXMOX_NODE: &str = "pve";

/// Errors that can occur talking to the control plane.
#[derive(Error, Debug)]
pub enum ControlError {
    /// HTTP request failed (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Lifecycle state of a VM as reported by the hypervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmStatus {
    /// VM is running.
    Running,
    /// VM is stopped.
    Stopped,
    /// VM is paused/suspended.
    Paused,
    /// Any other reported state.
    Unknown(String),
}

impl VmStatus {
    /// Parse the status string reported by the hypervisor.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "paused" | "suspended" => Self::Paused,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether the VM is stopped.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Paused => write!(f, "paused"),
            Self::Unknown(status) => write!(f, "{status}"),
        }
    }
}

/// Operations the remediation engine needs from the control plane.
#[async_trait]
pub trait ControlClient: Send + Sync {
    /// Get the current lifecycle state of a VM.
    async fn status(&self, vm_id: VmId) -> Result<VmStatus, ControlError>;

    /// Start a VM.
    async fn start(&self, vm_id: VmId) -> Result<(), ControlError>;

    /// Reboot a VM.
    async fn reboot(&self, vm_id: VmId) -> Result<(), ControlError>;
}

/// Configuration for the Proxmox client.
#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    /// Base URL, including `/api2/json`
    pub api_url: String,
    /// Node hosting the managed VMs
    pub node: String,
    /// API token id (`user@realm!token`)
    pub token_id: String,
    /// API token secret
    pub token_secret: String,
    /// Verify the server certificate
    pub verify_tls: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_PROXMOX_API_URL.to_string(),
            node: DEFAULT_PROXMOX_NODE.to_string(),
            token_id: String::new(),
            token_secret: String::new(),
            verify_tls: false,
            timeout_secs: 10,
        }
    }
}

/// `{"data": ...}` envelope used by every Proxmox response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CurrentStatus {
    status: String,
}

/// Proxmox VE control client.
#[derive(Clone)]
pub struct ProxmoxClient {
    client: Client,
    config: ProxmoxConfig,
}

impl ProxmoxClient {
    /// Create a new Proxmox client.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(config: ProxmoxConfig) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self { client, config })
    }

    fn vm_url(&self, vm_id: VmId, action: &str) -> String {
        format!(
            "{}/nodes/{}/qemu/{vm_id}/status/{action}",
            self.config.api_url.trim_end_matches('/'),
            self.config.node
        )
    }

    fn auth_header(&self) -> String {
        format!(
            "PVEAPIToken={}={}",
            self.config.token_id, self.config.token_secret
        )
    }

    /// Issue a lifecycle action (`start`, `reboot`, ...).
    async fn post_action(&self, vm_id: VmId, action: &str) -> Result<(), ControlError> {
        let url = self.vm_url(vm_id, action);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(ControlError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

#[async_trait]
impl ControlClient for ProxmoxClient {
    async fn status(&self, vm_id: VmId) -> Result<VmStatus, ControlError> {
        let url = self.vm_url(vm_id, "current");
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ControlError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: ApiResponse<CurrentStatus> = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse response");
            ControlError::Decode(e.to_string())
        })?;

        parsed
            .data
            .map(|current| VmStatus::parse(&current.status))
            .ok_or_else(|| ControlError::Decode("missing data".to_string()))
    }

    async fn start(&self, vm_id: VmId) -> Result<(), ControlError> {
        self.post_action(vm_id, "start").await?;
        info!(vm_id = %vm_id, "Successfully started VM");
        Ok(())
    }

    async fn reboot(&self, vm_id: VmId) -> Result<(), ControlError> {
        self.post_action(vm_id, "reboot").await?;
        info!(vm_id = %vm_id, "Successfully rebooted VM");
        Ok(())
    }
}
