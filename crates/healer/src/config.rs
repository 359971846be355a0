//! Service configuration.
//!
//! Every setting can be given as a command-line flag or an environment
//! variable; the defaults match a small single-node Proxmox lab.

use clap::Args;
use notify::{ChannelError, Notifier, DEFAULT_NOTIFICATION_LOG};
use std::path::PathBuf;
use std::time::Duration;

use crate::control::{ProxmoxConfig, DEFAULT_PROXMOX_API_URL, DEFAULT_PROXMOX_NODE};
use crate::cooldown::DEFAULT_COOLDOWN_SECS;
use crate::poller::DEFAULT_CHECK_INTERVAL_SECS;
use crate::prometheus::{PrometheusConfig, DEFAULT_PROMETHEUS_URL};
use crate::resolver::DEFAULT_MAPPING_PATH;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Prometheus base URL
    #[arg(long, env = "PROMETHEUS_URL", default_value = DEFAULT_PROMETHEUS_URL, global = true)]
    pub prometheus_url: String,

    /// Proxmox API base URL (including /api2/json)
    #[arg(long, env = "PROXMOX_API_URL", default_value = DEFAULT_PROXMOX_API_URL, global = true)]
    pub proxmox_api_url: String,

    /// Proxmox node hosting the managed VMs
    #[arg(long, env = "PROXMOX_NODE", default_value = DEFAULT_PROXMOX_NODE, global = true)]
    pub proxmox_node: String,

    /// Proxmox API token id (user@realm!token)
    #[arg(long, env = "PROXMOX_TOKEN_ID", default_value = "", global = true)]
    pub proxmox_token_id: String,

    /// Proxmox API token secret
    #[arg(
        long,
        env = "PROXMOX_TOKEN_SECRET",
        default_value = "",
        hide_env_values = true,
        global = true
    )]
    pub proxmox_token_secret: String,

    /// Verify the Proxmox TLS certificate
    #[arg(long, env = "PROXMOX_VERIFY_TLS", global = true)]
    pub proxmox_verify_tls: bool,

    /// Seconds between alert polls
    #[arg(
        long,
        env = "CHECK_INTERVAL",
        default_value_t = DEFAULT_CHECK_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub check_interval: u64,

    /// Seconds during which a remediated VM is not touched again
    #[arg(long, env = "RESTART_COOLDOWN", default_value_t = DEFAULT_COOLDOWN_SECS, global = true)]
    pub restart_cooldown: u64,

    /// Timeout in seconds for Prometheus, Proxmox and Slack requests
    #[arg(
        long,
        env = "REQUEST_TIMEOUT",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub request_timeout: u64,

    /// JSON file mapping instance (host:port) to VMID
    #[arg(long, env = "VM_MAPPING_PATH", default_value = DEFAULT_MAPPING_PATH, global = true)]
    pub vm_mapping: PathBuf,

    /// Append-only notification log (empty disables file notifications)
    #[arg(long, env = "NOTIFICATION_LOG", default_value = DEFAULT_NOTIFICATION_LOG, global = true)]
    pub notification_log: String,

    /// Slack incoming webhook for notifications
    #[arg(long, env = "SLACK_WEBHOOK_URL", global = true)]
    pub slack_webhook_url: Option<String>,

    /// Output logs in JSON format
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,
}

impl Settings {
    /// Prometheus client configuration.
    #[must_use]
    pub fn prometheus(&self) -> PrometheusConfig {
        PrometheusConfig {
            base_url: self.prometheus_url.clone(),
            timeout_secs: self.request_timeout,
        }
    }

    /// Proxmox client configuration.
    #[must_use]
    pub fn proxmox(&self) -> ProxmoxConfig {
        ProxmoxConfig {
            api_url: self.proxmox_api_url.clone(),
            node: self.proxmox_node.clone(),
            token_id: self.proxmox_token_id.clone(),
            token_secret: self.proxmox_token_secret.clone(),
            verify_tls: self.proxmox_verify_tls,
            timeout_secs: self.request_timeout,
        }
    }

    /// Poll interval.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Cooldown window.
    #[must_use]
    pub const fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown)
    }

    /// Request timeout for outbound calls.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Build the notifier from the configured channels.
    ///
    /// # Errors
    /// Returns an error if a channel's HTTP client cannot be created.
    pub fn notifier(&self) -> Result<Notifier, ChannelError> {
        let log = (!self.notification_log.is_empty())
            .then(|| PathBuf::from(&self.notification_log));
        Notifier::from_settings(log, self.slack_webhook_url.clone(), self.request_timeout())
    }
}
