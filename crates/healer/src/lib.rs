//! Self-healing service for Proxmox VMs.
//!
//! Watches Prometheus alerts and takes corrective action on VMs that went
//! down, without ever causing restart loops.
//!
//! # Architecture
//!
//! - [`alert`] normalizes polled and pushed alert payloads into [`Alert`]
//! - [`resolver`] maps an alert's instance to a managed VM
//! - [`cooldown`] guards each VM against repeated remediation
//! - [`policy`] decides what to do for each alert kind
//! - [`control`] talks to the Proxmox API
//! - [`poller`] and [`server`] are the two ingestion adapters, both feeding
//!   the same [`PolicyEngine`]

pub mod alert;
pub mod config;
pub mod control;
pub mod cooldown;
pub mod poller;
pub mod policy;
pub mod prometheus;
pub mod resolver;
pub mod server;

pub use alert::{Alert, AlertKind, PolledAlert, WebhookAlert};
pub use config::Settings;
pub use control::{ControlClient, ControlError, ProxmoxClient, ProxmoxConfig, VmStatus};
pub use cooldown::{CooldownGuard, CooldownPermit};
pub use poller::Poller;
pub use policy::{BatchReport, Clock, PolicyEngine, RemediationOutcome, SystemClock};
pub use prometheus::{PrometheusClient, PrometheusConfig};
pub use resolver::{Target, VmId, VmMapping};
pub use server::{build_router, run_server, ServerState};
