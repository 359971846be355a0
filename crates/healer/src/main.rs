//! VM self-healing service.
//!
//! Two ingestion modes share one remediation engine:
//! - `poll`: periodically read active alerts from Prometheus
//! - `serve`: receive alert batches on a webhook

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vm_healer::server::DEFAULT_WEBHOOK_PORT;
use vm_healer::{
    CooldownGuard, Poller, PolicyEngine, PrometheusClient, ProxmoxClient, ServerState, Settings,
    VmMapping,
};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "vm_healer=info,notify=info,tower_http=info";

/// Self-healing service for Proxmox VMs - restarts stopped VMs on InstanceDown alerts
#[derive(Parser)]
#[command(name = "vm-healer")]
#[command(about = "Self-healing service for Proxmox VMs - restarts stopped VMs on InstanceDown alerts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll Prometheus for active alerts on a fixed interval
    Poll,
    /// Receive pushed alerts on a webhook
    Serve {
        /// Port to listen on
        #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, env = "WEBHOOK_BIND", default_value = "0.0.0.0")]
        bind: String,
    },
    /// Run a single poll cycle and print the report
    Check,
    /// Run an instant Prometheus query and print the samples
    Query {
        /// PromQL expression
        expr: String,
    },
}

fn init_tracing(log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the remediation engine from settings.
fn build_engine(settings: &Settings) -> Result<Arc<PolicyEngine>> {
    let mapping = VmMapping::load(&settings.vm_mapping);
    let cooldown = Arc::new(CooldownGuard::new(settings.cooldown_window()));
    let control =
        ProxmoxClient::new(settings.proxmox()).context("Failed to create Proxmox client")?;
    let notifier = Arc::new(settings.notifier().context("Failed to create notifier")?);

    if settings.proxmox_token_id.is_empty() {
        warn!("PROXMOX_TOKEN_ID is not set, control plane calls will be rejected");
    }

    Ok(Arc::new(PolicyEngine::new(
        mapping,
        cooldown,
        Arc::new(control),
        notifier,
    )))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings;

    init_tracing(settings.log_json);

    match cli.command {
        Commands::Poll => {
            info!(prometheus = %settings.prometheus_url, "Monitoring Prometheus");
            info!(
                check_interval_secs = settings.check_interval,
                restart_cooldown_secs = settings.restart_cooldown,
                "Self-healing service started"
            );

            let engine = build_engine(&settings)?;
            let prometheus = PrometheusClient::new(settings.prometheus())?;
            if !prometheus.health_check().await {
                warn!("Prometheus is not healthy yet, polling anyway");
            }

            let poller = Poller::new(prometheus, engine, settings.check_interval());
            poller.run(shutdown_signal()).await;
        }
        Commands::Serve { port, bind } => {
            let engine = build_engine(&settings)?;
            info!(
                vm_mapping_count = engine.mapping().len(),
                restart_cooldown_secs = settings.restart_cooldown,
                "Self-healing webhook service started"
            );

            let state = Arc::new(ServerState::new(engine));
            let addr = format!("{bind}:{port}");
            vm_healer::run_server(state, &addr, shutdown_signal()).await?;
        }
        Commands::Check => {
            let engine = build_engine(&settings)?;
            let prometheus = PrometheusClient::new(settings.prometheus())?;
            let poller = Poller::new(prometheus, engine, settings.check_interval());

            let report = poller.run_once().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Query { expr } => {
            let prometheus = PrometheusClient::new(settings.prometheus())?;
            let samples = prometheus
                .query(&expr)
                .await
                .with_context(|| format!("Query failed: {expr}"))?;
            println!("{}", serde_json::to_string_pretty(&samples)?);
        }
    }

    Ok(())
}
