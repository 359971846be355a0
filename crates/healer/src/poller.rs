//! Polling ingestion.
//!
//! Fetches active alerts from Prometheus on a fixed interval and feeds the
//! firing ones through the policy engine. An alert that keeps firing is
//! evaluated again every cycle; the cooldown is what prevents repeated
//! action.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::alert::firing_alerts;
use crate::policy::{BatchReport, PolicyEngine};
use crate::prometheus::PrometheusClient;

/// Default poll interval in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Shortest allowed poll interval.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic alert poller.
pub struct Poller {
    prometheus: PrometheusClient,
    engine: Arc<PolicyEngine>,
    interval: Duration,
}

impl Poller {
    /// Create a poller. Intervals shorter than one second are raised to one
    /// second.
    #[must_use]
    pub fn new(prometheus: PrometheusClient, engine: Arc<PolicyEngine>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(
                interval = ?interval,
                "Poll interval too short, using 1s"
            );
        }

        Self {
            prometheus,
            engine,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Run a single cycle.
    ///
    /// A failure to fetch alerts is logged and treated as "no data this
    /// cycle".
    pub async fn run_once(&self) -> BatchReport {
        let raw = match self.prometheus.get_alerts().await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = ?e, "Error fetching alerts from Prometheus");
                return BatchReport::default();
            }
        };

        let alerts = firing_alerts(&raw);
        if alerts.is_empty() {
            debug!("No active alerts");
            return BatchReport {
                received: raw.len(),
                ..BatchReport::default()
            };
        }

        info!(count = alerts.len(), "Processing active alerts");
        let mut report = self.engine.handle_batch(&alerts).await;
        report.received = raw.len();
        report
    }

    /// Poll until `shutdown` resolves.
    ///
    /// Cycles never overlap: a slow cycle delays the next tick instead of
    /// running concurrently with it.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        info!(
            interval_secs = self.interval.as_secs(),
            "Self-healing poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping poller");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    debug!(
                        received = report.received,
                        processed = report.processed,
                        failed = report.failed,
                        "Poll cycle complete"
                    );
                }
            }
        }
    }
}
