//! Remediation policy engine.
//!
//! Maps each alert kind to a handler. Only `InstanceDown` can lead to a
//! corrective action (starting a stopped VM); resource alerts are surfaced as
//! notifications and unknown alerts are ignored.
//!
//! The engine is shared by the poll loop and the webhook server so both
//! transports make identical decisions.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use notify::{Notifier, NotifyEvent};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::alert::{Alert, AlertKind};
use crate::control::ControlClient;
use crate::cooldown::CooldownGuard;
use crate::resolver::{Target, VmMapping};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the engine did with one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    /// A stopped VM was started
    Started,
    /// VM reports a non-stopped state; operators were notified
    ManualInterventionRequired,
    /// VM was remediated recently (or a remediation is in flight)
    CooldownSuppressed,
    /// Notification only, no action by policy
    Notified,
    /// Instance is not in the VM mapping
    Unmapped,
    /// Alert kind has no handler
    Ignored,
    /// Alert is not firing
    NotFiring,
    /// Alert carried no instance
    Malformed,
}

impl RemediationOutcome {
    /// Whether the alert counts as processed in batch reports.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        !matches!(self, Self::NotFiring | Self::Malformed)
    }
}

/// Summary of one batch of alerts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Alerts in the batch
    pub received: usize,
    /// Firing alerts in the batch
    pub firing: usize,
    /// Firing, well-formed alerts handled without error
    pub processed: usize,
    /// Alerts whose handler failed
    pub failed: usize,
    /// Outcome of every successfully handled alert, in batch order
    pub outcomes: Vec<RemediationOutcome>,
}

impl BatchReport {
    /// Number of outcomes equal to `outcome`.
    #[must_use]
    pub fn count(&self, outcome: RemediationOutcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }
}

/// The remediation decision engine.
pub struct PolicyEngine {
    mapping: VmMapping,
    cooldown: Arc<CooldownGuard>,
    control: Arc<dyn ControlClient>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
}

impl PolicyEngine {
    /// Create an engine using the system clock.
    #[must_use]
    pub fn new(
        mapping: VmMapping,
        cooldown: Arc<CooldownGuard>,
        control: Arc<dyn ControlClient>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            mapping,
            cooldown,
            control,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// VM mapping the engine resolves against.
    #[must_use]
    pub fn mapping(&self) -> &VmMapping {
        &self.mapping
    }

    /// Shared cooldown table.
    #[must_use]
    pub fn cooldown(&self) -> &CooldownGuard {
        &self.cooldown
    }

    /// Handle a single alert.
    ///
    /// # Errors
    /// Returns an error if a control plane call fails. No cooldown is consumed
    /// in that case, so the next evaluation may retry.
    pub async fn handle(&self, alert: &Alert) -> Result<RemediationOutcome> {
        if !alert.firing {
            return Ok(RemediationOutcome::NotFiring);
        }

        if alert.is_malformed() {
            debug!(kind = %alert.kind, "Alert has no instance label, skipping");
            return Ok(RemediationOutcome::Malformed);
        }

        match alert.kind {
            AlertKind::InstanceDown => self.handle_instance_down(alert).await,
            AlertKind::HighCpuUsage => {
                warn!(instance = %alert.instance_key, "High CPU usage detected");
                Ok(self
                    .notify_only(alert, |target, timestamp| NotifyEvent::HighCpu {
                        vm_id: target.id.0,
                        instance: target.instance_key.clone(),
                        timestamp,
                    })
                    .await)
            }
            AlertKind::HighMemoryUsage => {
                warn!(instance = %alert.instance_key, "High memory usage detected");
                Ok(self
                    .notify_only(alert, |target, timestamp| NotifyEvent::HighMemory {
                        vm_id: target.id.0,
                        instance: target.instance_key.clone(),
                        timestamp,
                    })
                    .await)
            }
            AlertKind::Unknown => {
                debug!(instance = %alert.instance_key, "No healing action for alert");
                Ok(RemediationOutcome::Ignored)
            }
        }
    }

    /// Handle a batch, isolating failures per alert.
    ///
    /// An error or panic in one handler is logged with the alert kind and the
    /// remaining alerts are still processed.
    pub async fn handle_batch(&self, alerts: &[Alert]) -> BatchReport {
        let mut report = BatchReport {
            received: alerts.len(),
            firing: alerts.iter().filter(|a| a.firing).count(),
            ..BatchReport::default()
        };

        for alert in alerts {
            match AssertUnwindSafe(self.handle(alert)).catch_unwind().await {
                Ok(Ok(outcome)) => {
                    if outcome.is_processed() {
                        report.processed += 1;
                    }
                    report.outcomes.push(outcome);
                }
                Ok(Err(e)) => {
                    error!(
                        kind = %alert.kind,
                        instance = %alert.instance_key,
                        error = ?e,
                        "Error processing alert"
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    error!(
                        kind = %alert.kind,
                        instance = %alert.instance_key,
                        "Alert handler panicked"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn resolve(&self, alert: &Alert) -> Option<Target> {
        let target = self.mapping.resolve(&alert.instance_key);
        if target.is_none() {
            debug!(
                kind = %alert.kind,
                instance = %alert.instance_key,
                "Instance not in VM mapping, skipping"
            );
        }
        target
    }

    async fn handle_instance_down(&self, alert: &Alert) -> Result<RemediationOutcome> {
        warn!(instance = %alert.instance_key, "Instance down detected");

        let Some(target) = self.resolve(alert) else {
            return Ok(RemediationOutcome::Unmapped);
        };

        let Some(permit) = self.cooldown.try_acquire(target.id, self.clock.now()) else {
            return Ok(RemediationOutcome::CooldownSuppressed);
        };

        let status = self
            .control
            .status(target.id)
            .await
            .with_context(|| format!("Failed to get status of VM {}", target.id))?;

        if !status.is_stopped() {
            drop(permit);
            warn!(
                vm_id = %target.id,
                status = %status,
                "VM appears to be running but not responding, may need manual intervention"
            );
            self.notifier
                .notify_and_wait(NotifyEvent::ManualInterventionRequired {
                    vm_id: target.id.0,
                    instance: target.instance_key.clone(),
                    status: status.to_string(),
                    timestamp: self.clock.now(),
                })
                .await;
            return Ok(RemediationOutcome::ManualInterventionRequired);
        }

        info!(vm_id = %target.id, "VM is stopped, attempting to start");
        self.control
            .start(target.id)
            .await
            .with_context(|| format!("Failed to start VM {}", target.id))?;

        let now = self.clock.now();
        permit.record(now);

        self.notifier
            .notify_and_wait(NotifyEvent::VmStarted {
                vm_id: target.id.0,
                instance: target.instance_key,
                timestamp: now,
            })
            .await;

        Ok(RemediationOutcome::Started)
    }

    async fn notify_only<F>(&self, alert: &Alert, event: F) -> RemediationOutcome
    where
        F: FnOnce(&Target, DateTime<Utc>) -> NotifyEvent,
    {
        let Some(target) = self.resolve(alert) else {
            return RemediationOutcome::Unmapped;
        };

        info!(
            vm_id = %target.id,
            kind = %alert.kind,
            "Monitoring only, manual intervention may be required"
        );
        self.notifier
            .notify_and_wait(event(&target, self.clock.now()))
            .await;

        RemediationOutcome::Notified
    }
}
