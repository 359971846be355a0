//! Notification event types for VM remediation.

use chrono::{DateTime, Utc};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get the Slack attachment color for this severity.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Info => "#3498db",     // Blue
            Self::Warning => "#f39c12",  // Orange
            Self::Critical => "#e74c3c", // Red
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    /// A stopped VM was started automatically
    VmStarted {
        vm_id: u32,
        instance: String,
        timestamp: DateTime<Utc>,
    },

    /// A VM is reported as running while its instance is down
    ManualInterventionRequired {
        vm_id: u32,
        instance: String,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// CPU usage alert on a managed VM
    HighCpu {
        vm_id: u32,
        instance: String,
        timestamp: DateTime<Utc>,
    },

    /// Memory usage alert on a managed VM
    HighMemory {
        vm_id: u32,
        instance: String,
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::VmStarted { vm_id, .. } => format!("VM {vm_id} Auto-Started"),
            Self::ManualInterventionRequired { vm_id, .. } => {
                format!("VM {vm_id} Needs Manual Intervention")
            }
            Self::HighCpu { vm_id, .. } => format!("High CPU: VM {vm_id}"),
            Self::HighMemory { vm_id, .. } => format!("High Memory: VM {vm_id}"),
        }
    }

    /// The one-line human-readable record written by text sinks.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::VmStarted {
                vm_id, instance, ..
            } => format!("Auto-started VM {vm_id} ({instance})"),
            Self::ManualInterventionRequired {
                vm_id,
                instance,
                status,
                ..
            } => format!(
                "VM {vm_id} ({instance}) reports status '{status}' but is not responding, \
                 manual intervention may be required"
            ),
            Self::HighCpu {
                vm_id, instance, ..
            } => format!("High CPU alert on VM {vm_id} ({instance})"),
            Self::HighMemory {
                vm_id, instance, ..
            } => format!("High memory alert on VM {vm_id} ({instance})"),
        }
    }

    /// Get the severity/color for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::VmStarted { .. } => Severity::Info,
            Self::HighCpu { .. } | Self::HighMemory { .. } => Severity::Warning,
            Self::ManualInterventionRequired { .. } => Severity::Critical,
        }
    }

    /// VM the event refers to.
    #[must_use]
    pub const fn vm_id(&self) -> u32 {
        match self {
            Self::VmStarted { vm_id, .. }
            | Self::ManualInterventionRequired { vm_id, .. }
            | Self::HighCpu { vm_id, .. }
            | Self::HighMemory { vm_id, .. } => *vm_id,
        }
    }

    /// Instance key (`host:port`) the event refers to.
    #[must_use]
    pub fn instance(&self) -> &str {
        match self {
            Self::VmStarted { instance, .. }
            | Self::ManualInterventionRequired { instance, .. }
            | Self::HighCpu { instance, .. }
            | Self::HighMemory { instance, .. } => instance,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::VmStarted { timestamp, .. }
            | Self::ManualInterventionRequired { timestamp, .. }
            | Self::HighCpu { timestamp, .. }
            | Self::HighMemory { timestamp, .. } => *timestamp,
        }
    }
}
