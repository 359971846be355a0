//! Notification sinks for VM remediation events.
//!
//! Every remediation decision that a human should see (a VM was started, a VM
//! needs manual intervention, a resource alert fired) is turned into a
//! [`NotifyEvent`] and handed to a [`Notifier`], which delivers it to every
//! enabled channel.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! # async fn run() -> Result<(), notify::ChannelError> {
//! let notifier = Notifier::from_settings(
//!     Some("/var/log/self-healing-notifications.log".into()),
//!     None,
//!     std::time::Duration::from_secs(10),
//! )?;
//!
//! notifier
//!     .notify_and_wait(NotifyEvent::VmStarted {
//!         vm_id: 100,
//!         instance: "192.168.1.100:9100".to_string(),
//!         timestamp: chrono::Utc::now(),
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`FileChannel`] appends timestamped lines to a local log file
//! - [`SlackChannel`] posts to a Slack incoming webhook
//! - [`Notifier`] dispatches events to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::file::{FileChannel, DEFAULT_NOTIFICATION_LOG};
pub use channels::slack::SlackChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and delivers each
/// event to every enabled one. A failing channel never affects the others.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
}

impl Notifier {
    /// Create a notifier from service settings.
    ///
    /// The file channel is enabled when a log path is given, the Slack channel
    /// when a webhook URL is given. Remote deliveries are bounded by
    /// `request_timeout`.
    ///
    /// # Errors
    /// Returns an error if a channel's HTTP client cannot be created.
    pub fn from_settings(
        notification_log: Option<PathBuf>,
        slack_webhook_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        if let Some(path) = notification_log {
            let file = FileChannel::new(path);
            if file.enabled() {
                info!(path = %file.path().display(), "File notifications enabled");
                channels.push(Arc::new(file));
            }
        }

        let slack = SlackChannel::from_url(slack_webhook_url, request_timeout)?;
        if slack.enabled() {
            info!("Slack notifications enabled");
            channels.push(Arc::new(slack));
        }

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        Ok(Self { channels })
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self { channels }
    }

    /// Get the number of configured channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send a notification and wait for all channels to complete.
    ///
    /// Channel errors are logged and returned per channel, never propagated.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        info!(vm_id = event.vm_id(), "NOTIFICATION: {}", event.message());

        if self.channels.is_empty() {
            debug!("No channels configured, skipping event");
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            let channel_name = channel.name();

            if !channel.enabled() {
                debug!(channel = channel_name, "Channel disabled, skipping");
                continue;
            }

            let result = channel.send(&event).await;
            if let Err(e) = &result {
                error!(
                    channel = channel_name,
                    error = %e,
                    "Failed to send notification"
                );
            }
            results.push((channel_name.to_string(), result));
        }

        results
    }
}
