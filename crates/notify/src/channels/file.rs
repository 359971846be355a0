//! Append-only notification log file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Default location of the notification log.
pub const DEFAULT_NOTIFICATION_LOG: &str = "/var/log/self-healing-notifications.log";

/// Writes one timestamped line per event to a local file.
pub struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    /// Create a file channel appending to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the notification log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format an event as a log line, including the trailing newline.
    #[must_use]
    pub fn format_line(event: &NotifyEvent) -> String {
        format!("{} - {}\n", event.timestamp().to_rfc3339(), event.message())
    }
}

#[async_trait]
impl NotifyChannel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn enabled(&self) -> bool {
        !self.path.as_os_str().is_empty()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let line = Self::format_line(event);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(channel = "file", path = %self.path.display(), "Notification appended");
        Ok(())
    }
}
