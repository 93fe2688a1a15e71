//! Durable append-only audit log.
//!
//! One line per record: `[YYYY-MM-DD HH:MM:SS] <event>`. The file is opened
//! once per run in append mode and never truncated. Concurrent appenders are
//! serialised behind an async mutex; each record goes out in a single write
//! followed by a flush, so lines never interleave.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AuditError, Result};

/// Timestamp layout used in audit lines.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single timestamped audit event.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Local time the event was recorded.
    pub timestamp: DateTime<Local>,

    /// Free-text event description, single line.
    pub event: String,
}

impl AuditRecord {
    /// Stamp an event with the current local time.
    ///
    /// Line breaks in the event are flattened so one record is one line.
    pub fn now(event: impl Into<String>) -> Self {
        let event = event.into();
        let event = if event.contains(['\n', '\r']) {
            event
                .split(['\n', '\r'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" | ")
        } else {
            event
        };

        Self {
            timestamp: Local::now(),
            event,
        }
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.event
        )
    }
}

/// Process-wide audit log shared by every device worker.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Open (creating if needed) the audit log for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        debug!("audit log opened at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        let line = format!("{record}\n");

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(AuditError::from)?;
        file.flush().await.map_err(AuditError::from)?;
        Ok(())
    }

    /// Stamp and append an event, mirroring it to the console log.
    pub async fn record(&self, event: impl Into<String>) -> Result<()> {
        let record = AuditRecord::now(event);
        info!("{}", record.event);
        self.append(&record).await
    }

    /// Flush any buffered data to disk.
    pub async fn close(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await.map_err(AuditError::from)?;
        file.sync_all().await.map_err(AuditError::from)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn line_pattern() -> regex::Regex {
    regex::Regex::new(r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] ").unwrap()
}
