//! Persisted event log
//!
//! One redacted JSON object per line, partitioned by day:
//! `<logs_dir>/<YYYY-MM-DD>/wave-orch.jsonl`.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use waveorch_core::{redact, redact_value, Result};

/// Default retention window in days
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

const LOG_FILE_NAME: &str = "wave-orch.jsonl";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Append-only, date-partitioned JSONL logger
#[derive(Debug, Clone)]
pub struct Logger {
    logs_dir: PathBuf,
    retention_days: i64,
}

impl Logger {
    /// Logger rooted at `logs_dir`; retention <= 0 falls back to the default
    pub fn new(logs_dir: impl Into<PathBuf>, retention_days: i64) -> Self {
        let retention_days = if retention_days <= 0 {
            DEFAULT_RETENTION_DAYS
        } else {
            retention_days
        };
        Self {
            logs_dir: logs_dir.into(),
            retention_days,
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }

    /// Log file for a given day
    pub fn log_file_for(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir
            .join(date.format(DATE_FORMAT).to_string())
            .join(LOG_FILE_NAME)
    }

    /// Redact and append one record to today's file
    pub async fn log(
        &self,
        level: LogLevel,
        component: &str,
        message: &str,
        data: Option<Value>,
    ) -> Result<()> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            message: redact(message),
            data: data.as_ref().map(redact_value),
        };

        let path = self.log_file_for(entry.timestamp.date_naive());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn info(&self, component: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Info, component, message, None).await
    }

    pub async fn warn(&self, component: &str, message: &str) -> Result<()> {
        self.log(LogLevel::Warn, component, message, None).await
    }

    pub async fn error(
        &self,
        component: &str,
        message: &str,
        err: impl std::fmt::Display,
    ) -> Result<()> {
        let data = serde_json::json!({ "error": err.to_string() });
        self.log(LogLevel::Error, component, message, Some(data)).await
    }

    /// Remove day directories older than the retention window
    pub async fn clean_old_logs(&self) -> Result<usize> {
        self.clean_old_logs_at(Utc::now().date_naive()).await
    }

    /// Same as [`Logger::clean_old_logs`] relative to a fixed day
    ///
    /// Directories whose name is not exactly `YYYY-MM-DD` are left alone.
    pub async fn clean_old_logs_at(&self, today: NaiveDate) -> Result<usize> {
        if !fs::try_exists(&self.logs_dir).await? {
            return Ok(0);
        }

        let cutoff = today
            .checked_sub_days(Days::new(self.retention_days.unsigned_abs()))
            .unwrap_or(NaiveDate::MIN);

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.logs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(date) = parse_day_dir(&name) else {
                continue;
            };
            if date < cutoff {
                fs::remove_dir_all(entry.path()).await?;
                debug!("Removed log directory {}", name);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn parse_day_dir(name: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(name, DATE_FORMAT).ok()?;
    (date.format(DATE_FORMAT).to_string() == name).then_some(date)
}
