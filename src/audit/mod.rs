//! Login audit trail.
//!
//! Every successful login appends one `(username, timestamp)` row to the
//! configured sink. Timestamps are rendered in a fixed UTC offset (IST by
//! default) as `YYYY-MM-DD HH:MM:SS`.

pub mod sheets;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::config::{AuditConfig, AuditSinkKind, TokenSourceKind};
use crate::errors::{SafeLock, TierError, TierResult};
use crate::secrets::ServiceAccount;

pub use sheets::{
    secrets_token_source, MetadataToken, ServiceAccountToken, SheetsAuditSink, StaticToken, TokenSource,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRow {
    pub username: String,
    pub timestamp: String,
}

impl AuditRow {
    pub fn at(username: &str, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            username: username.to_string(),
            timestamp: format_timestamp(now, offset),
        }
    }

    pub fn cells(&self) -> [&str; 2] {
        [&self.username, &self.timestamp]
    }
}

pub fn format_timestamp(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string()
}

pub fn fixed_offset(minutes: i32) -> TierResult<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| TierError::config(format!("invalid UTC offset: {minutes} minutes")))
}

/// Destination for audit rows.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn append_row(&self, row: &AuditRow) -> TierResult<()>;
}

/// Stamps and forwards login events to a sink.
#[derive(Clone)]
pub struct LoginAudit {
    sink: Arc<dyn AuditSink>,
    offset: FixedOffset,
}

impl LoginAudit {
    pub fn new(sink: Arc<dyn AuditSink>, offset: FixedOffset) -> Self {
        Self { sink, offset }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub async fn log(&self, username: &str) -> TierResult<AuditRow> {
        self.log_at(username, Utc::now()).await
    }

    pub async fn log_at(&self, username: &str, now: DateTime<Utc>) -> TierResult<AuditRow> {
        let row = AuditRow::at(username, now, self.offset);
        match self.sink.append_row(&row).await {
            Ok(()) => {
                info!(sink = self.sink.name(), user = %row.username, at = %row.timestamp, "login recorded");
                Ok(row)
            }
            Err(e) => {
                error!(sink = self.sink.name(), user = %row.username, error = %e, "login audit failed");
                Err(e)
            }
        }
    }
}

/// Appends CSV lines to a local file.
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn append_row(&self, row: &AuditRow) -> TierResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TierError::io(format!("creating {}", parent.display()), e))?;
        }
        let line = row.cells().iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(",") + "\n";
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TierError::io(format!("opening {}", self.path.display()), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TierError::io(format!("appending to {}", self.path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| TierError::io(format!("flushing {}", self.path.display()), e))
    }
}

/// Keeps rows in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    rows: Mutex<Vec<AuditRow>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<AuditRow> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append_row(&self, row: &AuditRow) -> TierResult<()> {
        self.rows.safe_lock("audit rows")?.push(row.clone());
        Ok(())
    }
}

pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn append_row(&self, _row: &AuditRow) -> TierResult<()> {
        Ok(())
    }
}

/// Build the sink named by the audit configuration.
pub fn build_sink(config: &AuditConfig) -> TierResult<Arc<dyn AuditSink>> {
    let sink: Arc<dyn AuditSink> = match config.sink {
        AuditSinkKind::Disabled => Arc::new(NoopAuditSink),
        AuditSinkKind::File => Arc::new(FileAuditSink::new(&config.file_path)),
        AuditSinkKind::Sheets => {
            let tokens: Arc<dyn TokenSource> = match config.token_source {
                TokenSourceKind::Secrets => {
                    let path = config
                        .secrets_path
                        .as_ref()
                        .ok_or_else(|| TierError::config("audit.secrets_path is not set"))?;
                    secrets_token_source(&ServiceAccount::load(path)?)?
                }
                TokenSourceKind::Metadata => Arc::new(MetadataToken::default()),
            };
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| TierError::network("building audit client", e))?;
            Arc::new(SheetsAuditSink::new(
                client,
                tokens,
                &config.spreadsheet_name,
                config.spreadsheet_id.clone(),
                &config.worksheet,
            ))
        }
    };
    Ok(sink)
}

pub fn build_login_audit(config: &AuditConfig) -> TierResult<LoginAudit> {
    Ok(LoginAudit::new(build_sink(config)?, fixed_offset(config.utc_offset_minutes)?))
}
