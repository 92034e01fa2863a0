//! Write-only payload audit trail.
//!
//! Every published payload is appended as one JSON line:
//! `{"run_id": ..., "timestamp": ..., "key": ..., "payload": {...}}`. Each
//! opened sink gets a fresh run id so restarts appending to the same file stay
//! distinguishable. The engine never reads the trail back.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ConvergencePayload;
use crate::domain::ports::PayloadSink;

/// One line of the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub payload: ConvergencePayload,
}

/// Appends payloads to a JSON-lines file
#[derive(Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
    run_id: Uuid,
    file: Arc<Mutex<File>>,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating parent directories if needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create audit directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit file {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            run_id: Uuid::new_v4(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn append(&self, line: &str) -> DomainResult<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| DomainError::Persistence(format!("audit file mutex poisoned: {e}")))?;
        writeln!(file, "{line}")
            .and_then(|()| file.flush())
            .map_err(|e| DomainError::Persistence(format!("failed to write audit record: {e}")))
    }
}

#[async_trait]
impl PayloadSink for JsonlAuditSink {
    async fn persist(&self, key: &str, payload: &ConvergencePayload) -> DomainResult<()> {
        let record = AuditRecord {
            run_id: self.run_id,
            timestamp: Utc::now(),
            key: key.to_string(),
            payload: payload.clone(),
        };
        let line = serde_json::to_string(&record)?;

        let sink = self.clone();
        tokio::task::spawn_blocking(move || sink.append(&line))
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("audit write task failed: {e}")))??;

        debug!(key, hash = %payload.secondary_hash, "payload audited");
        Ok(())
    }
}

/// Discards every payload
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl PayloadSink for NullSink {
    async fn persist(&self, _key: &str, _payload: &ConvergencePayload) -> DomainResult<()> {
        Ok(())
    }
}
