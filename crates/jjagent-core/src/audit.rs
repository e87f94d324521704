//! Append-only audit trail of guarded actions.
//!
//! One JSON object per line at `<state_dir>/<job_id>/audit.jsonl`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionResult;
use crate::error::AuditError;

pub const AUDIT_FILE: &str = "audit.jsonl";

/// Destination for audit records. Errors are reported to the caller, who
/// logs and drops them; an audit failure never changes an action's result.
pub trait AuditSink: Send + Sync {
    fn record_action(
        &self,
        tool: &str,
        args: &serde_json::Value,
        result: &ActionResult,
        duration_ms: u64,
        exit_code: Option<i32>,
    ) -> Result<(), AuditError>;

    fn record_denial(
        &self,
        tool: &str,
        args: &serde_json::Value,
        reason: &str,
    ) -> Result<(), AuditError>;
}

/// Summary of an [`ActionResult`] kept in the trail. Output streams are not
/// recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub success: bool,
    pub denied: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub tool: String,
    pub args: serde_json::Value,
    pub result: AuditOutcome,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
}

/// JSONL file sink for one job.
#[derive(Debug)]
pub struct JsonlAuditSink {
    job_id: String,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    /// Create `<state_dir>/<job_id>/` if needed.
    pub fn open(state_dir: &Path, job_id: &str) -> Result<Self, AuditError> {
        let dir = state_dir.join(job_id);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            job_id: job_id.to_string(),
            path: dir.join(AUDIT_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self.write_lock.lock().map_err(|_| AuditError::Poisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl AuditSink for JsonlAuditSink {
    fn record_action(
        &self,
        tool: &str,
        args: &serde_json::Value,
        result: &ActionResult,
        duration_ms: u64,
        exit_code: Option<i32>,
    ) -> Result<(), AuditError> {
        self.append(&AuditRecord {
            timestamp: Utc::now(),
            job_id: self.job_id.clone(),
            tool: tool.to_string(),
            args: args.clone(),
            result: AuditOutcome {
                success: result.success,
                denied: result.denied,
                error: result.error.clone(),
            },
            duration_ms,
            exit_code,
        })
    }

    fn record_denial(
        &self,
        tool: &str,
        args: &serde_json::Value,
        reason: &str,
    ) -> Result<(), AuditError> {
        self.append(&AuditRecord {
            timestamp: Utc::now(),
            job_id: self.job_id.clone(),
            tool: tool.to_string(),
            args: args.clone(),
            result: AuditOutcome {
                success: false,
                denied: true,
                error: Some(reason.to_string()),
            },
            duration_ms: 0,
            exit_code: None,
        })
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record_action(
        &self,
        _tool: &str,
        _args: &serde_json::Value,
        _result: &ActionResult,
        _duration_ms: u64,
        _exit_code: Option<i32>,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    fn record_denial(
        &self,
        _tool: &str,
        _args: &serde_json::Value,
        _reason: &str,
    ) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Parse an audit file back into records.
pub fn read_audit_log(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(AuditError::from))
        .collect()
}
