//! Uniform action outcome, identical across backends.

use serde::{Deserialize, Serialize};

use crate::redact::Redactor;

/// Coarse classification of an [`ActionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// A guard rejected the request. Never retried by the guard layer.
    PolicyViolation,
    /// The action ran (or tried to) and failed: nonzero exit, timeout,
    /// missing engine, I/O error.
    ExecutionFailure,
}

/// Result of one guarded action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub denied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub dry_run: bool,
    pub sandboxed: bool,
    #[serde(default)]
    pub timed_out: bool,
    /// Command that ran, or would run under dry-run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Full engine invocation for isolated dry-runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_command: Option<String>,
    /// Kind-specific details (write action, fetch status, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl ActionResult {
    /// A guard rejected the request.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            denied: true,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// The action was attempted and failed.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The action exceeded its time limit and was terminated.
    pub fn timed_out(timeout_secs: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(format!("Command timed out after {timeout_secs}s"))
        }
    }

    /// Preview of an approved action that was not performed.
    pub fn dry_run() -> Self {
        Self {
            success: true,
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.success {
            Outcome::Succeeded
        } else if self.denied {
            Outcome::PolicyViolation
        } else {
            Outcome::ExecutionFailure
        }
    }

    /// Apply secret redaction to every text field that leaves the guard.
    pub fn redact(mut self, redactor: &Redactor) -> Self {
        if redactor.is_empty() {
            return self;
        }
        for field in [&mut self.stdout, &mut self.stderr, &mut self.error] {
            if let Some(text) = field.as_mut() {
                *text = redactor.redact(text);
            }
        }
        self
    }
}
