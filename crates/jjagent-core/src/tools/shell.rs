use std::path::PathBuf;
use std::sync::Arc;

use crate::action::{ActionGuard, ActionRequest, ActionResult};

/// Runs shell commands on the job's backend.
#[derive(Debug, Clone)]
pub struct ShellTool {
    guard: Arc<ActionGuard>,
}

impl ShellTool {
    pub fn new(guard: Arc<ActionGuard>) -> Self {
        Self { guard }
    }

    /// `timeout_secs` falls back to the policy's `tool_seconds`.
    pub async fn run(
        &self,
        command: &str,
        cwd: Option<PathBuf>,
        dry_run: bool,
        timeout_secs: Option<u64>,
    ) -> ActionResult {
        let mut req = ActionRequest::shell(command).with_dry_run(dry_run);
        if let Some(cwd) = cwd {
            req = req.with_cwd(cwd);
        }
        if let Some(secs) = timeout_secs {
            req = req.with_timeout(secs);
        }
        self.guard.evaluate_and_execute(req).await
    }
}
