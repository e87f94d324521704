//! Host execution through `sh -c`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::action::ActionResult;
use crate::guard::PathGuard;
use crate::policy::CapabilityPolicy;

use super::process::run_with_timeout;
use super::ExecutionBackend;

/// Runs commands directly on the host, confined only by the guards and the
/// working directory check.
#[derive(Debug, Clone)]
pub struct DirectBackend {
    path_guard: PathGuard,
}

impl DirectBackend {
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self {
            path_guard: PathGuard::new(policy),
        }
    }
}

#[async_trait]
impl ExecutionBackend for DirectBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn execute(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
        dry_run: bool,
    ) -> ActionResult {
        // The backend may be driven without the orchestrator, so the working
        // directory is checked here as well.
        let cwd = match self.path_guard.authorize(cwd) {
            Ok(resolved) => resolved,
            Err(reason) => return ActionResult::denied(reason),
        };
        let cwd_display = cwd.display().to_string();

        if dry_run {
            return ActionResult {
                command: Some(command.to_string()),
                cwd: Some(cwd_display),
                ..ActionResult::dry_run()
            };
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&cwd);

        let result = match run_with_timeout(cmd, timeout).await {
            Ok(output) => {
                tracing::debug!(
                    command,
                    duration_ms = output.duration.as_millis() as u64,
                    timed_out = output.timed_out(),
                    "direct command finished"
                );
                output.into_action_result(timeout)
            }
            Err(e) => ActionResult::failure(format!("Failed to start command: {e}")),
        };

        ActionResult {
            command: Some(command.to_string()),
            cwd: Some(cwd_display),
            ..result
        }
    }
}
