//! Structured lifecycle events for guarded actions.
//!
//! - `JobSpan` RAII guard tags everything inside a job with its id
//! - `emit_*` functions log one event each at `info!`/`warn!`

use tracing::{info, warn};

/// RAII guard that enters a job-scoped span.
///
/// ```ignore
/// let _span = JobSpan::enter("job-42");
/// // every event below carries job_id = "job-42"
/// ```
pub struct JobSpan {
    _span: tracing::span::EnteredSpan,
}

impl JobSpan {
    pub fn enter(job_id: &str) -> Self {
        let span = tracing::info_span!("jj.job", job_id = %job_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_action_allowed(tool: &str, target: &str, dry_run: bool) {
    info!(event = "action.allowed", tool = %tool, target = %target, dry_run = dry_run);
}

/// Denials are logged at `warn`.
pub fn emit_action_denied(tool: &str, target: &str, reason: &str) {
    warn!(event = "action.denied", tool = %tool, target = %target, reason = %reason);
}

pub fn emit_action_finished(
    tool: &str,
    duration_ms: u64,
    success: bool,
    exit_code: Option<i32>,
    timed_out: bool,
) {
    info!(
        event = "action.finished",
        tool = %tool,
        duration_ms = duration_ms,
        success = success,
        exit_code = exit_code,
        timed_out = timed_out,
    );
}

pub fn emit_policy_loaded(source: &str, workspace: &str, production: bool) {
    info!(
        event = "policy.loaded",
        source = %source,
        workspace = %workspace,
        production = production,
    );
}

/// An audit or metrics write failed; the action result is unaffected.
pub fn emit_sink_error(sink: &str, error: &dyn std::fmt::Display) {
    warn!(event = "sink.error", sink = %sink, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_and_events_do_not_panic_without_subscriber() {
        let _span = JobSpan::enter("job-test");
        emit_action_allowed("shell.run", "ls", false);
        emit_action_denied("fs.write", "/etc/passwd", "outside workspace");
        emit_action_finished("shell.run", 3, true, Some(0), false);
        emit_sink_error("audit", &"disk full");
    }
}
