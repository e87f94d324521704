use std::sync::Arc;

use crate::action::{ActionGuard, ActionRequest, ActionResult};

/// Fetches URLs within the job's domain allowlist and fetch budget.
#[derive(Debug, Clone)]
pub struct WebTool {
    guard: Arc<ActionGuard>,
}

impl WebTool {
    pub fn new(guard: Arc<ActionGuard>) -> Self {
        Self { guard }
    }

    /// On success `output` holds the redacted, truncated page.
    pub async fn fetch(&self, url: &str, dry_run: bool) -> ActionResult {
        self.guard
            .evaluate_and_execute(ActionRequest::fetch(url).with_dry_run(dry_run))
            .await
    }

    /// Successful fetches so far in this job.
    pub fn fetches_used(&self) -> u32 {
        self.guard.fetch_count()
    }
}
