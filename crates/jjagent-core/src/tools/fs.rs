//! Filesystem tool: write, read, patch, mkdir.

use std::sync::Arc;

use serde_json::json;

use crate::action::{ActionGuard, ActionRequest, ActionResult};

#[derive(Debug, Clone)]
pub struct FsTool {
    guard: Arc<ActionGuard>,
}

impl FsTool {
    pub fn new(guard: Arc<ActionGuard>) -> Self {
        Self { guard }
    }

    pub async fn write(&self, path: &str, content: &str, dry_run: bool) -> ActionResult {
        self.guard
            .evaluate_and_execute(ActionRequest::write(path, content).with_dry_run(dry_run))
            .await
    }

    /// On success the text is in `output.content`.
    pub async fn read(&self, path: &str) -> ActionResult {
        self.guard.evaluate_and_execute(ActionRequest::read(path)).await
    }

    pub async fn mkdir(&self, path: &str, dry_run: bool) -> ActionResult {
        self.guard
            .evaluate_and_execute(ActionRequest::mkdir(path).with_dry_run(dry_run))
            .await
    }

    /// Replace every occurrence of `old` with `new`. Both the read and the
    /// write pass through the guard.
    pub async fn patch(&self, path: &str, old: &str, new: &str, dry_run: bool) -> ActionResult {
        let read = self.read(path).await;
        if !read.success {
            return read;
        }
        let Some(output) = read.output.as_ref() else {
            return ActionResult::failure(format!("Cannot read {path}"));
        };
        if output.get("utf8").and_then(|u| u.as_bool()) == Some(false) {
            return ActionResult::failure(format!("Cannot patch {path}: file is not valid UTF-8"));
        }
        let Some(current) = output.get("content").and_then(|c| c.as_str()) else {
            return ActionResult::failure(format!("Cannot read {path}"));
        };
        let occurrences = current.matches(old).count();
        if old.is_empty() || occurrences == 0 {
            return ActionResult::failure("old_string not found in file");
        }
        let patched = current.replace(old, new);

        let mut result = self.write(path, &patched, dry_run).await;
        if let Some(output) = result.output.as_mut() {
            output["action"] = json!("patch");
            output["replacements"] = json!(occurrences);
        }
        result
    }
}
