//! The orchestrator: route each request to its guard, then execute it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::audit::{AuditSink, NullAuditSink};
use crate::backend::{select_backend, ExecutionBackend};
use crate::config::AgentConfig;
use crate::error::{AuditError, Result};
use crate::fetch::Fetcher;
use crate::guard::{ActionDecision, CommandGuard, DomainGuard, PathGuard};
use crate::metrics::{GuardMetrics, MetricsSink};
use crate::obs;
use crate::policy::CapabilityPolicy;

use super::request::{ActionKind, ActionRequest};
use super::result::ActionResult;

/// What a guard approved, carried into execution so the executor acts on
/// exactly the validated target.
enum Approval {
    Path(PathBuf),
    Shell { cwd: PathBuf },
    Fetch(Url),
}

/// Sole entry point for tool wrappers.
///
/// Each request goes through its guard first. A denial short-circuits: the
/// backend, filesystem or network is never touched. One `ActionGuard` serves
/// one job; its fetch budget is not shared.
pub struct ActionGuard {
    job_id: String,
    policy: Arc<CapabilityPolicy>,
    paths: PathGuard,
    commands: CommandGuard,
    domains: DomainGuard,
    backend: Arc<dyn ExecutionBackend>,
    fetcher: Fetcher,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsSink>,
}

impl ActionGuard {
    pub fn new(
        policy: Arc<CapabilityPolicy>,
        backend: Arc<dyn ExecutionBackend>,
        job_allow_web: bool,
        version: &str,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(&policy, version)?;
        Ok(Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            paths: PathGuard::new(policy.clone()),
            commands: CommandGuard::new(policy.clone()),
            domains: DomainGuard::new(policy.clone(), job_allow_web),
            policy,
            backend,
            fetcher,
            audit: Arc::new(NullAuditSink),
            metrics: Arc::new(GuardMetrics::new()),
        })
    }

    /// Build the guard for one job, selecting the backend from
    /// `config.runtime`.
    pub async fn for_job(config: &AgentConfig, policy: Arc<CapabilityPolicy>) -> Result<Self> {
        let backend = select_backend(config.runtime, policy.clone(), config.allow_web).await;
        Self::new(policy, backend, config.allow_web, &config.version)
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Successful fetches so far in this job.
    pub fn fetch_count(&self) -> u32 {
        self.domains.fetch_count()
    }

    /// Run the guards without executing anything.
    pub fn evaluate(&self, req: &ActionRequest) -> ActionDecision {
        self.approve(req).map(|_| ()).into()
    }

    /// Guard, then execute. Every outcome, including denials and internal
    /// failures, comes back as an [`ActionResult`].
    pub async fn evaluate_and_execute(&self, req: ActionRequest) -> ActionResult {
        let span = tracing::info_span!(
            "jj.action",
            job_id = %self.job_id,
            tool = req.kind.tool_name(),
        );
        self.guard_and_run(req).instrument(span).await
    }

    async fn guard_and_run(&self, req: ActionRequest) -> ActionResult {
        let tool = req.kind.tool_name();
        let redactor = self.policy.redactor();
        let target = redactor.redact(&req.target);
        let mut args = req.audit_args();
        args["target"] = Value::String(target.clone());

        let approval = match self.approve(&req) {
            Ok(approval) => approval,
            Err(reason) => {
                let reason = redactor.redact(&reason);
                obs::emit_action_denied(tool, &target, &reason);
                self.best_effort("metrics", || {
                    self.metrics.record_denial(tool);
                    Ok(())
                });
                self.best_effort("audit", || self.audit.record_denial(tool, &args, &reason));
                return ActionResult::denied(reason);
            }
        };

        obs::emit_action_allowed(tool, &target, req.dry_run);
        let start = Instant::now();
        let result = self.execute(&req, approval).await.redact(redactor);
        let duration_ms = start.elapsed().as_millis() as u64;

        obs::emit_action_finished(
            tool,
            duration_ms,
            result.success,
            result.returncode,
            result.timed_out,
        );
        self.best_effort("metrics", || {
            self.metrics.record_tool_call(tool, duration_ms, result.success);
            Ok(())
        });
        self.best_effort("audit", || {
            self.audit
                .record_action(tool, &args, &result, duration_ms, result.returncode)
        });
        result
    }

    fn approve(&self, req: &ActionRequest) -> std::result::Result<Approval, String> {
        match req.kind {
            ActionKind::PathRead | ActionKind::PathWrite | ActionKind::MakeDir => self
                .paths
                .authorize(Path::new(&req.target))
                .map(Approval::Path),
            ActionKind::ShellCommand => {
                if let ActionDecision::Denied { reason } = self.commands.check(&req.target) {
                    return Err(reason);
                }
                let cwd = req
                    .declared_cwd
                    .as_deref()
                    .unwrap_or_else(|| self.policy.workspace());
                self.paths
                    .authorize(cwd)
                    .map(|cwd| Approval::Shell { cwd })
            }
            ActionKind::FetchUrl => self.domains.authorize(&req.target).map(Approval::Fetch),
        }
    }

    async fn execute(&self, req: &ActionRequest, approval: Approval) -> ActionResult {
        match approval {
            Approval::Path(path) => match req.kind {
                ActionKind::PathRead => read_file(&path, req.dry_run).await,
                ActionKind::MakeDir => make_dir(&path, req.dry_run).await,
                _ => match req.content.as_deref() {
                    Some(content) => write_file(&path, content, req.dry_run).await,
                    None => ActionResult::failure("PathWrite request carries no content"),
                },
            },
            Approval::Shell { cwd } => {
                let secs = req
                    .timeout_secs
                    .unwrap_or(self.policy.timeouts().tool_seconds);
                self.backend
                    .execute(&req.target, &cwd, Duration::from_secs(secs), req.dry_run)
                    .await
            }
            Approval::Fetch(url) => self.fetch(url, req.dry_run).await,
        }
    }

    async fn fetch(&self, url: Url, dry_run: bool) -> ActionResult {
        if dry_run {
            return ActionResult {
                output: Some(json!({ "url": url.as_str(), "action": "fetch" })),
                ..ActionResult::dry_run()
            };
        }
        match self.fetcher.fetch(url).await {
            Ok(page) => {
                let used = self.domains.record_fetch();
                self.best_effort("metrics", || {
                    self.metrics.record_fetch();
                    Ok(())
                });
                tracing::debug!(status = page.status, fetches = used, "fetch complete");
                ActionResult {
                    success: true,
                    output: serde_json::to_value(&page).ok(),
                    ..ActionResult::default()
                }
            }
            Err(e) => ActionResult::failure(e.to_string()),
        }
    }

    /// Run a sink call; errors and panics are logged and dropped.
    fn best_effort<F>(&self, sink: &str, f: F)
    where
        F: FnOnce() -> std::result::Result<(), AuditError>,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => obs::emit_sink_error(sink, &e),
            Err(_) => obs::emit_sink_error(sink, &"sink panicked"),
        }
    }
}

impl std::fmt::Debug for ActionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionGuard")
            .field("job_id", &self.job_id)
            .field("workspace", &self.policy.workspace())
            .field("backend", &self.backend.name())
            .field("fetches", &self.domains.fetch_count())
            .finish()
    }
}

async fn read_file(path: &Path, dry_run: bool) -> ActionResult {
    let shown = path.display().to_string();
    if dry_run {
        return ActionResult {
            output: Some(json!({ "path": shown, "action": "read" })),
            ..ActionResult::dry_run()
        };
    }
    match tokio::fs::read(path).await {
        // Lossy content is for display; `utf8` tells callers whether it is
        // safe to write back.
        Ok(bytes) => ActionResult {
            success: true,
            output: Some(json!({
                "path": shown,
                "bytes": bytes.len(),
                "utf8": std::str::from_utf8(&bytes).is_ok(),
                "content": String::from_utf8_lossy(&bytes),
            })),
            ..ActionResult::default()
        },
        Err(e) => ActionResult::failure(format!("Cannot read {shown}: {e}")),
    }
}

async fn write_file(path: &Path, content: &str, dry_run: bool) -> ActionResult {
    let shown = path.display().to_string();
    let previous = tokio::fs::metadata(path).await.ok().map(|m| m.len());
    let action = if previous.is_some() { "modify" } else { "create" };
    let output = json!({
        "path": shown,
        "action": action,
        "bytes": content.len(),
        "previous_bytes": previous,
    });

    if dry_run {
        return ActionResult {
            output: Some(output),
            ..ActionResult::dry_run()
        };
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return ActionResult::failure(format!("Cannot create {}: {e}", parent.display()));
        }
    }
    match tokio::fs::write(path, content).await {
        Ok(()) => ActionResult {
            success: true,
            output: Some(output),
            ..ActionResult::default()
        },
        Err(e) => ActionResult::failure(format!("Cannot write {shown}: {e}")),
    }
}

async fn make_dir(path: &Path, dry_run: bool) -> ActionResult {
    let shown = path.display().to_string();
    let exists = tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir());
    let output = json!({ "path": shown, "action": "mkdir", "exists": exists });
    if dry_run {
        return ActionResult {
            output: Some(output),
            ..ActionResult::dry_run()
        };
    }
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => ActionResult {
            success: true,
            output: Some(output),
            ..ActionResult::default()
        },
        Err(e) => ActionResult::failure(format!("Cannot create {shown}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DirectBackend;
    use crate::policy::{PolicyDefaults, PolicyFile};

    fn guard(file: PolicyFile) -> (tempfile::TempDir, PathBuf, ActionGuard) {
        let ws = tempfile::tempdir().unwrap();
        let policy =
            Arc::new(CapabilityPolicy::compile(file, ws.path(), &PolicyDefaults::default()).unwrap());
        let root = policy.workspace().to_path_buf();
        let backend = Arc::new(DirectBackend::new(policy.clone()));
        let g = ActionGuard::new(policy, backend, false, "test").unwrap();
        (ws, root, g)
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_guard() {
        let (_ws, root, g) = guard(PolicyFile::workspace_default());
        let w = g
            .evaluate_and_execute(ActionRequest::write("notes/a.txt", "hello"))
            .await;
        assert!(w.success, "{w:?}");
        assert_eq!(w.output.as_ref().unwrap()["action"], "create");
        assert_eq!(std::fs::read_to_string(root.join("notes/a.txt")).unwrap(), "hello");

        let r = g.evaluate_and_execute(ActionRequest::read("notes/a.txt")).await;
        assert_eq!(r.output.unwrap()["content"], "hello");
    }

    #[tokio::test]
    async fn write_without_content_fails_without_mutation() {
        let (_ws, root, g) = guard(PolicyFile::workspace_default());
        let r = g
            .evaluate_and_execute(ActionRequest::new(ActionKind::PathWrite, "x.txt"))
            .await;
        assert!(!r.success && !r.denied);
        assert!(!root.join("x.txt").exists());
    }

    #[tokio::test]
    async fn mkdir_dry_run_reports_without_creating() {
        let (_ws, root, g) = guard(PolicyFile::workspace_default());
        let r = g
            .evaluate_and_execute(ActionRequest::mkdir("a/b").with_dry_run(true))
            .await;
        assert!(r.dry_run && r.success);
        assert!(!root.join("a").exists());

        let r = g.evaluate_and_execute(ActionRequest::mkdir("a/b")).await;
        assert!(r.success);
        assert!(root.join("a/b").is_dir());
    }

    #[test]
    fn evaluate_routes_shell_cwd_through_path_guard() {
        let (_ws, _root, g) = guard(PolicyFile::workspace_default());
        let d = g.evaluate(&ActionRequest::shell("ls").with_cwd("/"));
        assert!(!d.is_allowed());
        assert!(g.evaluate(&ActionRequest::shell("ls")).is_allowed());
    }
}
