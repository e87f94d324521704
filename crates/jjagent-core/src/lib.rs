//! JJ agent capability guard.
//!
//! Every side effect an agent wants (touch a path, run a command, fetch a
//! URL) is expressed as an [`ActionRequest`], checked by the guard for its
//! kind against a [`CapabilityPolicy`], and only then executed on the
//! selected [`ExecutionBackend`], the host filesystem or the HTTP fetcher.
//!
//! ```ignore
//! let config = AgentConfig::from_env();
//! let policy = Arc::new(load_capabilities(&config, agent_dir, workspace)?);
//! let guard = ActionGuard::for_job(&config, policy).await?;
//! let result = guard.evaluate_and_execute(ActionRequest::shell("cargo test")).await;
//! ```

pub mod action;
pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod metrics;
pub mod obs;
pub mod paths;
pub mod policy;
pub mod redact;
pub mod telemetry;
pub mod tools;

pub use action::{ActionGuard, ActionKind, ActionRequest, ActionResult, Outcome};
pub use audit::{AuditRecord, AuditSink, JsonlAuditSink, NullAuditSink};
pub use backend::{
    select_backend, ContainerEngine, DirectBackend, ExecutionBackend, IsolatedBackend,
};
pub use config::{AgentConfig, Environment, RuntimeKind};
pub use error::{AuditError, FetchError, GuardError, PolicyError, Result};
pub use fetch::{FetchedPage, Fetcher};
pub use guard::{ActionDecision, CommandGuard, DomainGuard, PathGuard};
pub use metrics::{GuardMetrics, MetricsSink, MetricsSnapshot};
pub use policy::{load_capabilities, CapabilityPolicy, PolicyDefaults, PolicyFile};
pub use redact::Redactor;
pub use tools::{FsTool, GitTool, ShellTool, WebTool};
