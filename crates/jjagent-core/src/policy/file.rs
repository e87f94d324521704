//! On-disk policy schema (`capabilities.yaml`).
//!
//! These types mirror the YAML file as written by operators. They are
//! compiled into a [`super::CapabilityPolicy`] exactly once per job.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the canonical workspace root at load time.
pub const WORKSPACE_PLACEHOLDER: &str = "${workspace}";

/// Raw policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyFile {
    pub allowed_paths: Vec<String>,
    pub denied_paths: Vec<String>,
    pub deny_globs: Vec<String>,
    pub allowed_commands: Vec<String>,
    pub denied_commands: Vec<String>,
    pub network: NetworkSection,
    pub budgets: BudgetsSection,
    pub timeouts: TimeoutsSection,
    /// Top-level redaction list; takes precedence over `logging.redact_patterns`.
    pub redact_patterns: Option<Vec<String>>,
    pub logging: LoggingSection,
    pub sandbox: SandboxSettings,
}

impl PolicyFile {
    /// Policy used when no file exists: everything scoped to the workspace,
    /// web access off.
    pub fn workspace_default() -> Self {
        Self {
            allowed_paths: vec![format!("{WORKSPACE_PLACEHOLDER}/**")],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub allow_web: bool,
    pub allowed_domains: Vec<String>,
}

/// Budget overrides; unset fields fall back to environment defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetsSection {
    pub job_minutes: Option<u64>,
    pub web_dollars: Option<f64>,
    pub max_fetches_per_job: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    pub tool_seconds: Option<u64>,
    pub fetch_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub redact_patterns: Option<Vec<String>>,
}

/// Isolation properties requested from the container engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub pids_limit: Option<u32>,
    pub cpus: Option<f64>,
    pub memory: Option<String>,
    pub read_only_root: bool,
    pub no_new_privileges: bool,
    pub image: Option<String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            pids_limit: None,
            cpus: None,
            memory: None,
            read_only_root: true,
            no_new_privileges: true,
            image: None,
        }
    }
}
