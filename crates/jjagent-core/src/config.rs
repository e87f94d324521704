//! Job-level agent configuration read from the environment.
//!
//! | Variable                 | Default       | Meaning                                  |
//! |--------------------------|---------------|------------------------------------------|
//! | `JJ_ENV`                 | `development` | `production` enables the strict posture  |
//! | `JJ_PROD_STRICT`         | `0`           | `1` requires the production policy file  |
//! | `JJ_MAX_TOOL_SECONDS`    | `180`         | default per-command timeout              |
//! | `JJ_MAX_JOB_MINUTES`     | `20`          | informational job ceiling                |
//! | `JJ_MAX_FETCHES_PER_JOB` | `50`          | fetch budget when the policy omits one   |
//! | `JJ_ALLOW_WEB`           | see below     | job-level web switch                     |
//! | `JJ_RUNTIME`             | `localsafe`   | `localsafe` or `sandboxed`               |
//!
//! `JJ_ALLOW_WEB` must be `1` in production; development leaves the job-level
//! switch on and relies on the policy's `network.allow_web`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Deployment posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

/// Which execution backend a job uses. Chosen once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Host execution with allowlists.
    LocalSafe,
    /// Container-isolated execution.
    Sandboxed,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::LocalSafe => write!(f, "localsafe"),
            RuntimeKind::Sandboxed => write!(f, "sandboxed"),
        }
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "localsafe" | "local" | "direct" => Ok(RuntimeKind::LocalSafe),
            "sandboxed" | "sandbox" | "isolated" => Ok(RuntimeKind::Sandboxed),
            other => Err(format!("unknown runtime '{other}'")),
        }
    }
}

/// Environment-derived settings for one agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub env: Environment,
    pub prod_strict: bool,
    pub version: String,
    pub max_tool_seconds: u64,
    pub max_job_minutes: u64,
    pub max_fetches_per_job: u32,
    pub allow_web: bool,
    pub runtime: RuntimeKind,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            env: Environment::Development,
            prod_strict: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_tool_seconds: 180,
            max_job_minutes: 20,
            max_fetches_per_job: 50,
            allow_web: true,
            runtime: RuntimeKind::LocalSafe,
        }
    }
}

impl AgentConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let env = match lookup("JJ_ENV").map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "production" => Environment::Production,
            _ => Environment::Development,
        };
        let flag = |key: &str| lookup(key).map(|v| v.trim() == "1").unwrap_or(false);

        let allow_web = match env {
            Environment::Production => flag("JJ_ALLOW_WEB"),
            Environment::Development => true,
        };

        let runtime = match lookup("JJ_RUNTIME") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(error = %err, "falling back to localsafe runtime");
                RuntimeKind::LocalSafe
            }),
            None => defaults.runtime,
        };

        Self {
            env,
            prod_strict: flag("JJ_PROD_STRICT"),
            version: lookup("JJ_VERSION").unwrap_or(defaults.version),
            max_tool_seconds: parse_or(&lookup, "JJ_MAX_TOOL_SECONDS", defaults.max_tool_seconds),
            max_job_minutes: parse_or(&lookup, "JJ_MAX_JOB_MINUTES", defaults.max_job_minutes),
            max_fetches_per_job: parse_or(
                &lookup,
                "JJ_MAX_FETCHES_PER_JOB",
                defaults.max_fetches_per_job,
            ),
            allow_web,
            runtime,
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == Environment::Production
    }

    /// Whether a missing production policy file must abort start-up.
    pub fn requires_production_policy(&self) -> bool {
        self.is_production() || self.prod_strict
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparsable numeric setting");
            default
        }),
        None => default,
    }
}
