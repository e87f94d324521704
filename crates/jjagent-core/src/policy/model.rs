//! Compiled, immutable capability policy.

use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::AgentConfig;
use crate::error::PolicyError;
use crate::paths::{is_within, resolve_path};
use crate::redact::Redactor;

use super::file::{PolicyFile, SandboxSettings, WORKSPACE_PLACEHOLDER};

/// Secret patterns applied when a policy does not list its own.
pub const DEFAULT_REDACT_PATTERNS: &[&str] = &[
    r"sk-[A-Za-z0-9]{20,}",
    r"ghp_[A-Za-z0-9]{36}",
    r"xoxb-[A-Za-z0-9-]+",
];

const DEFAULT_WEB_DOLLARS: f64 = 2.0;
const DEFAULT_FETCH_SECONDS: u64 = 12;

/// Values a policy file may omit, taken from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDefaults {
    pub job_minutes: u64,
    pub tool_seconds: u64,
    pub max_fetches_per_job: u32,
    pub home: PathBuf,
}

impl PolicyDefaults {
    pub fn from_config(config: &AgentConfig) -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self {
            job_minutes: config.max_job_minutes,
            tool_seconds: config.max_tool_seconds,
            max_fetches_per_job: config.max_fetches_per_job,
            home,
        }
    }
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// One `allowed_paths` entry: a containment root, a glob, or both.
#[derive(Debug, Clone)]
pub struct PathRule {
    source: String,
    root: Option<PathBuf>,
    glob: Option<Pattern>,
}

impl PathRule {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &Path) -> bool {
        if let Some(root) = &self.root {
            if is_within(path, root) {
                return true;
            }
        }
        match (&self.glob, path.to_str()) {
            (Some(glob), Some(s)) => glob.matches(s),
            _ => false,
        }
    }
}

/// One `deny_globs` entry, matched literally and "anywhere in the tree".
#[derive(Debug, Clone)]
pub struct DenyGlob {
    source: String,
    literal: Pattern,
    anywhere: Option<Pattern>,
}

impl DenyGlob {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        self.literal.matches(path)
            || self.anywhere.as_ref().is_some_and(|p| p.matches(path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkPolicy {
    pub allow_web: bool,
    /// Lower-cased domain suffixes.
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budgets {
    pub job_minutes: u64,
    pub web_dollars: f64,
    pub max_fetches_per_job: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeouts {
    pub tool_seconds: u64,
    pub fetch_seconds: u64,
}

/// The declarative ruleset governing one job. Never mutated after
/// [`CapabilityPolicy::compile`]; share it by `Arc`.
#[derive(Debug, Clone)]
pub struct CapabilityPolicy {
    workspace: PathBuf,
    allowed_paths: Vec<PathRule>,
    denied_paths: Vec<PathBuf>,
    deny_globs: Vec<DenyGlob>,
    allowed_commands: Vec<Regex>,
    denied_commands: Vec<String>,
    network: NetworkPolicy,
    budgets: Budgets,
    timeouts: Timeouts,
    redactor: Redactor,
    sandbox: SandboxSettings,
}

impl CapabilityPolicy {
    /// Expand placeholders, resolve paths and compile every matcher.
    ///
    /// The workspace must exist; it is canonicalized and fixed for the
    /// policy's lifetime.
    pub fn compile(
        file: PolicyFile,
        workspace: &Path,
        defaults: &PolicyDefaults,
    ) -> Result<Self, PolicyError> {
        let workspace =
            std::fs::canonicalize(workspace).map_err(|source| PolicyError::Workspace {
                path: workspace.to_path_buf(),
                source,
            })?;
        let expander = Expander {
            workspace: workspace.to_string_lossy().into_owned(),
            home: defaults.home.to_string_lossy().into_owned(),
        };

        let allowed_paths = file
            .allowed_paths
            .iter()
            .map(|raw| compile_path_rule(raw, &expander, &workspace))
            .collect::<Result<Vec<_>, _>>()?;

        let denied_paths = file
            .denied_paths
            .iter()
            .map(|raw| {
                let expanded = expander.expand(raw);
                let base = expanded.strip_suffix("/**").unwrap_or(&expanded);
                resolve_path(Path::new(base), &workspace).map_err(|source| {
                    PolicyError::UnresolvablePath {
                        field: "denied_paths",
                        pattern: raw.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let deny_globs = file
            .deny_globs
            .iter()
            .map(|raw| compile_deny_glob(raw, &expander))
            .collect::<Result<Vec<_>, _>>()?;

        let allowed_commands = file
            .allowed_commands
            .iter()
            .map(|raw| {
                RegexBuilder::new(&format!("^(?:{raw})"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| PolicyError::InvalidRegex {
                        field: "allowed_commands",
                        pattern: raw.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let denied_commands = file
            .denied_commands
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();

        let allowed_domains = file
            .network
            .allowed_domains
            .iter()
            .map(|d| normalize_domain(d))
            .filter(|d| !d.is_empty())
            .collect();

        let redact_sources: Vec<String> = match (file.redact_patterns, file.logging.redact_patterns)
        {
            (Some(top), _) => top,
            (None, Some(nested)) => nested,
            (None, None) => DEFAULT_REDACT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        };
        let redact_patterns = redact_sources
            .iter()
            .map(|raw| {
                Regex::new(raw).map_err(|source| PolicyError::InvalidRegex {
                    field: "redact_patterns",
                    pattern: raw.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            workspace,
            allowed_paths,
            denied_paths,
            deny_globs,
            allowed_commands,
            denied_commands,
            network: NetworkPolicy {
                allow_web: file.network.allow_web,
                allowed_domains,
            },
            budgets: Budgets {
                job_minutes: file.budgets.job_minutes.unwrap_or(defaults.job_minutes),
                web_dollars: file.budgets.web_dollars.unwrap_or(DEFAULT_WEB_DOLLARS),
                max_fetches_per_job: file
                    .budgets
                    .max_fetches_per_job
                    .unwrap_or(defaults.max_fetches_per_job),
            },
            timeouts: Timeouts {
                tool_seconds: file.timeouts.tool_seconds.unwrap_or(defaults.tool_seconds),
                fetch_seconds: file.timeouts.fetch_seconds.unwrap_or(DEFAULT_FETCH_SECONDS),
            },
            redactor: Redactor::new(redact_patterns),
            sandbox: file.sandbox,
        })
    }

    /// Canonical workspace root, fixed for the job.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn allowed_paths(&self) -> &[PathRule] {
        &self.allowed_paths
    }

    pub fn denied_paths(&self) -> &[PathBuf] {
        &self.denied_paths
    }

    pub fn deny_globs(&self) -> &[DenyGlob] {
        &self.deny_globs
    }

    pub fn allowed_commands(&self) -> &[Regex] {
        &self.allowed_commands
    }

    pub fn denied_commands(&self) -> &[String] {
        &self.denied_commands
    }

    pub fn network(&self) -> &NetworkPolicy {
        &self.network
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn sandbox(&self) -> &SandboxSettings {
        &self.sandbox
    }

    /// Serializable overview for operators.
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            workspace: self.workspace.clone(),
            allowed_paths: self.allowed_paths.iter().map(|r| r.source.clone()).collect(),
            denied_paths: self.denied_paths.clone(),
            deny_globs: self.deny_globs.iter().map(|g| g.source.clone()).collect(),
            allowed_commands: self
                .allowed_commands
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            denied_commands: self.denied_commands.clone(),
            network: self.network.clone(),
            budgets: self.budgets.clone(),
            timeouts: self.timeouts.clone(),
            redact_patterns: self.redactor.patterns().map(str::to_string).collect(),
            sandbox: self.sandbox.clone(),
        }
    }
}

/// Effective policy as reported by `jj-agent policy`.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub workspace: PathBuf,
    pub allowed_paths: Vec<String>,
    pub denied_paths: Vec<PathBuf>,
    pub deny_globs: Vec<String>,
    pub allowed_commands: Vec<String>,
    pub denied_commands: Vec<String>,
    pub network: NetworkPolicy,
    pub budgets: Budgets,
    pub timeouts: Timeouts,
    pub redact_patterns: Vec<String>,
    pub sandbox: SandboxSettings,
}

struct Expander {
    workspace: String,
    home: String,
}

impl Expander {
    fn expand(&self, raw: &str) -> String {
        let replaced = raw.replace(WORKSPACE_PLACEHOLDER, &self.workspace);
        if replaced == "~" {
            self.home.clone()
        } else if let Some(rest) = replaced.strip_prefix("~/") {
            format!("{}/{}", self.home.trim_end_matches('/'), rest)
        } else {
            replaced
        }
    }
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(|c| matches!(c, '*' | '?' | '['))
}

fn compile_glob(field: &'static str, raw: &str, pattern: &str) -> Result<Pattern, PolicyError> {
    Pattern::new(pattern).map_err(|e| PolicyError::InvalidGlob {
        field,
        pattern: raw.to_string(),
        reason: e.msg.to_string(),
    })
}

fn compile_path_rule(
    raw: &str,
    expander: &Expander,
    workspace: &Path,
) -> Result<PathRule, PolicyError> {
    let expanded = expander.expand(raw);
    let base = expanded.strip_suffix("/**").unwrap_or(&expanded);

    let root = if has_glob_meta(base) {
        None
    } else {
        Some(
            resolve_path(Path::new(base), workspace).map_err(|source| {
                PolicyError::UnresolvablePath {
                    field: "allowed_paths",
                    pattern: raw.to_string(),
                    source,
                }
            })?,
        )
    };

    let glob = if root.is_none() {
        Some(compile_glob("allowed_paths", raw, &expanded)?)
    } else {
        None
    };

    Ok(PathRule {
        source: raw.to_string(),
        root,
        glob,
    })
}

fn compile_deny_glob(raw: &str, expander: &Expander) -> Result<DenyGlob, PolicyError> {
    let expanded = expander.expand(raw);
    let literal = compile_glob("deny_globs", raw, &expanded)?;
    let anywhere = if expanded.starts_with("**/") || expanded.starts_with('/') {
        None
    } else {
        Pattern::new(&format!("**/{expanded}")).ok()
    };
    Ok(DenyGlob {
        source: raw.to_string(),
        literal,
        anywhere,
    })
}

fn normalize_domain(raw: &str) -> String {
    let d = raw.trim().to_ascii_lowercase();
    let d = d.strip_prefix("*.").unwrap_or(&d);
    let d = d.strip_prefix('.').unwrap_or(d);
    d.trim_end_matches('.').to_string()
}
