//! Policy file discovery and loading.

use std::path::Path;

use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::error::PolicyError;
use crate::obs;

use super::file::PolicyFile;
use super::model::{CapabilityPolicy, PolicyDefaults};

/// Policy file used in development.
pub const DEV_POLICY_FILE: &str = "capabilities.yaml";
/// Policy file required in production.
pub const PROD_POLICY_FILE: &str = "capabilities.prod.yaml";

/// Load the capability policy for one job.
///
/// Production (or `JJ_PROD_STRICT=1`) requires `capabilities.prod.yaml` in
/// `agent_dir`; its absence is fatal. Development reads `capabilities.yaml`
/// and falls back to a workspace-scoped default when the file is missing.
pub fn load_capabilities(
    config: &AgentConfig,
    agent_dir: &Path,
    workspace: &Path,
) -> Result<CapabilityPolicy, PolicyError> {
    let defaults = PolicyDefaults::from_config(config);

    let (file, source) = if config.requires_production_policy() {
        let path = agent_dir.join(PROD_POLICY_FILE);
        if !path.exists() {
            return Err(PolicyError::ProductionPolicyMissing { path });
        }
        (read_policy_file(&path)?, path.display().to_string())
    } else {
        let path = agent_dir.join(DEV_POLICY_FILE);
        if path.exists() {
            (read_policy_file(&path)?, path.display().to_string())
        } else {
            warn!(
                path = %path.display(),
                "no capabilities file found; using workspace-scoped default policy"
            );
            (PolicyFile::workspace_default(), "default".to_string())
        }
    };

    let policy = CapabilityPolicy::compile(file, workspace, &defaults)?;
    obs::emit_policy_loaded(
        &source,
        &policy.workspace().display().to_string(),
        config.is_production(),
    );
    debug!(
        allowed_paths = policy.allowed_paths().len(),
        denied_paths = policy.denied_paths().len(),
        allowed_commands = policy.allowed_commands().len(),
        allow_web = policy.network().allow_web,
        "policy compiled"
    );
    Ok(policy)
}

/// Read and parse one policy file. An empty document yields the empty policy.
pub fn read_policy_file(path: &Path) -> Result<PolicyFile, PolicyError> {
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_policy(&text, path)
}

fn parse_policy(text: &str, path: &Path) -> Result<PolicyFile, PolicyError> {
    let has_content = text
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#') && line != "---");
    if !has_content {
        return Ok(PolicyFile::default());
    }
    serde_yaml::from_str(text).map_err(|source| PolicyError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
