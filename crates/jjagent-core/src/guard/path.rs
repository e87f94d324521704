//! Filesystem path guard.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::paths::{is_within, resolve_path};
use crate::policy::CapabilityPolicy;

use super::ActionDecision;

/// Decides whether a filesystem path may be touched.
///
/// Evaluation order, first match wins:
/// 1. resolve to a canonical absolute path (relative paths are taken from
///    the workspace root, symlinks are followed)
/// 2. under a `denied_paths` entry → deny
/// 3. matches a `deny_globs` pattern → deny
/// 4. neither the workspace root nor an `allowed_paths` entry contains the
///    path → deny (an empty allowlist leaves only the workspace)
/// 5. allow
#[derive(Debug, Clone)]
pub struct PathGuard {
    policy: Arc<CapabilityPolicy>,
}

impl PathGuard {
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self { policy }
    }

    pub fn check(&self, path: &Path) -> ActionDecision {
        self.authorize(path).map(|_| ()).into()
    }

    /// Like [`PathGuard::check`], but hands back the resolved path so the
    /// caller operates on exactly what was approved.
    pub fn authorize(&self, path: &Path) -> Result<PathBuf, String> {
        let policy = &self.policy;
        let resolved = resolve_path(path, policy.workspace())
            .map_err(|e| format!("Path denied: cannot resolve {}: {e}", path.display()))?;

        if let Some(denied) = policy
            .denied_paths()
            .iter()
            .find(|denied| is_within(&resolved, denied))
        {
            return Err(format!(
                "Path denied: {} is under denied path {}",
                resolved.display(),
                denied.display()
            ));
        }

        let as_str = resolved.to_string_lossy();
        if let Some(glob) = policy.deny_globs().iter().find(|g| g.matches(&as_str)) {
            return Err(format!(
                "Path denied: {} matches glob {}",
                resolved.display(),
                glob.source()
            ));
        }

        let permitted = is_within(&resolved, policy.workspace())
            || policy.allowed_paths().iter().any(|rule| rule.matches(&resolved));
        if !permitted {
            return Err(format!("Path not in allowed paths: {}", resolved.display()));
        }

        Ok(resolved)
    }
}
