//! Execution backends: where an approved shell command actually runs.
//!
//! - [`direct`]   — host process under `sh -c`, own process group
//! - [`isolated`] — throwaway Podman/Docker container, workspace bind-mounted
//!
//! A job picks one backend at construction and never mixes them.

pub mod direct;
pub mod isolated;
pub(crate) mod process;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::action::ActionResult;
use crate::config::RuntimeKind;
use crate::policy::CapabilityPolicy;

pub use direct::DirectBackend;
pub use isolated::{ContainerEngine, IsolatedBackend};

/// Runs one approved command and reports a uniform result.
///
/// Implementations never return errors: spawn failures, nonzero exits and
/// timeouts are all expressed in the [`ActionResult`].
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
        dry_run: bool,
    ) -> ActionResult;
}

/// Build the backend for `kind`. Container engine detection only happens
/// for [`RuntimeKind::Sandboxed`].
pub async fn select_backend(
    kind: RuntimeKind,
    policy: Arc<CapabilityPolicy>,
    allow_network: bool,
) -> Arc<dyn ExecutionBackend> {
    match kind {
        RuntimeKind::LocalSafe => Arc::new(DirectBackend::new(policy)),
        RuntimeKind::Sandboxed => {
            Arc::new(IsolatedBackend::detect(policy).await.with_network(allow_network))
        }
    }
}

/// Quote one argument for display in a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
