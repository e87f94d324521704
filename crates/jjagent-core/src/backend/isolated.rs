//! Container execution through Podman or Docker.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::action::ActionResult;
use crate::guard::PathGuard;
use crate::policy::CapabilityPolicy;

use super::process::{run_with_timeout, ProcessOutput};
use super::{shell_join, ExecutionBackend};

pub const DEFAULT_IMAGE: &str = "python:3.11-slim";

/// Mount point of the working directory inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Slack on the host side for container start-up and teardown.
pub const ENGINE_OVERHEAD: Duration = Duration::from_secs(10);

const DETECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace between SIGTERM and SIGKILL for the in-container `timeout`.
const KILL_AFTER: Duration = Duration::from_secs(2);

/// Exit status of coreutils `timeout` when the limit fired.
const TIMEOUT_EXIT: i32 = 124;

/// Exit status of `timeout -k` after escalating to SIGKILL.
const TIMEOUT_KILLED_EXIT: i32 = 137;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEngine {
    Docker,
    Podman,
}

impl ContainerEngine {
    pub fn binary(&self) -> &'static str {
        match self {
            ContainerEngine::Docker => "docker",
            ContainerEngine::Podman => "podman",
        }
    }

    /// Prefer Podman when `podman --version` answers; otherwise Docker.
    pub async fn detect() -> Self {
        let mut version = Command::new("podman");
        version.arg("--version");
        match run_with_timeout(version, DETECT_TIMEOUT).await {
            Ok(out) if out.status.is_some_and(|s| s.success()) => ContainerEngine::Podman,
            _ => ContainerEngine::Docker,
        }
    }
}

impl fmt::Display for ContainerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Runs each command in a fresh, throwaway container that sees only the
/// working directory.
#[derive(Debug, Clone)]
pub struct IsolatedBackend {
    engine: ContainerEngine,
    policy: Arc<CapabilityPolicy>,
    path_guard: PathGuard,
    network_enabled: bool,
}

impl IsolatedBackend {
    /// Probe for an engine, then build the backend.
    pub async fn detect(policy: Arc<CapabilityPolicy>) -> Self {
        let engine = ContainerEngine::detect().await;
        tracing::info!(engine = %engine, "container engine selected");
        Self::with_engine(engine, policy)
    }

    pub fn with_engine(engine: ContainerEngine, policy: Arc<CapabilityPolicy>) -> Self {
        let network_enabled = policy.network().allow_web;
        Self {
            engine,
            path_guard: PathGuard::new(policy.clone()),
            policy,
            network_enabled,
        }
    }

    /// Grant or withhold container networking, normally the job-level web
    /// switch combined with the policy's.
    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled && self.policy.network().allow_web;
        self
    }

    pub fn engine(&self) -> ContainerEngine {
        self.engine
    }

    /// Full engine argv for one command. `cwd` must already be validated.
    ///
    /// Fails when `cwd` cannot be expressed as a `--mount` source.
    pub fn build_invocation(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<Vec<String>, String> {
        let mount = mount_spec(cwd)?;
        let sandbox = self.policy.sandbox();
        let mut argv: Vec<String> = vec![
            self.engine.binary().to_string(),
            "run".to_string(),
            "--rm".to_string(),
        ];

        if let Some(pids) = sandbox.pids_limit {
            argv.extend(["--pids-limit".to_string(), pids.to_string()]);
        }
        if let Some(cpus) = sandbox.cpus {
            argv.extend(["--cpus".to_string(), cpus.to_string()]);
        }
        if let Some(memory) = &sandbox.memory {
            argv.extend(["--memory".to_string(), memory.clone()]);
        }
        if sandbox.read_only_root {
            argv.push("--read-only".to_string());
        }
        if sandbox.no_new_privileges {
            argv.push("--security-opt=no-new-privileges:true".to_string());
        }
        if !self.network_enabled {
            argv.push("--network=none".to_string());
        }

        argv.extend([
            "--mount".to_string(),
            mount,
            "--workdir".to_string(),
            CONTAINER_WORKDIR.to_string(),
            sandbox.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            "timeout".to_string(),
            "-k".to_string(),
            KILL_AFTER.as_secs().to_string(),
            timeout.as_secs().max(1).to_string(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        Ok(argv)
    }
}

/// `--mount` is a comma-separated key=value list, and engines disagree on
/// quoting, so a source containing a comma is refused outright.
fn mount_spec(cwd: &Path) -> Result<String, String> {
    let Some(source) = cwd.to_str() else {
        return Err(format!("Working directory is not valid UTF-8: {}", cwd.display()));
    };
    if source.contains(',') {
        return Err(format!(
            "Working directory cannot be mounted (contains ','): {source}"
        ));
    }
    Ok(format!("type=bind,source={source},target={CONTAINER_WORKDIR}"))
}

/// Map the engine's exit into the uniform result. The in-container
/// `timeout` normally fires before the host-side limit, so its exit codes
/// are reported the same way a host timeout is.
fn container_result(output: ProcessOutput, timeout: Duration) -> ActionResult {
    let limit_fired = match output.status.and_then(|s| s.code()) {
        Some(TIMEOUT_EXIT) => true,
        Some(TIMEOUT_KILLED_EXIT) => output.duration >= timeout,
        _ => false,
    };
    if !limit_fired {
        return output.into_action_result(timeout);
    }
    ActionResult {
        stdout: Some(output.stdout),
        stderr: Some(output.stderr),
        ..ActionResult::timed_out(timeout.as_secs())
    }
}

#[async_trait]
impl ExecutionBackend for IsolatedBackend {
    fn name(&self) -> &'static str {
        "isolated"
    }

    async fn execute(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
        dry_run: bool,
    ) -> ActionResult {
        let cwd = match self.path_guard.authorize(cwd) {
            Ok(resolved) => resolved,
            Err(reason) => {
                return ActionResult {
                    sandboxed: true,
                    ..ActionResult::denied(reason)
                }
            }
        };
        let command_field = Some(command.to_string());
        let cwd_field = Some(cwd.display().to_string());
        let argv = match self.build_invocation(command, &cwd, timeout) {
            Ok(argv) => argv,
            Err(reason) => {
                return ActionResult {
                    sandboxed: true,
                    command: command_field,
                    cwd: cwd_field,
                    ..ActionResult::failure(reason)
                }
            }
        };

        if dry_run {
            return ActionResult {
                sandboxed: true,
                command: command_field,
                cwd: cwd_field,
                container_command: Some(shell_join(&argv)),
                ..ActionResult::dry_run()
            };
        }

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);

        let host_limit = timeout + KILL_AFTER + ENGINE_OVERHEAD;
        let result = match run_with_timeout(cmd, host_limit).await {
            Ok(output) => container_result(output, timeout),
            Err(e) if e.kind() == io::ErrorKind::NotFound => ActionResult::failure(format!(
                "{} not found. Install Docker or Podman.",
                self.engine
            )),
            Err(e) => ActionResult::failure(format!("Failed to start {}: {e}", self.engine)),
        };

        ActionResult {
            sandboxed: true,
            command: command_field,
            cwd: cwd_field,
            ..result
        }
    }
}
