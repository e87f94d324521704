//! `jj-agent`: run single guarded actions from the command line.
//!
//! ## Commands
//!
//! - `check-path`, `check-command`, `check-url`: evaluate without executing
//! - `run`, `write`, `read`, `fetch`: evaluate and execute
//! - `policy`: print the effective capability policy
//!
//! Results are printed to stdout as JSON. Exit status is 0 on success, 1 on
//! an execution failure and 2 on a policy denial.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{warn, Level};

use jjagent_core::obs::JobSpan;
use jjagent_core::telemetry::init_tracing;
use jjagent_core::{
    load_capabilities, ActionDecision, ActionGuard, ActionRequest, ActionResult, AgentConfig,
    AuditSink, CapabilityPolicy, GuardMetrics, JsonlAuditSink, NullAuditSink, Outcome,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_DENIED: u8 = 2;

#[derive(Parser)]
#[command(name = "jj-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Capability-guarded actions for the JJ agent", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workspace root all actions are scoped to
    #[arg(long, global = true, env = "JJ_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Directory holding capabilities.yaml / capabilities.prod.yaml
    #[arg(long, global = true, env = "JJ_AGENT_DIR", default_value = ".")]
    agent_dir: PathBuf,

    /// Directory for per-job audit trails
    #[arg(long, global = true, env = "JJ_STATE_DIR", default_value = ".jj-agent/state")]
    state_dir: PathBuf,

    /// Job identifier (random when omitted)
    #[arg(long, global = true)]
    job_id: Option<String>,

    /// Validate and preview without side effects
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a path may be touched
    CheckPath { path: String },

    /// Check whether a shell command may run
    CheckCommand { command: String },

    /// Check whether a URL may be fetched
    CheckUrl { url: String },

    /// Run a shell command on the configured backend
    Run {
        command: String,

        /// Working directory (default: workspace root)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Timeout in seconds (default: policy tool_seconds)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Write a file
    Write {
        path: String,

        /// Literal content
        #[arg(long, conflicts_with = "from")]
        content: Option<String>,

        /// Read content from this local file
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Read a file
    Read { path: String },

    /// Fetch a URL
    Fetch { url: String },

    /// Print the effective capability policy
    Policy,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = AgentConfig::from_env();
    let job_id = cli
        .job_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let _span = JobSpan::enter(&job_id);

    let policy = load_capabilities(&config, &cli.agent_dir, &cli.workspace)
        .context("Failed to load capability policy")?;
    let policy = Arc::new(policy);

    let dry_run = cli.dry_run;
    let job = Job {
        config: &config,
        policy,
        state_dir: &cli.state_dir,
        job_id: &job_id,
    };

    let status = match cli.command {
        Commands::Policy => {
            print_json(&job.policy.summary())?;
            0
        }
        Commands::CheckPath { path } => {
            let (guard, _) = job.guard().await?;
            report_decision(guard.evaluate(&ActionRequest::read(path)))?
        }
        Commands::CheckCommand { command } => {
            let (guard, _) = job.guard().await?;
            report_decision(guard.evaluate(&ActionRequest::shell(command)))?
        }
        Commands::CheckUrl { url } => {
            let (guard, _) = job.guard().await?;
            report_decision(guard.evaluate(&ActionRequest::fetch(url)))?
        }
        Commands::Run {
            command,
            cwd,
            timeout,
        } => {
            let mut req = ActionRequest::shell(command).with_dry_run(dry_run);
            if let Some(cwd) = cwd {
                req = req.with_cwd(cwd);
            }
            if let Some(secs) = timeout {
                req = req.with_timeout(secs);
            }
            job.execute(req).await?
        }
        Commands::Write {
            path,
            content,
            from,
        } => {
            let body = write_body(content, from.as_deref())?;
            job.execute(ActionRequest::write(path, body).with_dry_run(dry_run))
                .await?
        }
        Commands::Read { path } => {
            job.execute(ActionRequest::read(path).with_dry_run(dry_run))
                .await?
        }
        Commands::Fetch { url } => {
            job.execute(ActionRequest::fetch(url).with_dry_run(dry_run))
                .await?
        }
    };

    Ok(ExitCode::from(status))
}

/// Everything needed to build the guard for this invocation.
struct Job<'a> {
    config: &'a AgentConfig,
    policy: Arc<CapabilityPolicy>,
    state_dir: &'a Path,
    job_id: &'a str,
}

impl Job<'_> {
    async fn guard(&self) -> Result<(ActionGuard, Arc<GuardMetrics>)> {
        let metrics = Arc::new(GuardMetrics::new());
        let guard = ActionGuard::for_job(self.config, self.policy.clone())
            .await
            .context("Failed to build action guard")?
            .with_job_id(self.job_id)
            .with_audit(open_audit(self.state_dir, self.job_id))
            .with_metrics(metrics.clone());
        Ok((guard, metrics))
    }

    async fn execute(&self, req: ActionRequest) -> Result<u8> {
        let (guard, metrics) = self.guard().await?;
        let result = guard.evaluate_and_execute(req).await;
        metrics.flush();
        report_result(result)
    }
}

fn open_audit(state_dir: &Path, job_id: &str) -> Arc<dyn AuditSink> {
    match JsonlAuditSink::open(state_dir, job_id) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!(error = %e, state_dir = %state_dir.display(), "audit trail disabled");
            Arc::new(NullAuditSink)
        }
    }
}

fn write_body(content: Option<String>, from: Option<&Path>) -> Result<String> {
    match (content, from) {
        (Some(content), _) => Ok(content),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => anyhow::bail!("write needs --content or --from"),
    }
}

fn report_decision(decision: ActionDecision) -> Result<u8> {
    print_json(&decision)?;
    Ok(if decision.is_allowed() { 0 } else { EXIT_DENIED })
}

fn report_result(result: ActionResult) -> Result<u8> {
    print_json(&result)?;
    Ok(exit_status(result.outcome()))
}

fn exit_status(outcome: Outcome) -> u8 {
    match outcome {
        Outcome::Succeeded => 0,
        Outcome::PolicyViolation => EXIT_DENIED,
        Outcome::ExecutionFailure => EXIT_FAILURE,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
