//! Git tool. Only builds command lines; execution and policy go through the
//! shell path like any other command.

use std::sync::Arc;

use crate::action::{ActionGuard, ActionResult};
use crate::backend::shell_quote;

use super::ShellTool;

#[derive(Debug, Clone)]
pub struct GitTool {
    shell: ShellTool,
}

impl GitTool {
    pub fn new(guard: Arc<ActionGuard>) -> Self {
        Self {
            shell: ShellTool::new(guard),
        }
    }

    pub async fn init(&self, dry_run: bool) -> ActionResult {
        self.run(init_command(), dry_run).await
    }

    pub async fn add(&self, files: &[&str], dry_run: bool) -> ActionResult {
        self.run(add_command(files), dry_run).await
    }

    pub async fn commit(&self, message: &str, dry_run: bool) -> ActionResult {
        self.run(commit_command(message), dry_run).await
    }

    /// `create` selects `checkout -b`.
    pub async fn branch(&self, name: &str, create: bool, dry_run: bool) -> ActionResult {
        self.run(branch_command(name, create), dry_run).await
    }

    pub async fn status(&self, dry_run: bool) -> ActionResult {
        self.run(status_command(), dry_run).await
    }

    pub async fn push(&self, remote: &str, branch: Option<&str>, dry_run: bool) -> ActionResult {
        self.run(push_command(remote, branch), dry_run).await
    }

    pub async fn remote_add(&self, name: &str, url: &str, dry_run: bool) -> ActionResult {
        self.run(remote_add_command(name, url), dry_run).await
    }

    async fn run(&self, command: String, dry_run: bool) -> ActionResult {
        self.shell.run(&command, None, dry_run, None).await
    }
}

fn init_command() -> String {
    "git init".to_string()
}

fn add_command(files: &[&str]) -> String {
    if files.is_empty() {
        return "git add .".to_string();
    }
    let quoted: Vec<String> = files.iter().map(|f| shell_quote(f)).collect();
    format!("git add -- {}", quoted.join(" "))
}

fn commit_command(message: &str) -> String {
    format!("git commit -m {}", shell_quote(message))
}

fn branch_command(name: &str, create: bool) -> String {
    if create {
        format!("git checkout -b {}", shell_quote(name))
    } else {
        format!("git checkout {}", shell_quote(name))
    }
}

fn status_command() -> String {
    "git status".to_string()
}

fn push_command(remote: &str, branch: Option<&str>) -> String {
    match branch {
        Some(branch) => format!("git push {} {}", shell_quote(remote), shell_quote(branch)),
        None => format!("git push {}", shell_quote(remote)),
    }
}

fn remote_add_command(name: &str, url: &str) -> String {
    format!("git remote add {} {}", shell_quote(name), shell_quote(url))
}
