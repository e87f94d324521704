//! Action requests submitted by tool wrappers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What kind of side effect a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PathWrite,
    PathRead,
    /// Create a directory and its parents; guarded like `PathWrite`.
    MakeDir,
    ShellCommand,
    FetchUrl,
}

impl ActionKind {
    /// Tool name recorded in the audit trail.
    pub fn tool_name(&self) -> &'static str {
        match self {
            ActionKind::PathWrite => "fs.write",
            ActionKind::PathRead => "fs.read",
            ActionKind::MakeDir => "fs.mkdir",
            ActionKind::ShellCommand => "shell.run",
            ActionKind::FetchUrl => "web.fetch",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::PathWrite => write!(f, "path_write"),
            ActionKind::PathRead => write!(f, "path_read"),
            ActionKind::MakeDir => write!(f, "make_dir"),
            ActionKind::ShellCommand => write!(f, "shell_command"),
            ActionKind::FetchUrl => write!(f, "fetch_url"),
        }
    }
}

/// One request to the action guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    /// Path, command string, or URL depending on `kind`.
    pub target: String,
    #[serde(default)]
    pub declared_cwd: Option<PathBuf>,
    #[serde(default)]
    pub dry_run: bool,
    /// File body for `PathWrite`.
    #[serde(default)]
    pub content: Option<String>,
    /// Per-request override of the policy's `tool_seconds`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            declared_cwd: None,
            dry_run: false,
            content: None,
            timeout_secs: None,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(ActionKind::ShellCommand, command)
    }

    pub fn read(path: impl Into<String>) -> Self {
        Self::new(ActionKind::PathRead, path)
    }

    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(ActionKind::PathWrite, path)
        }
    }

    pub fn mkdir(path: impl Into<String>) -> Self {
        Self::new(ActionKind::MakeDir, path)
    }

    pub fn fetch(url: impl Into<String>) -> Self {
        Self::new(ActionKind::FetchUrl, url)
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.declared_cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Arguments as recorded in the audit trail. Write bodies are summarised
    /// by size only.
    pub fn audit_args(&self) -> serde_json::Value {
        let mut args = serde_json::json!({
            "target": self.target,
            "dry_run": self.dry_run,
        });
        if let Some(cwd) = &self.declared_cwd {
            args["cwd"] = serde_json::Value::String(cwd.display().to_string());
        }
        if let Some(content) = &self.content {
            args["content_bytes"] = serde_json::Value::from(content.len());
        }
        if let Some(timeout) = self.timeout_secs {
            args["timeout_secs"] = serde_json::Value::from(timeout);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_kind_and_options() {
        let req = ActionRequest::shell("ls")
            .with_cwd("/ws/src")
            .with_timeout(5)
            .with_dry_run(true);
        assert_eq!(req.kind, ActionKind::ShellCommand);
        assert_eq!(req.declared_cwd, Some(PathBuf::from("/ws/src")));
        assert_eq!(req.timeout_secs, Some(5));
        assert!(req.dry_run);
    }

    #[test]
    fn audit_args_never_include_write_body() {
        let req = ActionRequest::write("notes.txt", "sk-secret-body");
        let args = req.audit_args();
        assert_eq!(args["content_bytes"], 14);
        assert!(!args.to_string().contains("sk-secret-body"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let req: ActionRequest =
            serde_json::from_str(r#"{"kind":"fetch_url","target":"https://example.com"}"#).unwrap();
        assert_eq!(req.kind, ActionKind::FetchUrl);
        assert!(!req.dry_run);
        assert_eq!(req.kind.tool_name(), "web.fetch");
    }
}
