//! Shell command guard.

use std::sync::{Arc, LazyLock};

use regex::{Regex, RegexBuilder};

use crate::policy::CapabilityPolicy;

use super::ActionDecision;

/// Catastrophic operations rejected regardless of policy.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    (r"rm\s+-rf\s+/", "recursive delete of root"),
    (r"rm\s+-rf\s+\*", "recursive delete of wildcard"),
    (r"\bformat\s+", "disk format"),
    (r"\bmkfs(\.\w+)?\b", "filesystem creation"),
    (r"del\s+/f\s+/s\s+/q", "recursive forced delete"),
    (r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&?\s*\}\s*;?\s*:", "fork bomb"),
];

static DANGEROUS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DANGEROUS_PATTERNS
        .iter()
        .map(|(pattern, label)| {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("dangerous command patterns are valid regexes");
            (re, *label)
        })
        .collect()
});

/// Programs that execute whatever arrives on stdin.
const INTERPRETERS: &[&str] = &[
    "sh", "bash", "zsh", "dash", "ksh", "csh", "tcsh", "fish", "ash", "busybox", "node",
    "nodejs", "deno", "bun", "perl", "ruby", "php", "lua", "pwsh", "powershell", "osascript",
];

/// Wrappers that run their argument as the real program.
const WRAPPERS: &[&str] = &["sudo", "env", "exec", "command", "nohup", "time", "xargs", "nice"];

/// Decides whether a shell command string may be run.
///
/// Evaluation order, first match wins:
/// 1. `denied_commands` substring (case-insensitive) → deny
/// 2. fixed dangerous pattern set → deny
/// 3. pipe into a shell or interpreter → deny
/// 4. `allowed_commands` non-empty and no entry matches at the start → deny
/// 5. allow
#[derive(Debug, Clone)]
pub struct CommandGuard {
    policy: Arc<CapabilityPolicy>,
}

impl CommandGuard {
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self { policy }
    }

    pub fn check(&self, command: &str) -> ActionDecision {
        self.evaluate(command).into()
    }

    fn evaluate(&self, command: &str) -> Result<(), String> {
        let lowered = command.to_lowercase();
        if let Some(pattern) = self
            .policy
            .denied_commands()
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
        {
            return Err(format!("Command matches denied pattern: {pattern}"));
        }

        if let Some((re, label)) = DANGEROUS.iter().find(|(re, _)| re.is_match(command)) {
            return Err(format!(
                "Dangerous command pattern detected ({label}): {}",
                re.as_str()
            ));
        }

        if let Some(program) = piped_interpreter(command) {
            return Err(format!("Unsafe pipe to interpreter detected: {program}"));
        }

        let allowlist = self.policy.allowed_commands();
        if !allowlist.is_empty() && !allowlist.iter().any(|re| re.is_match(command)) {
            return Err(format!("Command not in allowed list: {command}"));
        }

        Ok(())
    }
}

/// Returns the interpreter a pipeline feeds into, if any segment after the
/// first invokes one.
fn piped_interpreter(command: &str) -> Option<String> {
    command
        .split('|')
        .skip(1)
        .filter_map(invoked_program)
        .find(|program| is_interpreter(program))
}

fn invoked_program(segment: &str) -> Option<String> {
    let mut tokens = segment
        .split_whitespace()
        // `|&` leaves a leading `&` on the next segment.
        .map(|t| t.trim_start_matches(|c: char| matches!(c, '(' | '{' | '&')))
        .filter(|t| !t.is_empty())
        .peekable();

    while let Some(token) = tokens.next() {
        // FOO=bar prefixes set the environment, they are not the program.
        if is_env_assignment(token) {
            continue;
        }
        let name = token.rsplit('/').next().unwrap_or(token).to_lowercase();
        if WRAPPERS.contains(&name.as_str()) {
            // Skip wrapper flags such as `sudo -u root` or `env -i`.
            while tokens.peek().is_some_and(|t| t.starts_with('-')) {
                tokens.next();
            }
            continue;
        }
        return Some(name);
    }
    None
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((key, _)) => {
            !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn is_interpreter(program: &str) -> bool {
    INTERPRETERS.contains(&program)
        || program.starts_with("python")
        || program.starts_with("pypy")
}
