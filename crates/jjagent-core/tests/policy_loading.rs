//! Policy discovery, posture and compilation errors.

use std::path::Path;

use jjagent_core::config::{AgentConfig, Environment};
use jjagent_core::policy::{load_capabilities, DEV_POLICY_FILE, PROD_POLICY_FILE};
use jjagent_core::PolicyError;
use jjagent_core::PathGuard;

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn production() -> AgentConfig {
    AgentConfig {
        env: Environment::Production,
        allow_web: false,
        ..AgentConfig::default()
    }
}

#[test]
fn test_missing_dev_file_falls_back_to_workspace_scope() {
    let agent = tempfile::tempdir().unwrap();
    let ws = tempfile::tempdir().unwrap();
    let config = AgentConfig {
        max_tool_seconds: 42,
        max_job_minutes: 7,
        ..AgentConfig::default()
    };
    let policy = load_capabilities(&config, agent.path(), ws.path()).unwrap();

    assert_eq!(policy.allowed_paths().len(), 1);
    assert!(!policy.network().allow_web);
    assert_eq!(policy.timeouts().tool_seconds, 42);
    assert_eq!(policy.timeouts().fetch_seconds, 12);
    assert_eq!(policy.budgets().job_minutes, 7);
    assert_eq!(policy.budgets().web_dollars, 2.0);
    assert!(policy
        .redactor()
        .redact("sk-abcdefghijklmnopqrstuvwxyz")
        .contains("[REDACTED]"));

    let guard = PathGuard::new(std::sync::Arc::new(policy));
    assert!(guard.check(Path::new("src/lib.rs")).is_allowed());
    assert!(!guard.check(Path::new("/nonexistent-jj/x")).is_allowed());
}

#[test]
fn test_dev_file_is_read_and_partially_defaulted() {
    let agent = tempfile::tempdir().unwrap();
    let ws = tempfile::tempdir().unwrap();
    write(
        agent.path(),
        DEV_POLICY_FILE,
        r#"
allowed_paths:
  - "${workspace}/**"
deny_globs:
  - "*.pem"
allowed_commands:
  - "^cargo "
network:
  allow_web: true
  allowed_domains: ["*.Docs.RS", "crates.io."]
timeouts:
  fetch_seconds: 5
sandbox:
  pids_limit: 128
  memory: 1g
"#,
    );
    let policy = load_capabilities(&AgentConfig::default(), agent.path(), ws.path()).unwrap();

    assert_eq!(policy.deny_globs()[0].source(), "*.pem");
    assert_eq!(policy.allowed_commands().len(), 1);
    assert_eq!(policy.network().allowed_domains, vec!["docs.rs", "crates.io"]);
    assert_eq!(policy.timeouts().fetch_seconds, 5);
    assert_eq!(policy.timeouts().tool_seconds, 180);
    assert_eq!(policy.budgets().max_fetches_per_job, 50);
    assert_eq!(policy.sandbox().pids_limit, Some(128));
    assert!(policy.sandbox().read_only_root);
}

#[test]
fn test_production_requires_prod_file() {
    let agent = tempfile::tempdir().unwrap();
    let ws = tempfile::tempdir().unwrap();
    // A development file does not satisfy production.
    write(agent.path(), DEV_POLICY_FILE, "allowed_paths: []\n");

    let err = load_capabilities(&production(), agent.path(), ws.path()).unwrap_err();
    match err {
        PolicyError::ProductionPolicyMissing { path } => {
            assert_eq!(path, agent.path().join(PROD_POLICY_FILE))
        }
        other => panic!("unexpected error: {other}"),
    }

    write(agent.path(), PROD_POLICY_FILE, "denied_commands: [\"curl\"]\n");
    let policy = load_capabilities(&production(), agent.path(), ws.path()).unwrap();
    assert_eq!(policy.denied_commands(), ["curl"]);
}

#[test]
fn test_strict_mode_in_development_requires_prod_file() {
    let agent = tempfile::tempdir().unwrap();
    let ws = tempfile::tempdir().unwrap();
    let config = AgentConfig {
        prod_strict: true,
        ..AgentConfig::default()
    };
    let err = load_capabilities(&config, agent.path(), ws.path()).unwrap_err();
    assert!(matches!(err, PolicyError::ProductionPolicyMissing { .. }));
}

#[test]
fn test_invalid_regex_and_glob_are_configuration_errors() {
    let agent = tempfile::tempdir().unwrap();
    let ws = tempfile::tempdir().unwrap();

    write(agent.path(), DEV_POLICY_FILE, "allowed_commands: [\"(unclosed\"]\n");
    let err = load_capabilities(&AgentConfig::default(), agent.path(), ws.path()).unwrap_err();
    assert!(matches!(
        err,
        PolicyError::InvalidRegex { field: "allowed_commands", .. }
    ));

    write(agent.path(), DEV_POLICY_FILE, "deny_globs: [\"secrets/[abc\"]\n");
    let err = load_capabilities(&AgentConfig::default(), agent.path(), ws.path()).unwrap_err();
    assert!(matches!(err, PolicyError::InvalidGlob { field: "deny_globs", .. }));
}

#[test]
fn test_missing_workspace_is_reported() {
    let agent = tempfile::tempdir().unwrap();
    let err = load_capabilities(
        &AgentConfig::default(),
        agent.path(),
        Path::new("/nonexistent-jj/workspace"),
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::Workspace { .. }));
}

#[test]
fn test_environment_config_drives_defaults() {
    let vars = [
        ("JJ_ENV", "production"),
        ("JJ_ALLOW_WEB", "1"),
        ("JJ_MAX_FETCHES_PER_JOB", "3"),
        ("JJ_RUNTIME", "sandboxed"),
    ];
    let config = AgentConfig::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    });
    assert!(config.is_production());
    assert!(config.allow_web);
    assert_eq!(config.max_fetches_per_job, 3);
    assert_eq!(config.runtime, jjagent_core::RuntimeKind::Sandboxed);
}
