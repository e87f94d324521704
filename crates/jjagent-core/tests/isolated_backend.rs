//! Container invocation synthesis. Nothing here starts a container.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jjagent_core::backend::isolated::{CONTAINER_WORKDIR, DEFAULT_IMAGE};
use jjagent_core::policy::{CapabilityPolicy, NetworkSection, PolicyDefaults, PolicyFile, SandboxSettings};
use jjagent_core::{ContainerEngine, ExecutionBackend, IsolatedBackend};

fn backend(file: PolicyFile, engine: ContainerEngine) -> (tempfile::TempDir, std::path::PathBuf, IsolatedBackend) {
    let ws = tempfile::tempdir().unwrap();
    let policy = CapabilityPolicy::compile(file, ws.path(), &PolicyDefaults::default()).unwrap();
    let root = policy.workspace().to_path_buf();
    (ws, root, IsolatedBackend::with_engine(engine, Arc::new(policy)))
}

#[test]
fn test_hardening_on_by_default_and_single_mount() {
    let (_ws, root, b) = backend(PolicyFile::workspace_default(), ContainerEngine::Docker);
    let argv = b
        .build_invocation("make test", &root, Duration::from_secs(60))
        .unwrap();

    assert_eq!(argv[0], "docker");
    assert!(argv.iter().any(|a| a == "--read-only"));
    assert!(argv.iter().any(|a| a == "--security-opt=no-new-privileges:true"));

    let mounts: Vec<_> = argv
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "--mount")
        .map(|(i, _)| argv[i + 1].clone())
        .collect();
    assert_eq!(
        mounts,
        vec![format!("type=bind,source={},target={CONTAINER_WORKDIR}", root.display())]
    );
    assert!(!argv.iter().any(|a| a == "-v" || a == "--volume"));

    let image_at = argv.iter().position(|a| a == DEFAULT_IMAGE).unwrap();
    assert_eq!(
        &argv[image_at + 1..],
        ["timeout", "-k", "2", "60", "sh", "-c", "make test"]
    );
}

#[test]
fn test_hardening_can_be_disabled() {
    let (_ws, root, b) = backend(
        PolicyFile {
            sandbox: SandboxSettings {
                read_only_root: false,
                no_new_privileges: false,
                ..SandboxSettings::default()
            },
            ..PolicyFile::workspace_default()
        },
        ContainerEngine::Podman,
    );
    let argv = b
        .build_invocation("true", &root, Duration::from_secs(5))
        .unwrap();
    assert!(!argv.iter().any(|a| a == "--read-only"));
    assert!(!argv.iter().any(|a| a.contains("no-new-privileges")));
}

#[test]
fn test_network_follows_web_switches() {
    let web = PolicyFile {
        network: NetworkSection {
            allow_web: true,
            allowed_domains: vec!["example.com".into()],
        },
        ..PolicyFile::workspace_default()
    };
    let (_ws, root, b) = backend(web.clone(), ContainerEngine::Podman);
    let b = b.with_network(true);
    let argv = b
        .build_invocation("true", &root, Duration::from_secs(5))
        .unwrap();
    assert!(!argv.iter().any(|a| a == "--network=none"));

    let b = b.with_network(false);
    let argv = b
        .build_invocation("true", &root, Duration::from_secs(5))
        .unwrap();
    assert!(argv.iter().any(|a| a == "--network=none"));
}

#[tokio::test]
async fn test_dry_run_returns_invocation_for_subdirectory() {
    let (_ws, root, b) = backend(PolicyFile::workspace_default(), ContainerEngine::Podman);
    std::fs::create_dir(root.join("pkg")).unwrap();

    let r = b
        .execute("ls", &root.join("pkg"), Duration::from_secs(10), true)
        .await;
    assert!(r.success && r.dry_run);
    assert!(r.sandboxed);
    let container = r.container_command.unwrap();
    assert!(container.contains(&format!("source={}", root.join("pkg").display())));
    assert_eq!(r.cwd.unwrap(), root.join("pkg").display().to_string());
}

#[tokio::test]
async fn test_cwd_outside_workspace_is_denied_before_engine() {
    let (_ws, _root, b) = backend(PolicyFile::workspace_default(), ContainerEngine::Docker);
    let r = b
        .execute("ls", Path::new("/"), Duration::from_secs(10), false)
        .await;
    assert!(r.denied && r.sandboxed);
    assert!(r.container_command.is_none());
}
