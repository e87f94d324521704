//! Domain allowlist and per-job fetch budget, at guard level and through a
//! real HTTP round trip against a loopback responder.

use std::sync::Arc;

use jjagent_core::policy::{BudgetsSection, CapabilityPolicy, NetworkSection, PolicyDefaults, PolicyFile};
use jjagent_core::fetch::MAX_CONTENT_CHARS;
use jjagent_core::{ActionGuard, ActionRequest, DirectBackend, DomainGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn web_policy(ws: &std::path::Path, domains: &[&str], budget: u32) -> Arc<CapabilityPolicy> {
    let file = PolicyFile {
        network: NetworkSection {
            allow_web: true,
            allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
        },
        budgets: BudgetsSection {
            max_fetches_per_job: Some(budget),
            ..BudgetsSection::default()
        },
        ..PolicyFile::workspace_default()
    };
    Arc::new(CapabilityPolicy::compile(file, ws, &PolicyDefaults::default()).unwrap())
}

// -------------------------------------------------------------------------
// Guard level
// -------------------------------------------------------------------------

#[test]
fn test_web_disabled_denies_every_fetch() {
    let ws = tempfile::tempdir().unwrap();
    let file = PolicyFile {
        network: NetworkSection {
            allow_web: false,
            allowed_domains: vec!["example.com".into()],
        },
        ..PolicyFile::default()
    };
    let policy = CapabilityPolicy::compile(file, ws.path(), &PolicyDefaults::default()).unwrap();
    let guard = DomainGuard::new(Arc::new(policy), true);
    for url in ["https://example.com/", "http://api.example.com/x", "https://evil.test/"] {
        assert!(!guard.check_fetch(url).is_allowed(), "{url}");
    }
}

#[test]
fn test_budget_counts_only_successful_fetches() {
    let ws = tempfile::tempdir().unwrap();
    let guard = DomainGuard::new(web_policy(ws.path(), &["example.com"], 2), true);

    assert!(guard.check_fetch("https://example.com/a").is_allowed());
    guard.record_fetch();

    let evil = guard.check_fetch("https://evil.test/");
    assert!(evil.denied_reason().unwrap().contains("not in allowed_domains"));
    assert_eq!(guard.fetch_count(), 1);

    assert!(guard.check_fetch("https://docs.example.com/b").is_allowed());
    guard.record_fetch();

    let third = guard.check_fetch("https://example.com/c");
    assert!(third.denied_reason().unwrap().contains("Fetch budget exceeded"));
    assert_eq!(guard.fetch_count(), 2);
}

// -------------------------------------------------------------------------
// Loopback round trip
// -------------------------------------------------------------------------

const SECRET: &str = "sk-abcdefghijklmnopqrstuvwxyz0123";
const LARGE_BODY: usize = 200_000;

fn avoid_proxies() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    std::env::set_var("no_proxy", "127.0.0.1,localhost");
}

/// Minimal HTTP/1.1 responder: `/missing` → 404, `/redirect` → 302 to a
/// foreign host, `/large` → 200 with a 200 KB body, anything else → 200
/// with a body containing a secret.
async fn spawn_responder() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let response = match path.as_str() {
                    "/missing" => {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    }
                    "/redirect" => "HTTP/1.1 302 Found\r\nLocation: http://evil.test/\r\n\
                                    Content-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string(),
                    "/large" => {
                        let body = "a".repeat(LARGE_BODY);
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        )
                    }
                    _ => {
                        let body = format!("token {SECRET} end");
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        )
                    }
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}

#[tokio::test]
async fn test_fetch_budget_over_loopback() {
    avoid_proxies();

    let port = spawn_responder().await;
    let ws = tempfile::tempdir().unwrap();
    let policy = web_policy(ws.path(), &["127.0.0.1"], 2);
    let backend = Arc::new(DirectBackend::new(policy.clone()));
    let guard = ActionGuard::new(policy, backend, true, "test").unwrap();
    let base = format!("http://127.0.0.1:{port}");

    let first = guard
        .evaluate_and_execute(ActionRequest::fetch(format!("{base}/one")))
        .await;
    assert!(first.success, "{first:?}");
    let page = first.output.unwrap();
    assert_eq!(page["status"], 200);
    let content = page["content"].as_str().unwrap();
    assert!(content.contains("[REDACTED]"));
    assert!(!content.contains(SECRET));
    assert_eq!(guard.fetch_count(), 1);

    // Failures and denials never consume budget.
    let missing = guard
        .evaluate_and_execute(ActionRequest::fetch(format!("{base}/missing")))
        .await;
    assert!(!missing.success && !missing.denied);
    assert!(missing.error.unwrap().contains("404"));

    let redirected = guard
        .evaluate_and_execute(ActionRequest::fetch(format!("{base}/redirect")))
        .await;
    assert!(!redirected.success);

    let foreign = guard
        .evaluate_and_execute(ActionRequest::fetch("https://evil.test/"))
        .await;
    assert!(foreign.denied);
    assert_eq!(guard.fetch_count(), 1);

    let second = guard
        .evaluate_and_execute(ActionRequest::fetch(format!("{base}/two")))
        .await;
    assert!(second.success, "{second:?}");
    assert_eq!(guard.fetch_count(), 2);

    let third = guard
        .evaluate_and_execute(ActionRequest::fetch(format!("{base}/three")))
        .await;
    assert!(third.denied);
    assert!(third.error.unwrap().contains("Fetch budget exceeded"));
}

#[tokio::test]
async fn test_large_body_is_truncated_to_limit() {
    avoid_proxies();

    let port = spawn_responder().await;
    let ws = tempfile::tempdir().unwrap();
    let policy = web_policy(ws.path(), &["127.0.0.1"], 5);
    let backend = Arc::new(DirectBackend::new(policy.clone()));
    let guard = ActionGuard::new(policy, backend, true, "test").unwrap();

    let r = guard
        .evaluate_and_execute(ActionRequest::fetch(format!("http://127.0.0.1:{port}/large")))
        .await;
    assert!(r.success, "{r:?}");
    let page = r.output.unwrap();
    assert_eq!(page["truncated"], true);
    let content = page["content"].as_str().unwrap();
    assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
    assert!(content.chars().all(|c| c == 'a'));
}
