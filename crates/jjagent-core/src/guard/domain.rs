//! URL guard with a per-job fetch budget.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use reqwest::Url;

use crate::policy::CapabilityPolicy;

use super::ActionDecision;

const BLOCKED_SCHEMES: &[&str] = &["file:", "data:", "mailto:", "javascript:"];

/// Per-job fetch counter. Only successful fetches are recorded.
#[derive(Debug)]
pub struct FetchBudget {
    used: AtomicU32,
    limit: u32,
}

impl FetchBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            used: AtomicU32::new(0),
            limit,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used.load(Ordering::SeqCst) >= self.limit
    }

    /// Record one completed fetch. Returns the new count.
    pub fn record(&self) -> u32 {
        self.used.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Decides whether a URL may be fetched.
///
/// Evaluation order, first match wins:
/// 1. scheme other than `http`/`https` → deny
/// 2. job-level or policy-level web access off → deny
/// 3. host not equal to or under an `allowed_domains` entry → deny
/// 4. fetch budget exhausted → deny
/// 5. allow
///
/// One instance belongs to exactly one job; the budget is never shared.
#[derive(Debug)]
pub struct DomainGuard {
    policy: Arc<CapabilityPolicy>,
    job_allow_web: bool,
    budget: FetchBudget,
}

impl DomainGuard {
    pub fn new(policy: Arc<CapabilityPolicy>, job_allow_web: bool) -> Self {
        let budget = FetchBudget::new(policy.budgets().max_fetches_per_job);
        Self {
            policy,
            job_allow_web,
            budget,
        }
    }

    pub fn check_fetch(&self, url: &str) -> ActionDecision {
        self.authorize(url).map(|_| ()).into()
    }

    /// Like [`DomainGuard::check_fetch`], returning the parsed URL.
    pub fn authorize(&self, url: &str) -> Result<Url, String> {
        let lowered = url.trim().to_ascii_lowercase();
        if let Some(scheme) = BLOCKED_SCHEMES.iter().find(|s| lowered.starts_with(**s)) {
            return Err(format!("Blocked URL scheme: {scheme}"));
        }
        if !(lowered.starts_with("http://") || lowered.starts_with("https://")) {
            return Err("Only http:// and https:// URLs are allowed".to_string());
        }

        if !(self.job_allow_web && self.policy.network().allow_web) {
            return Err(
                "Web access is disabled. Set JJ_ALLOW_WEB=1 and enable network.allow_web \
                 with an allowed_domains list in the capabilities file."
                    .to_string(),
            );
        }

        let parsed = Url::parse(url.trim()).map_err(|e| format!("Invalid URL: {e}"))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| "Invalid URL: missing host".to_string())?;

        let domains = &self.policy.network().allowed_domains;
        if domains.is_empty() {
            return Err(
                "No allowed domains configured. Web access requires a domain allowlist."
                    .to_string(),
            );
        }
        if !host_allowed(host, domains) {
            return Err(format!("Domain {host} not in allowed_domains list"));
        }

        if self.budget.is_exhausted() {
            return Err(format!(
                "Fetch budget exceeded: maximum of {} fetches per job reached",
                self.budget.limit()
            ));
        }

        Ok(parsed)
    }

    /// Record a completed fetch against the job budget.
    pub fn record_fetch(&self) -> u32 {
        self.budget.record()
    }

    pub fn fetch_count(&self) -> u32 {
        self.budget.used()
    }

    pub fn budget(&self) -> &FetchBudget {
        &self.budget
    }
}

/// Exact match or subdomain of an allowed entry; ports are never part of
/// `host`.
pub(crate) fn host_allowed(host: &str, domains: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    domains.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{NetworkSection, PolicyDefaults, PolicyFile};

    fn guard(allow_web: bool, domains: &[&str]) -> (tempfile::TempDir, DomainGuard) {
        let ws = tempfile::tempdir().unwrap();
        let file = PolicyFile {
            network: NetworkSection {
                allow_web,
                allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
            },
            ..PolicyFile::default()
        };
        let policy = CapabilityPolicy::compile(file, ws.path(), &PolicyDefaults::default()).unwrap();
        (ws, DomainGuard::new(Arc::new(policy), true))
    }

    #[test]
    fn subdomains_match_but_lookalikes_do_not() {
        let domains = vec!["example.com".to_string()];
        assert!(host_allowed("example.com", &domains));
        assert!(host_allowed("api.Example.com.", &domains));
        assert!(!host_allowed("badexample.com", &domains));
        assert!(!host_allowed("example.com.evil.test", &domains));
    }

    #[test]
    fn blocked_schemes_are_rejected_before_policy() {
        let (_ws, g) = guard(true, &["example.com"]);
        for url in [
            "file:///etc/passwd",
            "data:text/plain,hi",
            "mailto:a@example.com",
            "JavaScript:alert(1)",
            "ftp://example.com/x",
        ] {
            assert!(!g.check_fetch(url).is_allowed(), "{url} should be denied");
        }
    }

    #[test]
    fn port_is_ignored_for_domain_match() {
        let (_ws, g) = guard(true, &["example.com"]);
        assert!(g.check_fetch("https://example.com:8443/a").is_allowed());
    }

    #[test]
    fn empty_domain_list_denies() {
        let (_ws, g) = guard(true, &[]);
        let d = g.check_fetch("https://example.com/");
        assert!(d.denied_reason().unwrap().contains("No allowed domains"));
    }

    #[test]
    fn job_level_switch_overrides_policy() {
        let ws = tempfile::tempdir().unwrap();
        let file = PolicyFile {
            network: NetworkSection {
                allow_web: true,
                allowed_domains: vec!["example.com".into()],
            },
            ..PolicyFile::default()
        };
        let policy = CapabilityPolicy::compile(file, ws.path(), &PolicyDefaults::default()).unwrap();
        let g = DomainGuard::new(Arc::new(policy), false);
        let d = g.check_fetch("https://example.com/");
        assert!(d.denied_reason().unwrap().contains("JJ_ALLOW_WEB"));
    }
}
