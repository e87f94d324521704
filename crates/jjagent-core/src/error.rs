//! Error taxonomy for the guard layer.
//!
//! Only configuration problems surface as `Err`. Policy violations and
//! execution failures are reported through [`crate::action::ActionResult`]
//! so a caller always receives a uniform outcome.

use std::path::PathBuf;

/// Errors produced while loading or compiling a capability policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error(
        "production mode requires capabilities.prod.yaml at {path}; \
         refusing to start without production capabilities"
    )]
    ProductionPolicyMissing { path: PathBuf },

    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("workspace {path} is not usable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern '{pattern}' in {field}: {reason}")]
    InvalidGlob {
        field: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("invalid regex '{pattern}' in {field}: {source}")]
    InvalidRegex {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot resolve path '{pattern}' in {field}: {source}")]
    UnresolvablePath {
        field: &'static str,
        pattern: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by audit sinks. Never propagated past the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit sink poisoned")]
    Poisoned,
}

/// Errors produced by the guarded HTTP fetcher.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Crate-level error umbrella.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for guard-layer setup operations.
pub type Result<T> = std::result::Result<T, GuardError>;
