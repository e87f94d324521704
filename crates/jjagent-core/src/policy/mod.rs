//! Capability policy: on-disk schema, compiled model, and loader.
//!
//! - [`file`]   — `PolicyFile` and its sections, as written in YAML
//! - [`model`]  — `CapabilityPolicy`, compiled once per job and never mutated
//! - [`loader`] — `load_capabilities()` with development/production posture

pub mod file;
pub mod loader;
pub mod model;

pub use file::{
    BudgetsSection, LoggingSection, NetworkSection, PolicyFile, SandboxSettings, TimeoutsSection,
    WORKSPACE_PLACEHOLDER,
};
pub use loader::{load_capabilities, read_policy_file, DEV_POLICY_FILE, PROD_POLICY_FILE};
pub use model::{
    Budgets, CapabilityPolicy, DenyGlob, NetworkPolicy, PathRule, PolicyDefaults, PolicySummary,
    Timeouts, DEFAULT_REDACT_PATTERNS,
};
