//! Guards: one policy dimension each, each returning an [`ActionDecision`].
//!
//! - [`path`]    — `PathGuard`, filesystem containment and deny rules
//! - [`command`] — `CommandGuard`, deny substrings, dangerous patterns, pipes, allowlist
//! - [`domain`]  — `DomainGuard`, scheme, web switch, domain suffixes, fetch budget

pub mod command;
pub mod domain;
pub mod path;

use serde::{Deserialize, Serialize};

pub use command::CommandGuard;
pub use domain::{DomainGuard, FetchBudget};
pub use path::PathGuard;

/// Outcome of evaluating one request against one or more guards.
///
/// `Allowed` means no configured rule rejected the request, not that the
/// request is known to be safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ActionDecision {
    Allowed,
    Denied { reason: String },
}

impl ActionDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        ActionDecision::Denied {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, ActionDecision::Allowed)
    }

    /// Present iff the decision is a denial.
    pub fn denied_reason(&self) -> Option<&str> {
        match self {
            ActionDecision::Allowed => None,
            ActionDecision::Denied { reason } => Some(reason),
        }
    }
}

impl From<Result<(), String>> for ActionDecision {
    fn from(value: Result<(), String>) -> Self {
        match value {
            Ok(()) => ActionDecision::Allowed,
            Err(reason) => ActionDecision::Denied { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_reason_present_iff_denied() {
        assert!(ActionDecision::Allowed.is_allowed());
        assert_eq!(ActionDecision::Allowed.denied_reason(), None);

        let d = ActionDecision::deny("nope");
        assert!(!d.is_allowed());
        assert_eq!(d.denied_reason(), Some("nope"));
    }

    #[test]
    fn serializes_with_verdict_tag() {
        let json = serde_json::to_value(ActionDecision::deny("blocked")).unwrap();
        assert_eq!(json["verdict"], "denied");
        assert_eq!(json["reason"], "blocked");
    }
}
