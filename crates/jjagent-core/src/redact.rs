//! Secret redaction for text leaving the guard layer.

use regex::Regex;

/// Replacement written over every redacted match.
pub const REDACTED: &str = "[REDACTED]";

/// Compiled set of secret patterns.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    patterns: Vec<Regex>,
}

impl Redactor {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Replace every match of every pattern with [`REDACTED`].
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&out) {
                out = pattern.replace_all(&out, REDACTED).into_owned();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor(patterns: &[&str]) -> Redactor {
        Redactor::new(patterns.iter().map(|p| Regex::new(p).unwrap()).collect())
    }

    #[test]
    fn replaces_all_matches() {
        let r = redactor(&[r"sk-[A-Za-z0-9]{20,}"]);
        let text = "a sk-abcdefghijklmnopqrstuvwx and sk-ABCDEFGHIJKLMNOPQRSTUVWX";
        assert_eq!(r.redact(text), "a [REDACTED] and [REDACTED]");
    }

    #[test]
    fn leaves_clean_text_untouched() {
        let r = redactor(&[r"ghp_[A-Za-z0-9]{36}"]);
        assert_eq!(r.redact("nothing to see"), "nothing to see");
        assert!(Redactor::default().is_empty());
    }
}
