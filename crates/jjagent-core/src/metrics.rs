//! Action counters.
//!
//! Counters are incremented at the call site. Call [`GuardMetrics::flush`] to
//! emit current values as a single `tracing::info!` event (e.g. at job end).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Receiver for per-action measurements. Implementations must not block.
pub trait MetricsSink: Send + Sync {
    fn record_tool_call(&self, tool: &str, duration_ms: u64, success: bool);
    fn record_denial(&self, tool: &str);
    fn record_fetch(&self);
}

/// Lightweight atomic counters, no allocations, no locking.
#[derive(Debug, Default)]
pub struct GuardMetrics {
    tool_calls: AtomicU64,
    tool_failures: AtomicU64,
    tool_duration_ms: AtomicU64,
    denials: AtomicU64,
    fetches: AtomicU64,
}

/// Point-in-time copy of [`GuardMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub tool_duration_ms: u64,
    pub denials: u64,
    pub fetches: u64,
}

impl GuardMetrics {
    pub const fn new() -> Self {
        Self {
            tool_calls: AtomicU64::new(0),
            tool_failures: AtomicU64::new(0),
            tool_duration_ms: AtomicU64::new(0),
            denials: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_failures: self.tool_failures.load(Ordering::Relaxed),
            tool_duration_ms: self.tool_duration_ms.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            tool_calls = s.tool_calls,
            tool_failures = s.tool_failures,
            tool_duration_ms = s.tool_duration_ms,
            denials = s.denials,
            fetches = s.fetches,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.tool_calls.store(0, Ordering::Relaxed);
        self.tool_failures.store(0, Ordering::Relaxed);
        self.tool_duration_ms.store(0, Ordering::Relaxed);
        self.denials.store(0, Ordering::Relaxed);
        self.fetches.store(0, Ordering::Relaxed);
    }
}

impl MetricsSink for GuardMetrics {
    fn record_tool_call(&self, tool: &str, duration_ms: u64, success: bool) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        self.tool_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
        if !success {
            self.tool_failures.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "tool_calls", tool, duration_ms, "counter incremented");
    }

    fn record_denial(&self, tool: &str) {
        self.denials.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "denials", tool, "counter incremented");
    }

    fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetches", "counter incremented");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = GuardMetrics::new();
        m.record_tool_call("shell.run", 40, true);
        m.record_tool_call("shell.run", 60, false);
        m.record_denial("fs.write");
        m.record_fetch();

        let s = m.snapshot();
        assert_eq!(s.tool_calls, 2);
        assert_eq!(s.tool_failures, 1);
        assert_eq!(s.tool_duration_ms, 100);
        assert_eq!(s.denials, 1);
        assert_eq!(s.fetches, 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = GuardMetrics::new();
        m.record_tool_call("fs.read", 1, true);
        m.record_denial("fs.read");
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
