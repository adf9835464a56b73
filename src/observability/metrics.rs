//! Process-wide operational counters.
//!
//! Counters only: monotonic, reset on process start, exact. All counters
//! use relaxed atomics; cross-counter consistency is not promised.

use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of proxy-wide counters.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Client sessions successfully bound to a backend
    sessions_created: AtomicU64,
    /// Session creation attempts that found no eligible backend
    sessions_failed: AtomicU64,
    /// Client packets routed to a backend
    packets_routed: AtomicU64,
    /// Packets dropped because the session was no longer valid
    packets_dropped: AtomicU64,
    /// Completed monitor ticks across all monitors
    monitor_ticks: AtomicU64,
    /// Journal files written to disk
    journal_writes: AtomicU64,
    /// Journal writes that failed
    journal_write_failures: AtomicU64,
    /// Event-hook commands launched
    hooks_launched: AtomicU64,
    /// Event-hook commands that failed or timed out
    hook_failures: AtomicU64,
    /// Transactions committed by the replication processor
    transactions_replicated: AtomicU64,
    /// Replication stream reconnects
    stream_reconnects: AtomicU64,
}

impl MetricsRegistry {
    /// New registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_sessions_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_packets_routed(&self) {
        self.packets_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_packets_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_monitor_ticks(&self) {
        self.monitor_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_journal_writes(&self) {
        self.journal_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_journal_write_failures(&self) {
        self.journal_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_hooks_launched(&self) {
        self.hooks_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_hook_failures(&self) {
        self.hook_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transactions_replicated(&self) {
        self.transactions_replicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stream_reconnects(&self) {
        self.stream_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sessions_created(&self) -> u64 {
        self.sessions_created.load(Ordering::Relaxed)
    }

    pub fn sessions_failed(&self) -> u64 {
        self.sessions_failed.load(Ordering::Relaxed)
    }

    pub fn packets_routed(&self) -> u64 {
        self.packets_routed.load(Ordering::Relaxed)
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    pub fn monitor_ticks(&self) -> u64 {
        self.monitor_ticks.load(Ordering::Relaxed)
    }

    pub fn journal_writes(&self) -> u64 {
        self.journal_writes.load(Ordering::Relaxed)
    }

    pub fn journal_write_failures(&self) -> u64 {
        self.journal_write_failures.load(Ordering::Relaxed)
    }

    pub fn hooks_launched(&self) -> u64 {
        self.hooks_launched.load(Ordering::Relaxed)
    }

    pub fn hook_failures(&self) -> u64 {
        self.hook_failures.load(Ordering::Relaxed)
    }

    pub fn transactions_replicated(&self) -> u64 {
        self.transactions_replicated.load(Ordering::Relaxed)
    }

    pub fn stream_reconnects(&self) -> u64 {
        self.stream_reconnects.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.sessions_created(), 0);
        assert_eq!(metrics.monitor_ticks(), 0);
        assert_eq!(metrics.transactions_replicated(), 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = MetricsRegistry::new();
        metrics.increment_sessions_created();
        metrics.increment_sessions_created();
        metrics.increment_hook_failures();
        assert_eq!(metrics.sessions_created(), 2);
        assert_eq!(metrics.hook_failures(), 1);
        assert_eq!(metrics.sessions_failed(), 0);
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        use std::sync::Arc;

        let metrics = Arc::new(MetricsRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let m = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    m.increment_packets_routed();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.packets_routed(), 8000);
    }
}
