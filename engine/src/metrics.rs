//! Metrics collection for bank monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Bank metrics.
pub struct BankMetrics {
    /// Guarded operations that entered the guard.
    pub operations_started: AtomicU64,
    /// Operations committed.
    pub operations_committed: AtomicU64,
    /// Operations reverted.
    pub operations_reverted: AtomicU64,
    /// Operations in flight.
    pub operations_active: AtomicU64,
    /// Committed deposits.
    pub deposits: AtomicU64,
    /// Committed withdrawals.
    pub withdrawals: AtomicU64,
    /// Guarded entry points rejected as re-entrant.
    pub reentrancy_rejected: AtomicU64,
    /// Value or calls rejected outside a deposit entry point.
    pub unsolicited_rejected: AtomicU64,
    /// Compensating transfers that could not be completed.
    pub compensations_failed: AtomicU64,
}

impl BankMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            operations_started: AtomicU64::new(0),
            operations_committed: AtomicU64::new(0),
            operations_reverted: AtomicU64::new(0),
            operations_active: AtomicU64::new(0),
            deposits: AtomicU64::new(0),
            withdrawals: AtomicU64::new(0),
            reentrancy_rejected: AtomicU64::new(0),
            unsolicited_rejected: AtomicU64::new(0),
            compensations_failed: AtomicU64::new(0),
        }
    }

    pub fn operation_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
        self.operations_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deposit_committed(&self) {
        self.deposits.fetch_add(1, Ordering::Relaxed);
        self.committed();
    }

    pub fn withdrawal_committed(&self) {
        self.withdrawals.fetch_add(1, Ordering::Relaxed);
        self.committed();
    }

    pub fn operation_reverted(&self) {
        self.operations_reverted.fetch_add(1, Ordering::Relaxed);
        self.operations_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn reentrancy_rejected(&self) {
        self.reentrancy_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unsolicited_rejected(&self) {
        self.unsolicited_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn compensation_failed(&self) {
        self.compensations_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn committed(&self) {
        self.operations_committed.fetch_add(1, Ordering::Relaxed);
        self.operations_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_started: self.operations_started.load(Ordering::Relaxed),
            operations_committed: self.operations_committed.load(Ordering::Relaxed),
            operations_reverted: self.operations_reverted.load(Ordering::Relaxed),
            operations_active: self.operations_active.load(Ordering::Relaxed),
            deposits: self.deposits.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            reentrancy_rejected: self.reentrancy_rejected.load(Ordering::Relaxed),
            unsolicited_rejected: self.unsolicited_rejected.load(Ordering::Relaxed),
            compensations_failed: self.compensations_failed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let series = [
            ("operations_started", "counter", "Guarded operations started", snapshot.operations_started),
            ("operations_committed", "counter", "Operations committed", snapshot.operations_committed),
            ("operations_reverted", "counter", "Operations reverted", snapshot.operations_reverted),
            ("operations_active", "gauge", "Operations in flight", snapshot.operations_active),
            ("deposits", "counter", "Committed deposits", snapshot.deposits),
            ("withdrawals", "counter", "Committed withdrawals", snapshot.withdrawals),
            ("reentrancy_rejected", "counter", "Re-entrant calls rejected", snapshot.reentrancy_rejected),
            ("unsolicited_rejected", "counter", "Unsolicited transfers rejected", snapshot.unsolicited_rejected),
            ("compensations_failed", "counter", "Compensating transfers failed", snapshot.compensations_failed),
        ];

        series
            .iter()
            .map(|(name, kind, help, value)| {
                format!(
                    "# HELP assetbank_{name} {help}\n# TYPE assetbank_{name} {kind}\nassetbank_{name} {value}\n"
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for BankMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub operations_started: u64,
    pub operations_committed: u64,
    pub operations_reverted: u64,
    pub operations_active: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub reentrancy_rejected: u64,
    pub unsolicited_rejected: u64,
    pub compensations_failed: u64,
}
