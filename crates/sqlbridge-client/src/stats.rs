//! Per-connection statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one database connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Native calls issued.
    operations: AtomicU64,
    /// Transactions begun.
    transactions_begun: AtomicU64,
    /// Transactions committed.
    commits: AtomicU64,
    /// Transactions rolled back.
    rollbacks: AtomicU64,
    /// Times a caller had to wait for the connection.
    lock_waits: AtomicU64,
    /// Waits that exceeded the warning duration.
    lock_warnings: AtomicU64,
}

impl ConnectionStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_begin(&self) {
        self.transactions_begun.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_end(&self, committed: bool) {
        if committed {
            self.commits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rollbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_lock_warning(&self) {
        self.lock_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Native calls issued.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    /// Transactions begun.
    pub fn transactions_begun(&self) -> u64 {
        self.transactions_begun.load(Ordering::Relaxed)
    }

    /// Transactions committed.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Transactions rolled back.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Times a caller waited for the connection.
    pub fn lock_waits(&self) -> u64 {
        self.lock_waits.load(Ordering::Relaxed)
    }

    /// Waits that triggered the lock warning.
    pub fn lock_warnings(&self) -> u64 {
        self.lock_warnings.load(Ordering::Relaxed)
    }

    /// Copies the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            operations: self.operations(),
            transactions_begun: self.transactions_begun(),
            commits: self.commits(),
            rollbacks: self.rollbacks(),
            lock_waits: self.lock_waits(),
            lock_warnings: self.lock_warnings(),
        }
    }
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Native calls issued.
    pub operations: u64,
    /// Transactions begun.
    pub transactions_begun: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back.
    pub rollbacks: u64,
    /// Lock waits.
    pub lock_waits: u64,
    /// Lock warnings.
    pub lock_warnings: u64,
}
