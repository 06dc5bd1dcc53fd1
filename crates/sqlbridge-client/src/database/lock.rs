//! The per-connection critical section and its wait instrumentation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::stats::ConnectionStats;

/// Callback invoked with the database path when a wait runs long.
pub type LockWarningCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Advisory warning for long waits on a connection.
///
/// The callback fires once per wait that exceeds `duration`; the wait
/// itself carries on until the connection is free.
#[derive(Clone)]
pub struct LockWarning {
    duration: Option<Duration>,
    callback: LockWarningCallback,
}

impl LockWarning {
    /// A warning with a custom callback.
    pub fn new<F>(duration: Duration, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            duration: Some(duration),
            callback: Arc::new(callback),
        }
    }

    /// A warning that logs through `tracing`.
    pub fn logging(duration: Duration) -> Self {
        Self::new(duration, move |path| {
            warn!(
                path,
                waited_ms = duration.as_millis() as u64,
                "database has been locked for a while, possible deadlock: \
                 make sure to use the transaction object for operations inside a transaction"
            );
        })
    }

    /// No warning at all.
    pub fn disabled() -> Self {
        Self {
            duration: None,
            callback: Arc::new(|_| {}),
        }
    }

    /// The wait duration before the callback fires.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl fmt::Debug for LockWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockWarning")
            .field("duration", &self.duration)
            .finish()
    }
}

/// Serializes the operations of one connection that run outside a
/// transaction context.
#[derive(Debug, Default)]
pub(crate) struct ConnectionLock {
    mutex: Mutex<()>,
}

impl ConnectionLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access.
    pub(crate) async fn acquire(
        &self,
        path: &str,
        warning: &LockWarning,
        stats: &ConnectionStats,
    ) -> MutexGuard<'_, ()> {
        if let Ok(guard) = self.mutex.try_lock() {
            return guard;
        }
        stats.record_lock_wait();

        let acquire = self.mutex.lock();
        tokio::pin!(acquire);

        if let Some(duration) = warning.duration {
            tokio::select! {
                guard = &mut acquire => return guard,
                _ = tokio::time::sleep(duration) => {
                    stats.record_lock_warning();
                    (warning.callback)(path);
                }
            }
        }
        acquire.await
    }
}
