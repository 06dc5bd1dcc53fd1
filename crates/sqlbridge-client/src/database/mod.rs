//! Database connection handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use sqlbridge_common::Value;
use sqlbridge_gateway::NativeGateway;

use crate::error::{SqliteError, SqliteResult};
use crate::stats::{ConnectionStats, StatsSnapshot};
use crate::transaction::Transaction;

mod ambient;
mod coordinator;
mod lock;
mod open;
mod options;

pub use lock::{LockWarning, LockWarningCallback};
pub use options::{BoxFuture, CreateCallback, DatabaseCallback, MigrationCallback, OpenOptions};

pub(crate) use lock::ConnectionLock;

/// Single-instance connections keyed by resolved path.
pub(crate) type Registry = Mutex<HashMap<String, Database>>;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct DatabaseInner {
    uid: u64,
    path: String,
    options: OpenOptions,
    gateway: Arc<dyn NativeGateway>,
    id: RwLock<Option<i64>>,
    open_transaction: Mutex<Option<Transaction>>,
    lock: ConnectionLock,
    lock_warning: Arc<RwLock<LockWarning>>,
    stats: ConnectionStats,
    cursor_page_size: usize,
    registry: Weak<Registry>,
}

/// An open (or opening) database.
///
/// Cheap to clone; clones refer to the same connection. Operations live
/// on the [`SqlExecutor`](crate::SqlExecutor) trait.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub(crate) fn new(
        path: String,
        options: OpenOptions,
        gateway: Arc<dyn NativeGateway>,
        lock_warning: Arc<RwLock<LockWarning>>,
        cursor_page_size: usize,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
                path,
                options,
                gateway,
                id: RwLock::new(None),
                open_transaction: Mutex::new(None),
                lock: ConnectionLock::new(),
                lock_warning,
                stats: ConnectionStats::new(),
                cursor_page_size,
                registry,
            }),
        }
    }

    /// Process-unique handle id, distinct from the native connection id.
    pub(crate) fn uid(&self) -> u64 {
        self.inner.uid
    }

    /// Resolved path, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Native connection id; `None` when closed.
    pub fn id(&self) -> Option<i64> {
        *self.inner.id.read()
    }

    /// True while the native connection is open.
    pub fn is_open(&self) -> bool {
        self.id().is_some()
    }

    /// True for read-only connections.
    pub fn read_only(&self) -> bool {
        self.inner.options.read_only
    }

    /// The options the database was opened with.
    pub fn options(&self) -> &OpenOptions {
        &self.inner.options
    }

    /// Connection counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub(crate) fn ptr_eq(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn native_id(&self) -> SqliteResult<i64> {
        self.id().ok_or(SqliteError::DatabaseClosed)
    }

    pub(crate) fn set_native_id(&self, id: Option<i64>) {
        *self.inner.id.write() = id;
    }

    pub(crate) fn default_page_size(&self) -> usize {
        self.inner.cursor_page_size
    }

    /// The transaction an operation issued now would join: the migration
    /// transaction while opening, else the ambient one of this task.
    pub(crate) fn current_transaction(&self) -> Option<Transaction> {
        let open = self.inner.open_transaction.lock().clone();
        open.or_else(|| ambient::ambient_transaction(self.inner.uid))
    }

    pub(crate) fn open_transaction(&self) -> Option<Transaction> {
        self.inner.open_transaction.lock().clone()
    }

    pub(crate) fn set_open_transaction(&self, txn: Option<Transaction>) {
        *self.inner.open_transaction.lock() = txn;
    }

    /// Sends one call through the gateway.
    pub(crate) async fn invoke(&self, method: &str, args: Value) -> SqliteResult<Value> {
        self.inner.stats.record_operation();
        self.inner
            .gateway
            .invoke(method, args)
            .await
            .map_err(SqliteError::from)
    }

    /// Drops this database from the single-instance registry.
    pub(crate) fn unregister(&self) {
        if let Some(registry) = self.inner.registry.upgrade() {
            let mut registry = registry.lock();
            if registry
                .get(&self.inner.path)
                .map_or(false, |db| db.ptr_eq(self))
            {
                registry.remove(&self.inner.path);
            }
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("id", &self.id())
            .field("read_only", &self.inner.options.read_only)
            .finish()
    }
}
