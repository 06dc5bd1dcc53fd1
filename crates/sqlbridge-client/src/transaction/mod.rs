//! Transaction handle.
//!
//! A [`Transaction`] is created by [`Database::transaction`] and handed to
//! the body. The coordinator begins it, runs the body and ends it; the
//! handle itself never commits or rolls back.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::database::Database;

/// What a transaction body asks for once it is done.
///
/// `Rollback` unwinds the transaction while still delivering a value to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome<T> {
    /// Commit and return the value.
    Commit(T),
    /// Roll back and return the value.
    Rollback(T),
}

impl<T> TransactionOutcome<T> {
    /// True for [`TransactionOutcome::Commit`].
    pub fn is_commit(&self) -> bool {
        matches!(self, TransactionOutcome::Commit(_))
    }

    /// The carried value.
    pub fn into_inner(self) -> T {
        match self {
            TransactionOutcome::Commit(value) | TransactionOutcome::Rollback(value) => value,
        }
    }
}

#[derive(Debug, Default)]
struct TransactionState {
    id: Option<i64>,
    closed: bool,
    successful: Option<bool>,
}

struct TransactionInner {
    database: Database,
    state: Mutex<TransactionState>,
}

/// One logical BEGIN..COMMIT/ROLLBACK span.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(database: Database) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                database,
                state: Mutex::new(TransactionState::default()),
            }),
        }
    }

    /// The database the transaction runs on.
    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    /// Native transaction id, `None` until `BEGIN` returns one (and always
    /// `None` on read-only connections).
    pub fn id(&self) -> Option<i64> {
        self.inner.state.lock().id
    }

    pub(crate) fn set_id(&self, id: Option<i64>) {
        self.inner.state.lock().id = id;
    }

    /// True once the transaction has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.state.lock().closed = true;
    }

    /// Unset while the body runs; `true` commits, `false` rolls back.
    pub fn successful(&self) -> Option<bool> {
        self.inner.state.lock().successful
    }

    /// Records the outcome. The first recorded outcome wins.
    pub(crate) fn set_successful(&self, successful: bool) {
        let mut state = self.inner.state.lock();
        if state.successful.is_none() {
            state.successful = Some(successful);
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Transaction")
            .field("path", &self.inner.database.path())
            .field("id", &state.id)
            .field("closed", &state.closed)
            .field("successful", &state.successful)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome() {
        assert!(TransactionOutcome::Commit(1).is_commit());
        assert!(!TransactionOutcome::Rollback(1).is_commit());
        assert_eq!(TransactionOutcome::Rollback("v").into_inner(), "v");
    }
}
