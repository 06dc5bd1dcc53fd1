//! The ambient transaction of the running task.
//!
//! While a transaction body runs, operations on the same database join
//! that transaction instead of waiting for the connection. The context is
//! task-local: work spawned onto another task does not inherit it.

use std::future::Future;

use crate::transaction::Transaction;

tokio::task_local! {
    static AMBIENT: Vec<Transaction>;
}

/// The innermost ambient transaction of database `uid`.
pub(crate) fn ambient_transaction(uid: u64) -> Option<Transaction> {
    AMBIENT
        .try_with(|transactions| {
            transactions
                .iter()
                .rev()
                .find(|txn| txn.database().uid() == uid)
                .cloned()
        })
        .ok()
        .flatten()
}

/// Runs `future` with `txn` pushed on the ambient stack.
pub(crate) async fn with_ambient<F: Future>(txn: Transaction, future: F) -> F::Output {
    let mut transactions = AMBIENT
        .try_with(|transactions| transactions.clone())
        .unwrap_or_default();
    transactions.push(txn);
    AMBIENT.scope(transactions, future).await
}
