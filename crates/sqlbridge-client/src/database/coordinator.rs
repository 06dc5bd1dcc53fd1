//! Transaction coordination.
//!
//! Every operation funnels through [`Database::txn_synchronized`]: with a
//! transaction it runs right away (the transaction already owns the
//! connection), without one it first takes the connection lock.
//! [`Database::transaction_with_outcome`] holds that lock for the whole
//! BEGIN, body, COMMIT/ROLLBACK span.

use std::future::Future;

use tracing::{debug, warn};

use sqlbridge_common::constants::{
    METHOD_BATCH, METHOD_CLOSE_DATABASE, METHOD_EXECUTE, METHOD_INSERT, METHOD_QUERY,
    METHOD_QUERY_CURSOR_NEXT, METHOD_UPDATE, PARAM_TRANSACTION_ID,
};
use sqlbridge_common::Value;

use super::ambient;
use super::Database;
use crate::args::{self, check_arguments, in_transaction_change};
use crate::cursor::QueryCursor;
use crate::error::{SqliteError, SqliteResult};
use crate::result::{decode_query_result, BatchResults, QueryResult};
use crate::transaction::{Transaction, TransactionOutcome};

impl Database {
    // =========================================================================
    // Transactions
    // =========================================================================

    /// Runs `body` in an immediate transaction.
    ///
    /// Commits if `body` returns `Ok`, rolls back otherwise. Inside a
    /// transaction body the existing transaction is reused and left open.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> SqliteResult<T>
    where
        T: Send,
        F: FnOnce(Transaction) -> Fut + Send,
        Fut: Future<Output = SqliteResult<T>> + Send,
    {
        self.transaction_with_outcome(false, move |txn| {
            let fut = body(txn);
            async move { fut.await.map(TransactionOutcome::Commit) }
        })
        .await
    }

    /// Like [`transaction`](Self::transaction) with `BEGIN EXCLUSIVE`.
    pub async fn exclusive_transaction<T, F, Fut>(&self, body: F) -> SqliteResult<T>
    where
        T: Send,
        F: FnOnce(Transaction) -> Fut + Send,
        Fut: Future<Output = SqliteResult<T>> + Send,
    {
        self.transaction_with_outcome(true, move |txn| {
            let fut = body(txn);
            async move { fut.await.map(TransactionOutcome::Commit) }
        })
        .await
    }

    /// Runs `body` in a transaction and lets it choose the outcome.
    ///
    /// [`TransactionOutcome::Rollback`] rolls back and still returns the
    /// value. In a nested call the value is returned and the enclosing
    /// transaction is left to its own outcome.
    pub async fn transaction_with_outcome<T, F, Fut>(
        &self,
        exclusive: bool,
        body: F,
    ) -> SqliteResult<T>
    where
        T: Send,
        F: FnOnce(Transaction) -> Fut + Send,
        Fut: Future<Output = SqliteResult<TransactionOutcome<T>>> + Send,
    {
        if let Some(txn) = self.current_transaction() {
            let outer = txn.clone();
            return self
                .txn_synchronized(Some(&txn), move || async move {
                    body(outer).await.map(TransactionOutcome::into_inner)
                })
                .await;
        }

        self.txn_synchronized(None, move || async move {
            let txn = self.begin_transaction(exclusive).await?;
            let result = ambient::with_ambient(txn.clone(), body(txn.clone())).await;
            let result = match result {
                Ok(TransactionOutcome::Commit(value)) => {
                    txn.set_successful(true);
                    Ok(value)
                }
                Ok(TransactionOutcome::Rollback(value)) => {
                    txn.set_successful(false);
                    Ok(value)
                }
                Err(e) => {
                    txn.set_successful(false);
                    Err(e)
                }
            };
            match (result, self.end_transaction(&txn).await) {
                (result, Ok(())) => result,
                (Ok(_), Err(end)) => Err(end),
                (Err(e), Err(end)) => {
                    warn!(path = %self.path(), "transaction failed: {}", e);
                    Err(end)
                }
            }
        })
        .await
    }

    /// Issues `BEGIN` and records the native transaction id.
    pub(crate) async fn begin_transaction(&self, exclusive: bool) -> SqliteResult<Transaction> {
        let txn = Transaction::new(self.clone());
        if !self.read_only() {
            let sql = if exclusive {
                "BEGIN EXCLUSIVE"
            } else {
                "BEGIN IMMEDIATE"
            };
            let response = self.txn_execute(Some(&txn), sql, Vec::new(), true).await?;
            txn.set_id(response.get(PARAM_TRANSACTION_ID).and_then(Value::as_i64));
            self.inner.stats.record_begin();
        }
        Ok(txn)
    }

    /// Commits or rolls back according to the recorded outcome.
    ///
    /// The transaction is closed afterwards even when the statement fails.
    /// Ending a closed transaction does nothing.
    pub(crate) async fn end_transaction(&self, txn: &Transaction) -> SqliteResult<()> {
        if txn.is_closed() {
            return Ok(());
        }
        if self.read_only() {
            txn.mark_closed();
            return Ok(());
        }
        let commit = txn.successful() == Some(true);
        let sql = if commit { "COMMIT" } else { "ROLLBACK" };
        let result = self.txn_execute(Some(txn), sql, Vec::new(), false).await;
        txn.mark_closed();
        if result.is_ok() {
            self.inner.stats.record_end(commit);
        }
        result.map(drop)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Runs `action` inside `txn`, or under the connection lock when there
    /// is no transaction.
    pub(crate) async fn txn_synchronized<T, F, Fut>(
        &self,
        txn: Option<&Transaction>,
        action: F,
    ) -> SqliteResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = SqliteResult<T>> + Send,
    {
        match txn {
            Some(txn) => {
                if txn.is_closed() {
                    return Err(SqliteError::TransactionClosed);
                }
                let result = action().await;
                if let Err(e) = &result {
                    if e.is_transaction_closed() {
                        txn.mark_closed();
                    }
                }
                result
            }
            None => {
                let warning = self.inner.lock_warning.read().clone();
                let _guard = self
                    .inner
                    .lock
                    .acquire(self.path(), &warning, &self.inner.stats)
                    .await;
                action().await
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub(crate) async fn txn_execute(
        &self,
        txn: Option<&Transaction>,
        sql: &str,
        arguments: Vec<Value>,
        begin: bool,
    ) -> SqliteResult<Value> {
        check_arguments(&arguments)?;
        let transaction_id = txn.and_then(Transaction::id);
        self.txn_synchronized(txn, move || async move {
            let id = self.native_id()?;
            let change = in_transaction_change(sql);
            let args = args::execute_args(id, transaction_id, sql, arguments, change, begin);
            self.invoke(METHOD_EXECUTE, args).await
        })
        .await
    }

    pub(crate) async fn txn_raw_insert(
        &self,
        txn: Option<&Transaction>,
        sql: &str,
        arguments: Vec<Value>,
    ) -> SqliteResult<Option<i64>> {
        let result = self.txn_statement(txn, METHOD_INSERT, sql, arguments).await?;
        Ok(result.as_i64())
    }

    pub(crate) async fn txn_raw_update(
        &self,
        txn: Option<&Transaction>,
        sql: &str,
        arguments: Vec<Value>,
    ) -> SqliteResult<usize> {
        let result = self.txn_statement(txn, METHOD_UPDATE, sql, arguments).await?;
        Ok(result
            .as_i64()
            .and_then(|changes| usize::try_from(changes).ok())
            .unwrap_or(0))
    }

    pub(crate) async fn txn_raw_query(
        &self,
        txn: Option<&Transaction>,
        sql: &str,
        arguments: Vec<Value>,
    ) -> SqliteResult<QueryResult> {
        let result = self.txn_statement(txn, METHOD_QUERY, sql, arguments).await?;
        decode_query_result(&result)
    }

    async fn txn_statement(
        &self,
        txn: Option<&Transaction>,
        method: &str,
        sql: &str,
        arguments: Vec<Value>,
    ) -> SqliteResult<Value> {
        check_arguments(&arguments)?;
        let transaction_id = txn.and_then(Transaction::id);
        self.txn_synchronized(txn, move || async move {
            let id = self.native_id()?;
            let args = args::statement_args(id, transaction_id, sql, arguments);
            self.invoke(method, args).await
        })
        .await
    }

    pub(crate) async fn txn_query_cursor(
        &self,
        txn: Option<&Transaction>,
        sql: &str,
        arguments: Vec<Value>,
        page_size: Option<usize>,
    ) -> SqliteResult<QueryCursor> {
        check_arguments(&arguments)?;
        let page_size = page_size.unwrap_or_else(|| self.default_page_size()).max(1);
        let transaction_id = txn.and_then(Transaction::id);
        let first_page = self
            .txn_synchronized(txn, move || async move {
                let id = self.native_id()?;
                let args = args::cursor_query_args(id, transaction_id, sql, arguments, page_size);
                self.invoke(METHOD_QUERY, args).await
            })
            .await?;
        let first_page = decode_query_result(&first_page)?;
        Ok(QueryCursor::new(self.clone(), txn.cloned(), first_page))
    }

    pub(crate) async fn txn_query_cursor_next(
        &self,
        txn: Option<&Transaction>,
        cursor_id: i64,
        cancel: bool,
    ) -> SqliteResult<QueryResult> {
        let transaction_id = txn.and_then(Transaction::id);
        let result = self
            .txn_synchronized(txn, move || async move {
                let id = self.native_id()?;
                let args = args::cursor_next_args(id, transaction_id, cursor_id, cancel);
                self.invoke(METHOD_QUERY_CURSOR_NEXT, args).await
            })
            .await?;
        decode_query_result(&result)
    }

    pub(crate) async fn txn_apply_batch(
        &self,
        txn: Option<&Transaction>,
        operations: Vec<Value>,
        no_result: bool,
        continue_on_error: bool,
    ) -> SqliteResult<BatchResults> {
        let transaction_id = txn.and_then(Transaction::id);
        let response = self
            .txn_synchronized(txn, move || async move {
                let id = self.native_id()?;
                let args =
                    args::batch_args(id, transaction_id, operations, no_result, continue_on_error);
                self.invoke(METHOD_BATCH, args).await
            })
            .await?;
        let results = BatchResults::from_value(&response)?;
        if continue_on_error {
            Ok(results)
        } else {
            results.into_checked()
        }
    }

    pub(crate) async fn txn_get_version(&self, txn: Option<&Transaction>) -> SqliteResult<i32> {
        let result = self
            .txn_raw_query(txn, "PRAGMA user_version", Vec::new())
            .await?;
        Ok(result
            .first_int_value()
            .and_then(|version| i32::try_from(version).ok())
            .unwrap_or(0))
    }

    pub(crate) async fn txn_set_version(
        &self,
        txn: Option<&Transaction>,
        version: i32,
    ) -> SqliteResult<()> {
        let sql = format!("PRAGMA user_version = {}", version);
        self.txn_execute(txn, &sql, Vec::new(), false)
            .await
            .map(drop)
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Closes the connection. Closing a closed database does nothing.
    ///
    /// Waits for a running transaction to end unless called from inside
    /// it, in which case the native layer refuses the close.
    pub async fn close(&self) -> SqliteResult<()> {
        let txn = self.current_transaction();
        self.txn_synchronized(txn.as_ref(), || async {
            if let Some(id) = self.id() {
                self.invoke(METHOD_CLOSE_DATABASE, args::close_args(id, false))
                    .await?;
                self.set_native_id(None);
                debug!(path = %self.path(), id, "database closed");
            }
            Ok(())
        })
        .await?;
        self.unregister();
        Ok(())
    }

    /// Best-effort close used while opening fails or a downgrade deletes
    /// the file. Errors are logged.
    pub(crate) async fn close_native(&self) {
        let id = self.inner.id.write().take();
        if let Some(id) = id {
            if let Err(e) = self
                .invoke(METHOD_CLOSE_DATABASE, args::close_args(id, false))
                .await
            {
                warn!(path = %self.path(), id, "error closing database: {}", e);
            }
        }
    }
}
