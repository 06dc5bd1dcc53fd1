//! Batch assembler.
//!
//! Collects operations and sends them in one native `batch` call. The
//! response holds one slot per operation, in submission order.

use sqlbridge_common::constants::{METHOD_EXECUTE, METHOD_INSERT, METHOD_QUERY, METHOD_UPDATE};
use sqlbridge_common::Value;

use crate::args::{batch_operation, check_arguments};
use crate::builder::{ConflictAlgorithm, QueryOptions, SqlBuilder};
use crate::database::Database;
use crate::error::{SqliteError, SqliteResult};
use crate::result::BatchResults;
use crate::transaction::{Transaction, TransactionOutcome};

/// How to commit a [`Batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// `BEGIN EXCLUSIVE` instead of `BEGIN IMMEDIATE`. Must stay `None`
    /// for a batch created from a transaction.
    pub exclusive: Option<bool>,
    /// Discard results; the native layer returns nothing.
    pub no_result: bool,
    /// Keep going after a failed operation and report it in its slot.
    pub continue_on_error: bool,
}

impl BatchOptions {
    /// Default options: immediate transaction, results, stop on error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `exclusive`.
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = Some(exclusive);
        self
    }

    /// Sets `no_result`.
    pub fn no_result(mut self, no_result: bool) -> Self {
        self.no_result = no_result;
        self
    }

    /// Sets `continue_on_error`.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// An ordered list of operations sent as one native call.
#[derive(Debug)]
pub struct Batch {
    database: Database,
    transaction: Option<Transaction>,
    operations: Vec<Value>,
}

impl Batch {
    pub(crate) fn new(database: Database, transaction: Option<Transaction>) -> Self {
        Self {
            database,
            transaction,
            operations: Vec::new(),
        }
    }

    fn push(&mut self, method: &str, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        check_arguments(&arguments)?;
        self.operations.push(batch_operation(method, sql, arguments));
        Ok(())
    }

    /// Adds a statement without result.
    pub fn execute(&mut self, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        self.push(METHOD_EXECUTE, sql, arguments)
    }

    /// Adds an `INSERT`; its slot holds the row id.
    pub fn raw_insert(&mut self, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        self.push(METHOD_INSERT, sql, arguments)
    }

    /// Adds a query; its slot holds the rows.
    pub fn raw_query(&mut self, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        self.push(METHOD_QUERY, sql, arguments)
    }

    /// Adds an `UPDATE`; its slot holds the change count.
    pub fn raw_update(&mut self, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        self.push(METHOD_UPDATE, sql, arguments)
    }

    /// Adds a `DELETE`; its slot holds the change count.
    pub fn raw_delete(&mut self, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        self.push(METHOD_UPDATE, sql, arguments)
    }

    /// Adds a row insert built by [`SqlBuilder::insert`].
    pub fn insert(
        &mut self,
        table: &str,
        values: &[(&str, Value)],
        conflict: Option<ConflictAlgorithm>,
    ) -> SqliteResult<()> {
        let (sql, arguments) = SqlBuilder::insert(table, values, None, conflict)?.into_parts();
        self.push(METHOD_INSERT, &sql, arguments)
    }

    /// Adds an update built by [`SqlBuilder::update`].
    pub fn update(
        &mut self,
        table: &str,
        values: &[(&str, Value)],
        where_clause: Option<&str>,
        where_args: Vec<Value>,
        conflict: Option<ConflictAlgorithm>,
    ) -> SqliteResult<()> {
        let (sql, arguments) =
            SqlBuilder::update(table, values, where_clause, where_args, conflict)?.into_parts();
        self.push(METHOD_UPDATE, &sql, arguments)
    }

    /// Adds a delete built by [`SqlBuilder::delete`].
    pub fn delete(
        &mut self,
        table: &str,
        where_clause: Option<&str>,
        where_args: Vec<Value>,
    ) -> SqliteResult<()> {
        let (sql, arguments) = SqlBuilder::delete(table, where_clause, where_args)?.into_parts();
        self.push(METHOD_UPDATE, &sql, arguments)
    }

    /// Adds a query built by [`SqlBuilder::query`].
    pub fn query(&mut self, table: &str, options: &QueryOptions) -> SqliteResult<()> {
        let (sql, arguments) = SqlBuilder::query(table, options)?.into_parts();
        self.push(METHOD_QUERY, &sql, arguments)
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True if nothing was queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Sends the batch.
    ///
    /// A batch created from a [`Database`] runs in its own transaction (or
    /// joins the running one). A batch created from a [`Transaction`] runs
    /// in that transaction and rejects `exclusive`.
    ///
    /// Without `continue_on_error` the first failed operation fails the
    /// whole batch and the transaction rolls back.
    pub async fn commit(self, options: BatchOptions) -> SqliteResult<BatchResults> {
        let Batch {
            database,
            transaction,
            operations,
        } = self;

        match transaction {
            Some(txn) => {
                if options.exclusive.is_some() {
                    return Err(SqliteError::invalid_argument(
                        "exclusive must not be set for a batch bound to a transaction",
                    ));
                }
                database
                    .txn_apply_batch(
                        Some(&txn),
                        operations,
                        options.no_result,
                        options.continue_on_error,
                    )
                    .await
            }
            None => {
                let db = database.clone();
                database
                    .transaction_with_outcome(
                        options.exclusive.unwrap_or(false),
                        move |txn| async move {
                            db.txn_apply_batch(
                                Some(&txn),
                                operations,
                                options.no_result,
                                options.continue_on_error,
                            )
                            .await
                            .map(TransactionOutcome::Commit)
                        },
                    )
                    .await
            }
        }
    }
}
