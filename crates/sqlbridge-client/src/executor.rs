//! Operations shared by [`Database`] and [`Transaction`].

use async_trait::async_trait;

use sqlbridge_common::Value;

use crate::batch::Batch;
use crate::builder::{ConflictAlgorithm, QueryOptions, SqlBuilder};
use crate::cursor::QueryCursor;
use crate::database::Database;
use crate::error::SqliteResult;
use crate::result::QueryResult;
use crate::transaction::Transaction;

/// SQL operations.
///
/// On a [`Database`] an operation joins the transaction the calling task
/// is running (if any) and otherwise waits for the connection. On a
/// [`Transaction`] it always runs inside that transaction.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// The database and transaction an operation runs against.
    fn context(&self) -> (&Database, Option<Transaction>);

    /// A new batch bound to this executor.
    fn batch(&self) -> Batch;

    /// Executes a statement without result, e.g. DDL. Without arguments
    /// several `;`-separated statements may be given.
    async fn execute(&self, sql: &str, arguments: Vec<Value>) -> SqliteResult<()> {
        let (db, txn) = self.context();
        db.txn_execute(txn.as_ref(), sql, arguments, false)
            .await
            .map(drop)
    }

    /// Executes an `INSERT`; returns the row id, `None` if no row was
    /// inserted.
    async fn raw_insert(&self, sql: &str, arguments: Vec<Value>) -> SqliteResult<Option<i64>> {
        let (db, txn) = self.context();
        db.txn_raw_insert(txn.as_ref(), sql, arguments).await
    }

    /// Executes a query.
    async fn raw_query(&self, sql: &str, arguments: Vec<Value>) -> SqliteResult<QueryResult> {
        let (db, txn) = self.context();
        db.txn_raw_query(txn.as_ref(), sql, arguments).await
    }

    /// Executes an `UPDATE`; returns the number of changed rows.
    async fn raw_update(&self, sql: &str, arguments: Vec<Value>) -> SqliteResult<usize> {
        let (db, txn) = self.context();
        db.txn_raw_update(txn.as_ref(), sql, arguments).await
    }

    /// Executes a `DELETE`; returns the number of deleted rows.
    async fn raw_delete(&self, sql: &str, arguments: Vec<Value>) -> SqliteResult<usize> {
        self.raw_update(sql, arguments).await
    }

    /// Inserts one row.
    async fn insert(
        &self,
        table: &str,
        values: &[(&str, Value)],
        conflict: Option<ConflictAlgorithm>,
    ) -> SqliteResult<Option<i64>> {
        let (sql, arguments) = SqlBuilder::insert(table, values, None, conflict)?.into_parts();
        self.raw_insert(&sql, arguments).await
    }

    /// Queries one table.
    async fn query(&self, table: &str, options: &QueryOptions) -> SqliteResult<QueryResult> {
        let (sql, arguments) = SqlBuilder::query(table, options)?.into_parts();
        self.raw_query(&sql, arguments).await
    }

    /// Updates rows of one table.
    async fn update(
        &self,
        table: &str,
        values: &[(&str, Value)],
        where_clause: Option<&str>,
        where_args: Vec<Value>,
        conflict: Option<ConflictAlgorithm>,
    ) -> SqliteResult<usize> {
        let (sql, arguments) =
            SqlBuilder::update(table, values, where_clause, where_args, conflict)?.into_parts();
        self.raw_update(&sql, arguments).await
    }

    /// Deletes rows of one table.
    async fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: Vec<Value>,
    ) -> SqliteResult<usize> {
        let (sql, arguments) = SqlBuilder::delete(table, where_clause, where_args)?.into_parts();
        self.raw_delete(&sql, arguments).await
    }

    /// Opens a cursor over a query; `page_size` defaults to the configured
    /// cursor page size.
    async fn raw_query_cursor(
        &self,
        sql: &str,
        arguments: Vec<Value>,
        page_size: Option<usize>,
    ) -> SqliteResult<QueryCursor> {
        let (db, txn) = self.context();
        db.txn_query_cursor(txn.as_ref(), sql, arguments, page_size)
            .await
    }

    /// Opens a cursor over one table.
    async fn query_cursor(
        &self,
        table: &str,
        options: &QueryOptions,
        page_size: Option<usize>,
    ) -> SqliteResult<QueryCursor> {
        let (sql, arguments) = SqlBuilder::query(table, options)?.into_parts();
        self.raw_query_cursor(&sql, arguments, page_size).await
    }

    /// `PRAGMA user_version`.
    async fn get_version(&self) -> SqliteResult<i32> {
        let (db, txn) = self.context();
        db.txn_get_version(txn.as_ref()).await
    }

    /// Sets `PRAGMA user_version`.
    async fn set_version(&self, version: i32) -> SqliteResult<()> {
        let (db, txn) = self.context();
        db.txn_set_version(txn.as_ref(), version).await
    }
}

#[async_trait]
impl SqlExecutor for Database {
    fn context(&self) -> (&Database, Option<Transaction>) {
        (self, self.current_transaction())
    }

    fn batch(&self) -> Batch {
        Batch::new(self.clone(), None)
    }
}

#[async_trait]
impl SqlExecutor for Transaction {
    fn context(&self) -> (&Database, Option<Transaction>) {
        (self.database(), Some(self.clone()))
    }

    fn batch(&self) -> Batch {
        Batch::new(self.database().clone(), Some(self.clone()))
    }
}
