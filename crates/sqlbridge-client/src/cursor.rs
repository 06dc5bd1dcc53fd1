//! Paged query cursor.

use std::collections::VecDeque;

use tracing::warn;

use crate::database::Database;
use crate::error::{SqliteError, SqliteResult};
use crate::result::{QueryResult, QueryRow};
use crate::transaction::Transaction;

/// Walks a query result page by page.
///
/// The first page comes with the query; later pages are fetched with
/// `queryCursorNext` as the buffered rows run out. Close the cursor when
/// stopping early so the native statement is released.
#[derive(Debug)]
pub struct QueryCursor {
    database: Database,
    transaction: Option<Transaction>,
    cursor_id: Option<i64>,
    buffer: VecDeque<QueryRow>,
    current: Option<QueryRow>,
    closed: bool,
}

impl QueryCursor {
    pub(crate) fn new(
        database: Database,
        transaction: Option<Transaction>,
        first_page: QueryResult,
    ) -> Self {
        let cursor_id = first_page.cursor_id();
        Self {
            database,
            transaction,
            cursor_id,
            buffer: first_page.into_rows().into(),
            current: None,
            closed: false,
        }
    }

    /// Advances to the next row. Returns `false` once the rows are exhausted.
    pub async fn move_next(&mut self) -> SqliteResult<bool> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                self.current = Some(row);
                return Ok(true);
            }
            match self.cursor_id.take() {
                Some(cursor_id) => {
                    let page = self
                        .database
                        .txn_query_cursor_next(self.transaction.as_ref(), cursor_id, false)
                        .await?;
                    self.cursor_id = page.cursor_id();
                    self.buffer = page.into_rows().into();
                }
                None => {
                    self.current = None;
                    self.closed = true;
                    return Ok(false);
                }
            }
        }
    }

    /// The row under the cursor.
    pub fn current(&self) -> SqliteResult<&QueryRow> {
        self.current
            .as_ref()
            .ok_or_else(|| SqliteError::invalid_argument("cursor has no current row"))
    }

    /// True once the rows are exhausted or the cursor was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the native cursor. Closing twice does nothing.
    pub async fn close(&mut self) -> SqliteResult<()> {
        self.closed = true;
        self.current = None;
        self.buffer.clear();
        if let Some(cursor_id) = self.cursor_id.take() {
            self.database
                .txn_query_cursor_next(self.transaction.as_ref(), cursor_id, true)
                .await?;
        }
        Ok(())
    }
}

impl Drop for QueryCursor {
    fn drop(&mut self) {
        if let Some(cursor_id) = self.cursor_id {
            warn!(
                path = %self.database.path(),
                cursor_id,
                "query cursor dropped without close, native cursor stays open until the connection closes"
            );
        }
    }
}
