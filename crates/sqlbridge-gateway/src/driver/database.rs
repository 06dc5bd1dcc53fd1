//! One open native connection and its transaction gate.

use std::collections::{HashMap, VecDeque};

use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::{debug, warn};

use sqlbridge_common::constants::{
    is_in_memory_path, METHOD_BATCH, METHOD_EXECUTE, METHOD_INSERT, METHOD_QUERY,
    METHOD_QUERY_CURSOR_NEXT, METHOD_UPDATE, PARAM_CANCEL, PARAM_COLUMNS, PARAM_CONTINUE_ON_ERROR,
    PARAM_CURSOR_ID, PARAM_ERROR, PARAM_NO_RESULT, PARAM_OPERATIONS, PARAM_RESULT, PARAM_ROWS,
    PARAM_TRANSACTION_ID, TRANSACTION_ID_FORCE,
};
use sqlbridge_common::{LogLevel, NativeError, NativeResult, Value, ValueMap};

use super::operation::{column_value, flag, SqlArg, SqlOperation, TransactionTag};
use crate::worker::NativeCall;

/// Rows held back for a paged query.
struct DriverCursor {
    columns: Vec<Value>,
    rows: VecDeque<Value>,
    page_size: usize,
}

/// An open connection as seen by the driver.
pub(crate) struct DriverDatabase {
    pub(crate) id: i64,
    pub(crate) path: String,
    pub(crate) single_instance: bool,
    log_level: LogLevel,
    connection: Connection,
    last_transaction_id: i64,
    current_transaction_id: Option<i64>,
    last_cursor_id: i64,
    cursors: HashMap<i64, DriverCursor>,
    /// Operations that arrived while an unrelated transaction was open.
    queue: VecDeque<NativeCall>,
}

impl DriverDatabase {
    /// Opens the SQLite connection.
    pub(crate) fn open(
        id: i64,
        path: String,
        read_only: bool,
        single_instance: bool,
        log_level: LogLevel,
    ) -> NativeResult<Self> {
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };

        let connection = Connection::open_with_flags(&path, flags)
            .map_err(|e| NativeError::open_failed(format!("open_failed {}: {}", path, e)))?;

        Ok(Self {
            id,
            path,
            single_instance,
            log_level,
            connection,
            last_transaction_id: 0,
            current_transaction_id: None,
            last_cursor_id: 0,
            cursors: HashMap::new(),
            queue: VecDeque::new(),
        })
    }

    /// True if SQLite reports an open transaction on the connection.
    pub(crate) fn is_in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }

    /// True for `:memory:` connections.
    pub(crate) fn is_in_memory(&self) -> bool {
        is_in_memory_path(&self.path)
    }

    pub(crate) fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    /// Routes a SQL call through the transaction gate.
    ///
    /// With no current transaction the call runs at once. With a current
    /// transaction it runs only if it carries that id or the force sentinel;
    /// anything else waits in the queue until the transaction ends.
    pub(crate) fn dispatch(&mut self, call: NativeCall) {
        let transaction_id = call.args.get(PARAM_TRANSACTION_ID).and_then(Value::as_i64);

        let runnable = match self.current_transaction_id {
            None => true,
            Some(current) => {
                transaction_id == Some(current) || transaction_id == Some(TRANSACTION_ID_FORCE)
            }
        };

        if runnable {
            self.run(call);
            self.run_queued();
        } else {
            if self.log_level.has_verbose() {
                debug!(
                    db = self.id,
                    method = %call.method,
                    current = ?self.current_transaction_id,
                    requested = ?transaction_id,
                    "queueing operation until transaction ends"
                );
            }
            self.queue.push_back(call);
        }
    }

    /// Number of operations waiting for the current transaction to end.
    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    fn run_queued(&mut self) {
        while self.current_transaction_id.is_none() {
            let Some(call) = self.queue.pop_front() else {
                break;
            };
            self.run(call);
        }
    }

    fn run(&mut self, call: NativeCall) {
        let result = self.perform(&call.method, &call.args);
        call.respond(result);
    }

    fn perform(&mut self, method: &str, args: &Value) -> NativeResult<Value> {
        match method {
            METHOD_EXECUTE => self.execute(&SqlOperation::from_args(args)?),
            METHOD_INSERT => self.insert(&SqlOperation::from_args(args)?),
            METHOD_UPDATE => self.update(&SqlOperation::from_args(args)?),
            METHOD_QUERY => self.query(&SqlOperation::from_args(args)?),
            METHOD_QUERY_CURSOR_NEXT => self.query_cursor_next(args),
            METHOD_BATCH => self.batch(args),
            other => Err(NativeError::not_implemented(other)),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn execute(&mut self, op: &SqlOperation) -> NativeResult<Value> {
        let change = op.in_transaction_change;
        let entering = change == Some(true) && op.transaction == TransactionTag::Null;

        if entering {
            self.last_transaction_id += 1;
            self.current_transaction_id = Some(self.last_transaction_id);
        }

        let outcome = self.execute_sql(op);

        // A failed COMMIT/ROLLBACK still ends the span if SQLite left the
        // transaction.
        if change == Some(false) && (outcome.is_ok() || self.connection.is_autocommit()) {
            self.current_transaction_id = None;
        }

        match outcome {
            Err(err) => {
                if entering {
                    self.current_transaction_id = None;
                }
                Err(err)
            }
            Ok(()) => match self.current_transaction_id.filter(|_| entering) {
                Some(id) => {
                    let mut result = ValueMap::new();
                    result.insert(PARAM_TRANSACTION_ID.to_string(), Value::Int(id));
                    Ok(Value::Map(result))
                }
                None => Ok(Value::Null),
            },
        }
    }

    fn execute_sql(&mut self, op: &SqlOperation) -> NativeResult<()> {
        if self.log_level.has_sql() {
            debug!(db = self.id, sql = %op.sql, arguments = ?op.arguments, "execute");
        }

        if op.arguments.is_empty() {
            return self.connection.execute_batch(&op.sql).map_err(|e| op.error(e));
        }

        let mut statement = self.connection.prepare(&op.sql).map_err(|e| op.error(e))?;
        let mut rows = statement
            .query(params_from_iter(op.arguments.iter().map(SqlArg)))
            .map_err(|e| op.error(e))?;
        while rows.next().map_err(|e| op.error(e))?.is_some() {}
        Ok(())
    }

    fn insert(&mut self, op: &SqlOperation) -> NativeResult<Value> {
        self.execute_sql(op)?;
        if op.no_result {
            return Ok(Value::Null);
        }

        if self.connection.changes() == 0 {
            if self.log_level.has_sql() {
                debug!(db = self.id, "no changes (id was {})", self.connection.last_insert_rowid());
            }
            return Ok(Value::Null);
        }

        let id = self.connection.last_insert_rowid();
        if self.log_level.has_sql() {
            debug!(db = self.id, "inserted {}", id);
        }
        Ok(Value::Int(id))
    }

    fn update(&mut self, op: &SqlOperation) -> NativeResult<Value> {
        self.execute_sql(op)?;
        if op.no_result {
            return Ok(Value::Null);
        }

        let changed = self.connection.changes() as i64;
        if self.log_level.has_sql() {
            debug!(db = self.id, "changed {}", changed);
        }
        Ok(Value::Int(changed))
    }

    fn select(&mut self, op: &SqlOperation) -> NativeResult<(Vec<Value>, Vec<Value>)> {
        if self.log_level.has_sql() {
            debug!(db = self.id, sql = %op.sql, arguments = ?op.arguments, "query");
        }

        let mut statement = self.connection.prepare(&op.sql).map_err(|e| op.error(e))?;
        let columns: Vec<Value> = statement
            .column_names()
            .into_iter()
            .map(Value::from)
            .collect();
        let count = columns.len();

        let mut rows = statement
            .query(params_from_iter(op.arguments.iter().map(SqlArg)))
            .map_err(|e| op.error(e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| op.error(e))? {
            let mut values = Vec::with_capacity(count);
            for i in 0..count {
                values.push(column_value(row.get_ref(i).map_err(|e| op.error(e))?));
            }
            out.push(Value::List(values));
        }

        Ok((columns, out))
    }

    fn query(&mut self, op: &SqlOperation) -> NativeResult<Value> {
        let (columns, rows) = self.select(op)?;

        let Some(page_size) = op.cursor_page_size else {
            return Ok(result_set(columns, rows, None));
        };

        let mut rows: VecDeque<Value> = rows.into();
        let take = page_size.min(rows.len());
        let page: Vec<Value> = rows.drain(..take).collect();

        if rows.is_empty() {
            return Ok(result_set(columns, page, None));
        }

        self.last_cursor_id += 1;
        let cursor_id = self.last_cursor_id;
        if self.log_level.has_verbose() {
            debug!(db = self.id, cursor = cursor_id, remaining = rows.len(), "cursor opened");
        }
        self.cursors.insert(
            cursor_id,
            DriverCursor {
                columns: columns.clone(),
                rows,
                page_size,
            },
        );
        Ok(result_set(columns, page, Some(cursor_id)))
    }

    fn query_cursor_next(&mut self, args: &Value) -> NativeResult<Value> {
        let cursor_id = args
            .get(PARAM_CURSOR_ID)
            .and_then(Value::as_i64)
            .ok_or_else(|| NativeError::bad_param("cursorId is required"))?;

        if flag(args, PARAM_CANCEL) {
            if self.log_level.has_verbose() {
                debug!(db = self.id, cursor = cursor_id, "cursor cancel");
            }
            self.cursors.remove(&cursor_id);
            return Ok(Value::Null);
        }

        let cursor = self
            .cursors
            .get_mut(&cursor_id)
            .ok_or_else(|| NativeError::sqlite(format!("Cursor {} not found", cursor_id)))?;

        let take = cursor.page_size.min(cursor.rows.len());
        let page: Vec<Value> = cursor.rows.drain(..take).collect();
        let columns = cursor.columns.clone();

        if cursor.rows.is_empty() {
            self.cursors.remove(&cursor_id);
            if self.log_level.has_verbose() {
                debug!(db = self.id, cursor = cursor_id, "cursor exhausted");
            }
            Ok(result_set(columns, page, None))
        } else {
            Ok(result_set(columns, page, Some(cursor_id)))
        }
    }

    // =========================================================================
    // Batch
    // =========================================================================

    fn batch(&mut self, args: &Value) -> NativeResult<Value> {
        let no_result = flag(args, PARAM_NO_RESULT);
        let continue_on_error = flag(args, PARAM_CONTINUE_ON_ERROR);
        let operations = args
            .get(PARAM_OPERATIONS)
            .and_then(Value::as_list)
            .ok_or_else(|| NativeError::bad_param("operations is required"))?;

        let mut results = Vec::with_capacity(operations.len());
        for element in operations {
            let op = SqlOperation::from_batch_element(element, no_result)?;
            let outcome = match op.method.as_deref() {
                Some(METHOD_EXECUTE) => self.execute_sql(&op).map(|()| Value::Null),
                Some(METHOD_INSERT) => self.insert(&op),
                Some(METHOD_UPDATE) => self.update(&op),
                Some(METHOD_QUERY) => self.query(&op),
                other => {
                    return Err(NativeError::bad_param(format!(
                        "Batch method '{}' not supported",
                        other.unwrap_or("unknown")
                    )))
                }
            };

            match outcome {
                Ok(value) => results.push(slot(PARAM_RESULT, value)),
                Err(err) if continue_on_error => results.push(slot(PARAM_ERROR, err.to_value())),
                Err(err) => return Err(err),
            }
        }

        if no_result {
            Ok(Value::Null)
        } else {
            Ok(Value::List(results))
        }
    }

    /// Closes the connection, failing every queued call.
    pub(crate) fn close(mut self) {
        if !self.cursors.is_empty() && self.log_level.has_sql() {
            debug!(db = self.id, "{} cursor(s) are left opened", self.cursors.len());
        }
        for call in self.queue.drain(..) {
            call.respond(Err(NativeError::sqlite(format!("database_closed {}", self.id))));
        }
        if let Err((_, err)) = self.connection.close() {
            warn!(db = self.id, "failed to close database: {}", err);
        }
    }
}

fn result_set(columns: Vec<Value>, rows: Vec<Value>, cursor_id: Option<i64>) -> Value {
    let mut map = ValueMap::new();
    map.insert(PARAM_COLUMNS.to_string(), Value::List(columns));
    map.insert(PARAM_ROWS.to_string(), Value::List(rows));
    if let Some(cursor_id) = cursor_id {
        map.insert(PARAM_CURSOR_ID.to_string(), Value::Int(cursor_id));
    }
    Value::Map(map)
}

fn slot(key: &str, value: Value) -> Value {
    let mut map = ValueMap::new();
    map.insert(key.to_string(), value);
    Value::Map(map)
}
