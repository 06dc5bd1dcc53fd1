//! Argument payloads for native method invocations.
//!
//! Pure functions: each one assembles the map sent with one method,
//! attaching the connection id, the transaction id and the
//! in-transaction-change flag derived from the SQL text.

use sqlbridge_common::constants::{
    PARAM_CANCEL, PARAM_CONTINUE_ON_ERROR, PARAM_CURSOR_ID, PARAM_CURSOR_PAGE_SIZE, PARAM_FORCE,
    PARAM_ID, PARAM_IN_TRANSACTION, PARAM_IN_TRANSACTION_CHANGE, PARAM_METHOD, PARAM_NO_RESULT,
    PARAM_OPERATIONS, PARAM_PATH, PARAM_READ_ONLY, PARAM_SINGLE_INSTANCE, PARAM_SQL,
    PARAM_SQL_ARGUMENTS, PARAM_TRANSACTION_ID, TRANSACTION_ID_FORCE,
};
use sqlbridge_common::{Value, ValueMap};

use crate::error::{SqliteError, SqliteResult};

/// Transaction-state change announced by a statement.
///
/// `BEGIN...` enters a transaction (`Some(true)`), `COMMIT...` and
/// `ROLLBACK...` leave it (`Some(false)`), anything else is `None`.
/// Matching is a case-insensitive prefix test.
pub fn in_transaction_change(sql: &str) -> Option<bool> {
    let sql = sql.trim_start();
    if starts_with_ignore_case(sql, "BEGIN") {
        Some(true)
    } else if starts_with_ignore_case(sql, "COMMIT") || starts_with_ignore_case(sql, "ROLLBACK") {
        Some(false)
    } else {
        None
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Rejects arguments that cannot be bound to a statement.
pub(crate) fn check_arguments(arguments: &[Value]) -> SqliteResult<()> {
    for (index, argument) in arguments.iter().enumerate() {
        if !argument.is_sql_argument() {
            return Err(SqliteError::invalid_argument(format!(
                "invalid argument {} of type {}: SQL arguments must be null, bool, int, float, string or bytes",
                index,
                argument.type_name()
            )));
        }
    }
    Ok(())
}

fn insert(map: &mut ValueMap, key: &str, value: impl Into<Value>) {
    map.insert(key.to_string(), value.into());
}

/// `{id, transactionId?}`.
pub(crate) fn base_args(id: i64, transaction_id: Option<i64>) -> ValueMap {
    let mut map = ValueMap::new();
    insert(&mut map, PARAM_ID, id);
    if let Some(transaction_id) = transaction_id {
        insert(&mut map, PARAM_TRANSACTION_ID, transaction_id);
    }
    map
}

/// `{id, transactionId?, sql, arguments}`.
pub(crate) fn sql_args(
    id: i64,
    transaction_id: Option<i64>,
    sql: &str,
    arguments: Vec<Value>,
) -> ValueMap {
    let mut map = base_args(id, transaction_id);
    insert(&mut map, PARAM_SQL, sql);
    insert(&mut map, PARAM_SQL_ARGUMENTS, Value::List(arguments));
    map
}

/// Arguments of an `execute` call.
///
/// `begin` asks the native layer to allocate a transaction id: the key
/// `transactionId` is sent explicitly as null.
pub(crate) fn execute_args(
    id: i64,
    transaction_id: Option<i64>,
    sql: &str,
    arguments: Vec<Value>,
    in_transaction_change: Option<bool>,
    begin: bool,
) -> Value {
    let mut map = sql_args(id, transaction_id, sql, arguments);
    if let Some(change) = in_transaction_change {
        insert(&mut map, PARAM_IN_TRANSACTION_CHANGE, change);
    }
    if begin {
        insert(&mut map, PARAM_TRANSACTION_ID, Value::Null);
    }
    Value::Map(map)
}

/// Arguments of `insert`, `update` or `query`.
pub(crate) fn statement_args(
    id: i64,
    transaction_id: Option<i64>,
    sql: &str,
    arguments: Vec<Value>,
) -> Value {
    Value::Map(sql_args(id, transaction_id, sql, arguments))
}

/// Arguments of a paged `query`.
pub(crate) fn cursor_query_args(
    id: i64,
    transaction_id: Option<i64>,
    sql: &str,
    arguments: Vec<Value>,
    page_size: usize,
) -> Value {
    let mut map = sql_args(id, transaction_id, sql, arguments);
    insert(
        &mut map,
        PARAM_CURSOR_PAGE_SIZE,
        i64::try_from(page_size).unwrap_or(i64::MAX),
    );
    Value::Map(map)
}

/// Arguments of `queryCursorNext`.
pub(crate) fn cursor_next_args(
    id: i64,
    transaction_id: Option<i64>,
    cursor_id: i64,
    cancel: bool,
) -> Value {
    let mut map = base_args(id, transaction_id);
    insert(&mut map, PARAM_CURSOR_ID, cursor_id);
    if cancel {
        insert(&mut map, PARAM_CANCEL, true);
    }
    Value::Map(map)
}

/// One element of a batch `operations` list.
pub(crate) fn batch_operation(method: &str, sql: &str, arguments: Vec<Value>) -> Value {
    let mut map = ValueMap::new();
    insert(&mut map, PARAM_METHOD, method);
    insert(&mut map, PARAM_SQL, sql);
    insert(&mut map, PARAM_SQL_ARGUMENTS, Value::List(arguments));
    Value::Map(map)
}

/// Arguments of `batch`.
pub(crate) fn batch_args(
    id: i64,
    transaction_id: Option<i64>,
    operations: Vec<Value>,
    no_result: bool,
    continue_on_error: bool,
) -> Value {
    let mut map = base_args(id, transaction_id);
    insert(&mut map, PARAM_OPERATIONS, Value::List(operations));
    if no_result {
        insert(&mut map, PARAM_NO_RESULT, true);
    }
    if continue_on_error {
        insert(&mut map, PARAM_CONTINUE_ON_ERROR, true);
    }
    Value::Map(map)
}

/// Arguments of `openDatabase`.
pub(crate) fn open_args(path: &str, read_only: bool, single_instance: bool) -> Value {
    let mut map = ValueMap::new();
    insert(&mut map, PARAM_PATH, path);
    if read_only {
        insert(&mut map, PARAM_READ_ONLY, true);
    }
    insert(&mut map, PARAM_SINGLE_INSTANCE, single_instance);
    Value::Map(map)
}

/// Arguments of `closeDatabase`.
pub(crate) fn close_args(id: i64, force: bool) -> Value {
    let mut map = base_args(id, None);
    if force {
        insert(&mut map, PARAM_FORCE, true);
    }
    Value::Map(map)
}

/// `ROLLBACK` issued after reopening a connection recovered mid-transaction.
///
/// Uses the force sentinel so it runs regardless of the transaction the
/// native layer still believes is open.
pub(crate) fn forced_rollback_args(id: i64) -> Value {
    let mut map = sql_args(id, Some(TRANSACTION_ID_FORCE), "ROLLBACK", Vec::new());
    insert(&mut map, PARAM_IN_TRANSACTION, false);
    Value::Map(map)
}

/// `{path}` for the path-based methods.
pub(crate) fn path_args(path: &str) -> Value {
    let mut map = ValueMap::new();
    insert(&mut map, PARAM_PATH, path);
    Value::Map(map)
}
