//! Decoding of operation arguments and conversion to and from SQLite types.

use bytes::Bytes;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

use sqlbridge_common::constants::{
    ERROR_OPEN_FAILED, ERROR_SQLITE, PARAM_CURSOR_PAGE_SIZE, PARAM_IN_TRANSACTION,
    PARAM_IN_TRANSACTION_CHANGE, PARAM_METHOD, PARAM_NO_RESULT, PARAM_SQL, PARAM_SQL_ARGUMENTS,
    PARAM_TRANSACTION_ID,
};
use sqlbridge_common::value::ValueError;
use sqlbridge_common::{NativeError, NativeResult, Value};

/// How the caller identified the transaction of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionTag {
    /// No `transactionId` key.
    Absent,
    /// `transactionId` present and null: a BEGIN asking for a new id.
    Null,
    /// An explicit id, possibly the force sentinel.
    Id(i64),
}

impl TransactionTag {
    pub(crate) fn id(self) -> Option<i64> {
        match self {
            TransactionTag::Id(id) => Some(id),
            _ => None,
        }
    }
}

/// A decoded SQL operation (single call or batch element).
#[derive(Debug, Clone)]
pub(crate) struct SqlOperation {
    pub method: Option<String>,
    pub sql: String,
    pub arguments: Vec<Value>,
    pub transaction: TransactionTag,
    pub in_transaction_change: Option<bool>,
    pub no_result: bool,
    pub cursor_page_size: Option<usize>,
}

impl SqlOperation {
    /// Decodes the arguments of an `execute`/`insert`/`update`/`query` call.
    pub(crate) fn from_args(args: &Value) -> NativeResult<Self> {
        let sql = args
            .get(PARAM_SQL)
            .and_then(Value::as_str)
            .ok_or_else(|| NativeError::bad_param("sql is required"))?
            .to_string();

        let arguments = match args.get(PARAM_SQL_ARGUMENTS) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::List(items)) => items.clone(),
            Some(other) => {
                return Err(NativeError::bad_param(format!(
                    "arguments must be a list, got {}",
                    other.type_name()
                )))
            }
        };

        let transaction = match args.get(PARAM_TRANSACTION_ID) {
            None => TransactionTag::Absent,
            Some(Value::Null) => TransactionTag::Null,
            Some(Value::Int(id)) => TransactionTag::Id(*id),
            Some(other) => {
                return Err(NativeError::bad_param(format!(
                    "transactionId must be an integer, got {}",
                    other.type_name()
                )))
            }
        };

        let in_transaction_change = args
            .get(PARAM_IN_TRANSACTION_CHANGE)
            .or_else(|| args.get(PARAM_IN_TRANSACTION))
            .and_then(Value::as_bool);

        let cursor_page_size = args
            .get(PARAM_CURSOR_PAGE_SIZE)
            .and_then(Value::as_i64)
            .filter(|size| *size > 0)
            .map(|size| size as usize);

        Ok(Self {
            method: args.get(PARAM_METHOD).and_then(Value::as_str).map(str::to_string),
            sql,
            arguments,
            transaction,
            in_transaction_change,
            no_result: flag(args, PARAM_NO_RESULT),
            cursor_page_size,
        })
    }

    /// Decodes one batch element, inheriting the batch level `noResult`.
    pub(crate) fn from_batch_element(element: &Value, no_result: bool) -> NativeResult<Self> {
        let mut operation = Self::from_args(element)?;
        operation.no_result = no_result;
        operation.cursor_page_size = None;
        Ok(operation)
    }

    /// Diagnostic payload attached to errors: `{sql, arguments}`.
    pub(crate) fn error_data(&self) -> Value {
        vec![
            (PARAM_SQL, Value::from(self.sql.as_str())),
            (PARAM_SQL_ARGUMENTS, Value::List(self.arguments.clone())),
        ]
        .into_iter()
        .collect()
    }

    /// Wraps a rusqlite failure as a native error carrying this operation.
    pub(crate) fn error(&self, err: rusqlite::Error) -> NativeError {
        sqlite_error(err).with_details(self.error_data())
    }
}

/// Reads a boolean flag, treating absence as false.
pub(crate) fn flag(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Converts a rusqlite error into a native error.
///
/// SQLite failures keep the engine message verbatim and append the extended
/// result code as `(code N)`.
pub(crate) fn sqlite_error(err: rusqlite::Error) -> NativeError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let message = message.unwrap_or_else(|| failure.to_string());
            if failure.code == rusqlite::ErrorCode::CannotOpen {
                return NativeError::new(
                    ERROR_OPEN_FAILED,
                    format!("open_failed {} (code {})", message, failure.extended_code),
                );
            }
            NativeError::new(
                ERROR_SQLITE,
                format!("{} (code {})", message, failure.extended_code),
            )
        }
        other => NativeError::new(ERROR_SQLITE, other.to_string()),
    }
}

/// Binds a [`Value`] as a positional SQL parameter.
pub(crate) struct SqlArg<'a>(pub &'a Value);

impl ToSql for SqlArg<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;

        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(&b[..])),
            other => {
                return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                    ValueError::UnsupportedType(other.type_name().to_string()),
                )))
            }
        })
    }
}

/// Converts a column value read from SQLite.
pub(crate) fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Bytes(Bytes::copy_from_slice(blob)),
    }
}
