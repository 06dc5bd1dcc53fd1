//! Error types for the client library.

use std::fmt;

use thiserror::Error;

use sqlbridge_common::constants::{
    ERROR_DATABASE_CLOSED, ERROR_OPEN_FAILED, PARAM_ERROR_RESULT_CODE, PARAM_SQL,
    PARAM_SQL_ARGUMENTS,
};
use sqlbridge_common::{NativeError, Value};

/// Client error type.
#[derive(Debug, Clone, Error)]
pub enum SqliteError {
    /// The native layer reported an error.
    #[error(transparent)]
    Database(#[from] DatabaseException),

    /// The transaction has already been committed or rolled back.
    #[error("transaction closed")]
    TransactionClosed,

    /// The database has no native connection (never opened or closed).
    #[error("database closed")]
    DatabaseClosed,

    /// A caller-supplied argument violates the API contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A native payload did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl SqliteError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SqliteError::InvalidArgument(message.into())
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        SqliteError::Decode(message.into())
    }

    /// Creates an `open_failed` database exception.
    pub fn open_failed(message: impl Into<String>) -> Self {
        SqliteError::Database(DatabaseException::from(NativeError::open_failed(message)))
    }

    /// Returns the database exception, if this is one.
    pub fn as_database_exception(&self) -> Option<&DatabaseException> {
        match self {
            SqliteError::Database(e) => Some(e),
            _ => None,
        }
    }

    /// True if the error means the transaction can no longer be used.
    pub fn is_transaction_closed(&self) -> bool {
        match self {
            SqliteError::TransactionClosed => true,
            SqliteError::Database(e) => e.is_transaction_closed(),
            _ => false,
        }
    }
}

impl From<NativeError> for SqliteError {
    fn from(err: NativeError) -> Self {
        SqliteError::Database(DatabaseException::from(err))
    }
}

/// Result type for client operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// An error raised by SQLite (or the native binding) for one operation.
///
/// Keeps the native message verbatim. Callers match on message fragments
/// through the `is_*` predicates, the way SQLite's own error strings are
/// meant to be consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseException {
    message: String,
    code: String,
    details: Option<Value>,
    transaction_closed: bool,
}

const NO_ACTIVE_TRANSACTION: [&str; 2] = [
    "cannot commit - no transaction is active",
    "cannot rollback - no transaction is active",
];

impl DatabaseException {
    /// Creates an exception from a message and a native code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let transaction_closed = NO_ACTIVE_TRANSACTION
            .iter()
            .any(|fragment| message.contains(fragment));
        Self {
            message,
            code: code.into(),
            details: None,
            transaction_closed,
        }
    }

    /// Attaches the diagnostic payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The native message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The native error code (`sqlite_error`, `open_failed`, ...).
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The raw diagnostic payload.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// The SQL text that failed, if known.
    pub fn sql(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get(PARAM_SQL))
            .and_then(Value::as_str)
    }

    /// The arguments bound to the failing statement, if known.
    pub fn arguments(&self) -> Option<&[Value]> {
        self.details
            .as_ref()
            .and_then(|d| d.get(PARAM_SQL_ARGUMENTS))
            .and_then(Value::as_list)
    }

    /// True if SQLite reported that no transaction was active on COMMIT or
    /// ROLLBACK.
    pub fn is_transaction_closed(&self) -> bool {
        self.transaction_closed
    }

    /// SQLite result code embedded in the message or the payload.
    ///
    /// Recognizes `(sqlite code N)`, `(code N)` and `code=N`.
    pub fn result_code(&self) -> Option<i32> {
        let lower = self.message.to_lowercase();
        for marker in ["(sqlite code ", "(code ", "code="] {
            if let Some(pos) = lower.find(marker) {
                if let Some(code) = leading_int(&lower[pos + marker.len()..]) {
                    return Some(code);
                }
            }
        }
        self.details
            .as_ref()
            .and_then(|d| d.get(PARAM_ERROR_RESULT_CODE))
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok())
    }

    /// `no such table`, optionally for a specific table.
    pub fn is_no_such_table(&self, table: Option<&str>) -> bool {
        match table {
            Some(table) => self
                .message
                .contains(&format!("no such table: {}", table)),
            None => self.message.contains("no such table"),
        }
    }

    /// `duplicate column name`, optionally for a specific column.
    pub fn is_duplicate_column(&self, column: Option<&str>) -> bool {
        match column {
            Some(column) => self
                .message
                .contains(&format!("duplicate column name: {}", column)),
            None => self.message.contains("duplicate column name"),
        }
    }

    /// SQL syntax error.
    pub fn is_syntax_error(&self) -> bool {
        self.message.contains("syntax error")
    }

    /// The database could not be opened.
    pub fn is_open_failed(&self) -> bool {
        self.code == ERROR_OPEN_FAILED || self.message.starts_with("open_failed")
    }

    /// The connection was closed under the operation.
    pub fn is_database_closed(&self) -> bool {
        self.code == ERROR_DATABASE_CLOSED
            || self.message.starts_with("database_closed")
            || self.message.contains("This database has already been closed")
    }

    /// Write attempted on a read-only database.
    pub fn is_read_only(&self) -> bool {
        self.message.contains("attempt to write a readonly database")
    }

    /// UNIQUE constraint failure, optionally on a specific `table.column`.
    pub fn is_unique_constraint(&self, field: Option<&str>) -> bool {
        self.is_constraint("unique constraint failed", field)
    }

    /// NOT NULL constraint failure, optionally on a specific `table.column`.
    pub fn is_not_null_constraint(&self, field: Option<&str>) -> bool {
        self.is_constraint("not null constraint failed", field)
    }

    fn is_constraint(&self, prefix: &str, field: Option<&str>) -> bool {
        let lower = self.message.to_lowercase();
        match field {
            Some(field) => lower.contains(&format!("{}: {}", prefix, field.to_lowercase())),
            None => lower.contains(prefix),
        }
    }
}

fn leading_int(text: &str) -> Option<i32> {
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

impl From<NativeError> for DatabaseException {
    fn from(err: NativeError) -> Self {
        let exception = DatabaseException::new(err.code, err.message);
        match err.details {
            Some(details) => exception.with_details(details),
            None => exception,
        }
    }
}

impl fmt::Display for DatabaseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatabaseException({})", self.message)?;
        if let Some(sql) = self.sql() {
            write!(f, " sql '{}'", sql)?;
            if let Some(args) = self.arguments() {
                if !args.is_empty() {
                    write!(f, " args {}", Value::List(args.to_vec()))?;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for DatabaseException {}
