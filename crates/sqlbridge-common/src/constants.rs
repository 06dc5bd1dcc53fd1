//! Wire constants for sqlbridge.
//!
//! These strings form the contract between the client and whichever native
//! binding sits behind the gateway. Changing any of them breaks that
//! contract.

use std::time::Duration;

// =============================================================================
// Method Names
// =============================================================================

/// Opens (or reuses) a native connection.
pub const METHOD_OPEN_DATABASE: &str = "openDatabase";

/// Closes a native connection.
pub const METHOD_CLOSE_DATABASE: &str = "closeDatabase";

/// Deletes a database file and its side files.
pub const METHOD_DELETE_DATABASE: &str = "deleteDatabase";

/// Checks whether a database file exists.
pub const METHOD_DATABASE_EXISTS: &str = "databaseExists";

/// Executes a statement without a result set.
pub const METHOD_EXECUTE: &str = "execute";

/// Executes an INSERT and returns the last row id.
pub const METHOD_INSERT: &str = "insert";

/// Executes an UPDATE or DELETE and returns the change count.
pub const METHOD_UPDATE: &str = "update";

/// Executes a query and returns rows.
pub const METHOD_QUERY: &str = "query";

/// Fetches the next page of an open query cursor.
pub const METHOD_QUERY_CURSOR_NEXT: &str = "queryCursorNext";

/// Executes a list of operations in one round-trip.
pub const METHOD_BATCH: &str = "batch";

/// Returns the base directory for relative database paths.
pub const METHOD_GET_DATABASES_PATH: &str = "getDatabasesPath";

/// Writes raw bytes as a database file.
pub const METHOD_WRITE_DATABASE_BYTES: &str = "writeDatabaseBytes";

/// Reads a database file as raw bytes.
pub const METHOD_READ_DATABASE_BYTES: &str = "readDatabaseBytes";

/// Toggles native debug mode.
pub const METHOD_DEBUG: &str = "debug";

/// Sets native options such as the log level.
pub const METHOD_OPTIONS: &str = "options";

// =============================================================================
// Argument Keys
// =============================================================================

/// Connection id.
pub const PARAM_ID: &str = "id";

/// Transaction id (an integer, the force sentinel, or explicit null on BEGIN).
pub const PARAM_TRANSACTION_ID: &str = "transactionId";

/// Whether the connection is in a transaction (used by forced recovery calls).
pub const PARAM_IN_TRANSACTION: &str = "inTransaction";

/// Tri-state flag: true on BEGIN, false on COMMIT/ROLLBACK, absent otherwise.
pub const PARAM_IN_TRANSACTION_CHANGE: &str = "inTransactionChange";

/// SQL text.
pub const PARAM_SQL: &str = "sql";

/// Positional SQL arguments.
pub const PARAM_SQL_ARGUMENTS: &str = "arguments";

/// Batch operation list.
pub const PARAM_OPERATIONS: &str = "operations";

/// Suppresses results for insert/update/batch.
pub const PARAM_NO_RESULT: &str = "noResult";

/// Keeps executing a batch after a failed operation.
pub const PARAM_CONTINUE_ON_ERROR: &str = "continueOnError";

/// Database path.
pub const PARAM_PATH: &str = "path";

/// Requested schema version.
pub const PARAM_VERSION: &str = "version";

/// Opens the connection read-only.
pub const PARAM_READ_ONLY: &str = "readOnly";

/// Reuses an already opened connection for the same path.
pub const PARAM_SINGLE_INSTANCE: &str = "singleInstance";

/// Query cursor id.
pub const PARAM_CURSOR_ID: &str = "cursorId";

/// Page size for cursor based queries.
pub const PARAM_CURSOR_PAGE_SIZE: &str = "cursorPageSize";

/// Cancels (closes) a query cursor.
pub const PARAM_CANCEL: &str = "cancel";

/// Batch operation method.
pub const PARAM_METHOD: &str = "method";

/// Batch slot success payload.
pub const PARAM_RESULT: &str = "result";

/// Batch slot error payload.
pub const PARAM_ERROR: &str = "error";

/// Error code inside an error descriptor.
pub const PARAM_ERROR_CODE: &str = "code";

/// Error message inside an error descriptor.
pub const PARAM_ERROR_MESSAGE: &str = "message";

/// Vendor result code inside an error descriptor.
pub const PARAM_ERROR_RESULT_CODE: &str = "resultCode";

/// Diagnostic payload inside an error descriptor.
pub const PARAM_ERROR_DATA: &str = "data";

/// Set by open when an existing native connection was reused.
pub const PARAM_RECOVERED: &str = "recovered";

/// Set by open when the reused native connection was mid-transaction.
pub const PARAM_RECOVERED_IN_TRANSACTION: &str = "recoveredInTransaction";

/// Raw database bytes.
pub const PARAM_BYTES: &str = "bytes";

/// Forces a close even when a transaction is open.
pub const PARAM_FORCE: &str = "force";

/// Native log level.
pub const PARAM_LOG_LEVEL: &str = "logLevel";

/// Native debug toggle.
pub const PARAM_ON: &str = "on";

/// Query result column list.
pub const PARAM_COLUMNS: &str = "columns";

/// Query result row list.
pub const PARAM_ROWS: &str = "rows";

// =============================================================================
// Error Codes
// =============================================================================

/// Generic SQLite failure.
pub const ERROR_SQLITE: &str = "sqlite_error";

/// Internal failure of the binding.
pub const ERROR_INTERNAL: &str = "internal";

/// Malformed or missing argument.
pub const ERROR_BAD_PARAM: &str = "bad_param";

/// Native open failed.
pub const ERROR_OPEN_FAILED: &str = "open_failed";

/// The connection was already closed.
pub const ERROR_DATABASE_CLOSED: &str = "database_closed";

/// Method unknown to the binding.
pub const ERROR_NOT_IMPLEMENTED: &str = "not_implemented";

// =============================================================================
// Sentinels and Defaults
// =============================================================================

/// Transaction id that bypasses the current-transaction check.
pub const TRANSACTION_ID_FORCE: i64 = -1;

/// Reserved path for in-memory databases.
pub const IN_MEMORY_DATABASE_PATH: &str = ":memory:";

/// Default lock-wait warning threshold.
pub const LOCK_WARNING_DURATION_DEFAULT: Duration = Duration::from_secs(10);

/// Default page size for query cursors.
pub const QUERY_CURSOR_BUFFER_SIZE_DEFAULT: usize = 100;

/// Default capacity of the gateway work queue.
pub const WORKER_QUEUE_CAPACITY_DEFAULT: usize = 1024;

/// Side files deleted together with a database file.
pub const DATABASE_SIDE_FILE_SUFFIXES: [&str; 3] = ["-journal", "-shm", "-wal"];

/// Returns true if `path` designates an in-memory database.
pub fn is_in_memory_path(path: &str) -> bool {
    path == IN_MEMORY_DATABASE_PATH || path.starts_with("file::memory:")
}
