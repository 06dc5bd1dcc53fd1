//! Local SQLite driver.
//!
//! Implements the native method contract on top of `rusqlite`. It runs on
//! the gateway worker thread and is the development-time stand-in for the
//! platform bindings.

mod database;
mod operation;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use sqlbridge_common::constants::{
    is_in_memory_path, DATABASE_SIDE_FILE_SUFFIXES, METHOD_BATCH, METHOD_CLOSE_DATABASE,
    METHOD_DATABASE_EXISTS, METHOD_DEBUG, METHOD_DELETE_DATABASE, METHOD_EXECUTE,
    METHOD_GET_DATABASES_PATH, METHOD_INSERT, METHOD_OPEN_DATABASE, METHOD_OPTIONS, METHOD_QUERY,
    METHOD_QUERY_CURSOR_NEXT, METHOD_READ_DATABASE_BYTES, METHOD_UPDATE,
    METHOD_WRITE_DATABASE_BYTES, PARAM_BYTES, PARAM_FORCE, PARAM_ID, PARAM_LOG_LEVEL, PARAM_ON,
    PARAM_PATH, PARAM_READ_ONLY, PARAM_RECOVERED, PARAM_RECOVERED_IN_TRANSACTION,
    PARAM_SINGLE_INSTANCE,
};
use sqlbridge_common::{BridgeConfig, LogLevel, NativeError, NativeResult, Value, ValueMap};

use self::database::DriverDatabase;
use self::operation::flag;
use crate::worker::{CallHandler, NativeCall};

/// The rusqlite-backed native driver.
pub struct LocalDriver {
    databases_path: PathBuf,
    log_level: LogLevel,
    debug: bool,
    last_database_id: i64,
    databases: HashMap<i64, DriverDatabase>,
}

impl LocalDriver {
    /// Creates a driver from the bridge configuration.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            databases_path: config.databases_path.clone(),
            log_level: config.log_level,
            debug: false,
            last_database_id: 0,
            databases: HashMap::new(),
        }
    }

    /// Number of open connections.
    pub fn open_count(&self) -> usize {
        self.databases.len()
    }

    fn resolve_path(&self, path: &str) -> String {
        if is_in_memory_path(path) || Path::new(path).is_absolute() {
            path.to_string()
        } else {
            self.databases_path.join(path).to_string_lossy().into_owned()
        }
    }

    fn find_database_id(&self, path: &str) -> Option<i64> {
        self.databases
            .values()
            .filter(|db| db.path == path)
            .map(|db| db.id)
            .min()
    }

    fn dispatch_sql(&mut self, call: NativeCall) {
        let id = match database_id(&call.args) {
            Ok(id) => id,
            Err(err) => return call.respond(Err(err)),
        };

        match self.databases.get_mut(&id) {
            Some(database) => database.dispatch(call),
            None => call.respond(Err(closed_error(id))),
        }
    }

    // =========================================================================
    // Connection management
    // =========================================================================

    fn open_database(&mut self, args: &Value) -> NativeResult<Value> {
        let path = required_path(args)?;
        let path = self.resolve_path(path);
        let read_only = flag(args, PARAM_READ_ONLY);
        let single_instance = flag(args, PARAM_SINGLE_INSTANCE) && !is_in_memory_path(&path);

        if single_instance {
            if let Some(id) = self.find_database_id(&path) {
                let in_transaction = self
                    .databases
                    .get(&id)
                    .map(DriverDatabase::is_in_transaction)
                    .unwrap_or(false);
                if self.log_level.has_verbose() {
                    debug!(db = id, path = %path, "database already opened");
                }
                return Ok(open_result(id, Some(in_transaction)));
            }
        }

        let in_memory = is_in_memory_path(&path);
        if read_only {
            if !in_memory && !Path::new(&path).exists() {
                return Err(NativeError::open_failed(format!("open_failed {}", path)));
            }
        } else if !in_memory {
            if let Some(parent) = Path::new(&path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    NativeError::open_failed(format!("open_failed {}: {}", path, e))
                })?;
            }
        }

        self.last_database_id += 1;
        let id = self.last_database_id;
        let database = DriverDatabase::open(id, path, read_only, single_instance, self.log_level)?;

        if self.log_level.has_verbose() {
            info!(
                db = id,
                path = %database.path,
                read_only,
                single_instance = database.single_instance,
                in_memory = database.is_in_memory(),
                "opened database"
            );
        }
        self.databases.insert(id, database);
        Ok(open_result(id, None))
    }

    fn close_database(&mut self, args: &Value) -> NativeResult<Value> {
        let id = database_id(args)?;
        let force = flag(args, PARAM_FORCE);

        let Some(database) = self.databases.get(&id) else {
            if self.log_level.has_verbose() {
                debug!(db = id, "cannot close database (not found)");
            }
            return Ok(Value::Null);
        };

        if !force && database.is_in_transaction() {
            return Err(NativeError::sqlite("database in transaction"));
        }

        if let Some(database) = self.databases.remove(&id) {
            if database.queued() > 0 {
                warn!(db = id, queued = database.queued(), "closing database with queued operations");
            }
            database.close();
        }
        if self.log_level.has_verbose() {
            debug!(db = id, "closed database");
        }
        Ok(Value::Null)
    }

    fn delete_database(&mut self, args: &Value) -> NativeResult<Value> {
        let path = self.resolve_path(required_path(args)?);

        let ids: Vec<i64> = self
            .databases
            .values()
            .filter(|db| db.path == path)
            .map(|db| db.id)
            .collect();
        for id in ids {
            if let Some(database) = self.databases.remove(&id) {
                database.close();
                if self.log_level.has_verbose() {
                    debug!(db = id, "closed database for deletion");
                }
            }
        }

        if !is_in_memory_path(&path) {
            delete_database_files(&path).map_err(|e| NativeError::sqlite(e.to_string()))?;
        }
        if self.log_level.has_verbose() {
            debug!(path = %path, "deleted database");
        }
        Ok(Value::Null)
    }

    fn database_exists(&self, args: &Value) -> NativeResult<Value> {
        let path = self.resolve_path(required_path(args)?);
        let exists = !is_in_memory_path(&path) && Path::new(&path).is_file();
        if self.log_level.has_verbose() {
            debug!(path = %path, exists, "database exists?");
        }
        Ok(Value::Bool(exists))
    }

    fn write_database_bytes(&self, args: &Value) -> NativeResult<Value> {
        let path = self.resolve_path(required_path(args)?);
        let bytes = args
            .get(PARAM_BYTES)
            .and_then(Value::as_bytes)
            .ok_or_else(|| NativeError::bad_param("bytes is required"))?;

        if let Some(parent) = Path::new(&path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| NativeError::sqlite(e.to_string()))?;
        }
        std::fs::write(&path, bytes).map_err(|e| NativeError::sqlite(e.to_string()))?;
        Ok(Value::Null)
    }

    fn read_database_bytes(&self, args: &Value) -> NativeResult<Value> {
        let path = self.resolve_path(required_path(args)?);
        let bytes = std::fs::read(&path).map_err(|e| NativeError::sqlite(format!("{}: {}", path, e)))?;
        Ok(Value::Bytes(Bytes::from(bytes)))
    }

    fn options(&mut self, args: &Value) -> NativeResult<Value> {
        if let Some(level) = args.get(PARAM_LOG_LEVEL).and_then(Value::as_i64) {
            self.log_level = LogLevel::from_i64(level);
            for database in self.databases.values_mut() {
                database.set_log_level(self.log_level);
            }
            debug!(log_level = %self.log_level, "native log level changed");
        }
        Ok(Value::Null)
    }
}

impl CallHandler for LocalDriver {
    fn handle(&mut self, call: NativeCall) {
        if is_sql_method(&call.method) {
            return self.dispatch_sql(call);
        }

        let result = match call.method.as_str() {
            METHOD_OPEN_DATABASE => self.open_database(&call.args),
            METHOD_CLOSE_DATABASE => self.close_database(&call.args),
            METHOD_DELETE_DATABASE => self.delete_database(&call.args),
            METHOD_DATABASE_EXISTS => self.database_exists(&call.args),
            METHOD_GET_DATABASES_PATH => Ok(Value::from(
                self.databases_path.to_string_lossy().into_owned(),
            )),
            METHOD_WRITE_DATABASE_BYTES => self.write_database_bytes(&call.args),
            METHOD_READ_DATABASE_BYTES => self.read_database_bytes(&call.args),
            METHOD_OPTIONS => self.options(&call.args),
            METHOD_DEBUG => {
                self.debug = flag(&call.args, PARAM_ON);
                debug!(enabled = self.debug, "native debug mode");
                Ok(Value::Null)
            }
            other => Err(NativeError::not_implemented(other)),
        };
        call.respond(result);
    }

    fn shutdown(&mut self) {
        for (_, database) in self.databases.drain() {
            database.close();
        }
    }
}

fn is_sql_method(method: &str) -> bool {
    matches!(
        method,
        METHOD_EXECUTE
            | METHOD_INSERT
            | METHOD_UPDATE
            | METHOD_QUERY
            | METHOD_QUERY_CURSOR_NEXT
            | METHOD_BATCH
    )
}

fn database_id(args: &Value) -> NativeResult<i64> {
    args.get(PARAM_ID)
        .and_then(Value::as_i64)
        .ok_or_else(|| NativeError::bad_param("id is required"))
}

fn required_path(args: &Value) -> NativeResult<&str> {
    args.get(PARAM_PATH)
        .and_then(Value::as_str)
        .ok_or_else(|| NativeError::bad_param("path cannot be null"))
}

fn closed_error(id: i64) -> NativeError {
    NativeError::sqlite(format!("database_closed {}", id))
}

fn open_result(id: i64, recovered_in_transaction: Option<bool>) -> Value {
    let mut map = ValueMap::new();
    map.insert(PARAM_ID.to_string(), Value::Int(id));
    if let Some(in_transaction) = recovered_in_transaction {
        map.insert(PARAM_RECOVERED.to_string(), Value::Bool(true));
        map.insert(
            PARAM_RECOVERED_IN_TRANSACTION.to_string(),
            Value::Bool(in_transaction),
        );
    }
    Value::Map(map)
}

/// Deletes a database file and its side files. Missing files are fine.
fn delete_database_files(path: &str) -> io::Result<()> {
    let main = std::iter::once(path.to_string());
    let side = DATABASE_SIDE_FILE_SUFFIXES
        .iter()
        .map(|suffix| format!("{}{}", path, suffix));

    for file in main.chain(side) {
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Reply;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    type Pending = oneshot::Receiver<NativeResult<Value>>;

    fn send(driver: &mut LocalDriver, method: &str, args: Value) -> Pending {
        let (tx, rx) = oneshot::channel();
        driver.handle(NativeCall {
            method: method.to_string(),
            args,
            reply: Reply(tx),
        });
        rx
    }

    fn call(driver: &mut LocalDriver, method: &str, args: Value) -> NativeResult<Value> {
        let mut rx = send(driver, method, args);
        rx.try_recv().expect("reply should be immediate")
    }

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        pairs.into_iter().collect()
    }

    fn sql(id: i64, sql: &str, extra: Vec<(&str, Value)>) -> Value {
        let mut pairs = vec![("id", Value::from(id)), ("sql", Value::from(sql))];
        pairs.extend(extra);
        map(pairs)
    }

    fn open_memory(driver: &mut LocalDriver) -> i64 {
        let opened = call(driver, METHOD_OPEN_DATABASE, map(vec![("path", Value::from(":memory:"))])).unwrap();
        opened.get("id").and_then(Value::as_i64).unwrap()
    }

    fn driver(dir: &TempDir) -> LocalDriver {
        LocalDriver::new(&BridgeConfig::for_testing(dir.path()))
    }

    #[test]
    fn test_insert_update_query() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);

        call(&mut driver, METHOD_EXECUTE, sql(id, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", vec![])).unwrap();
        let rowid = call(
            &mut driver,
            METHOD_INSERT,
            sql(id, "INSERT INTO t (name) VALUES (?)", vec![("arguments", Value::List(vec![Value::from("a")]))]),
        )
        .unwrap();
        assert_eq!(rowid, Value::Int(1));

        let ignored = call(
            &mut driver,
            METHOD_INSERT,
            sql(id, "INSERT OR IGNORE INTO t (id, name) VALUES (1, 'dup')", vec![]),
        )
        .unwrap();
        assert!(ignored.is_null());

        let changed = call(&mut driver, METHOD_UPDATE, sql(id, "UPDATE t SET name = 'b'", vec![])).unwrap();
        assert_eq!(changed, Value::Int(1));

        let rows = call(&mut driver, METHOD_QUERY, sql(id, "SELECT id, name FROM t", vec![])).unwrap();
        assert_eq!(rows.get("columns"), Some(&Value::List(vec![Value::from("id"), Value::from("name")])));
        assert_eq!(
            rows.get("rows"),
            Some(&Value::List(vec![Value::List(vec![Value::Int(1), Value::from("b")])]))
        );
    }

    #[test]
    fn test_sql_error_carries_code_and_data() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);

        let err = call(&mut driver, METHOD_QUERY, sql(id, "SELECT * FROM missing", vec![])).unwrap_err();
        assert!(err.message.contains("no such table: missing"));
        assert!(err.message.contains("(code 1)"));
        let details = err.details.unwrap();
        assert_eq!(details.get("sql").and_then(Value::as_str), Some("SELECT * FROM missing"));
    }

    #[test]
    fn test_begin_assigns_transaction_id_and_queues_others() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);
        call(&mut driver, METHOD_EXECUTE, sql(id, "CREATE TABLE t (v INTEGER)", vec![])).unwrap();

        let begun = call(
            &mut driver,
            METHOD_EXECUTE,
            sql(id, "BEGIN IMMEDIATE", vec![("transactionId", Value::Null), ("inTransactionChange", Value::from(true))]),
        )
        .unwrap();
        let txn = begun.get("transactionId").and_then(Value::as_i64).unwrap();
        assert_eq!(txn, 1);

        // Not matching: held back.
        let mut queued = send(
            &mut driver,
            METHOD_INSERT,
            sql(id, "INSERT INTO t VALUES (8)", vec![("transactionId", Value::from(txn + 1))]),
        );
        assert!(queued.try_recv().is_err());

        // Matching: runs.
        call(
            &mut driver,
            METHOD_INSERT,
            sql(id, "INSERT INTO t VALUES (7)", vec![("transactionId", Value::from(txn))]),
        )
        .unwrap();
        assert!(queued.try_recv().is_err());

        call(
            &mut driver,
            METHOD_EXECUTE,
            sql(id, "COMMIT", vec![("transactionId", Value::from(txn)), ("inTransactionChange", Value::from(false))]),
        )
        .unwrap();

        assert_eq!(queued.try_recv().unwrap().unwrap(), Value::Int(2));
        let rows = call(&mut driver, METHOD_QUERY, sql(id, "SELECT v FROM t ORDER BY rowid", vec![])).unwrap();
        assert_eq!(
            rows.get("rows"),
            Some(&Value::List(vec![
                Value::List(vec![Value::Int(7)]),
                Value::List(vec![Value::Int(8)]),
            ]))
        );
    }

    #[test]
    fn test_force_bypasses_current_transaction() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);

        call(
            &mut driver,
            METHOD_EXECUTE,
            sql(id, "BEGIN", vec![("transactionId", Value::Null), ("inTransactionChange", Value::from(true))]),
        )
        .unwrap();

        call(
            &mut driver,
            METHOD_EXECUTE,
            sql(id, "ROLLBACK", vec![("transactionId", Value::from(-1_i64)), ("inTransaction", Value::from(false))]),
        )
        .unwrap();

        // Gate is open again.
        call(&mut driver, METHOD_QUERY, sql(id, "SELECT 1", vec![])).unwrap();
    }

    #[test]
    fn test_failed_begin_releases_gate() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);

        let err = call(
            &mut driver,
            METHOD_EXECUTE,
            sql(id, "BEGIN NONSENSE", vec![("transactionId", Value::Null), ("inTransactionChange", Value::from(true))]),
        );
        assert!(err.is_err());
        call(&mut driver, METHOD_QUERY, sql(id, "SELECT 1", vec![])).unwrap();
    }

    #[test]
    fn test_cursor_paging() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);
        call(
            &mut driver,
            METHOD_EXECUTE,
            sql(id, "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2), (3), (4), (5)", vec![]),
        )
        .unwrap();

        let first = call(
            &mut driver,
            METHOD_QUERY,
            sql(id, "SELECT v FROM t", vec![("cursorPageSize", Value::from(2_i64))]),
        )
        .unwrap();
        let cursor = first.get("cursorId").and_then(Value::as_i64).unwrap();
        assert_eq!(first.get("rows").and_then(Value::as_list).map(<[Value]>::len), Some(2));

        let next = map(vec![("id", Value::from(id)), ("cursorId", Value::from(cursor))]);
        let second = call(&mut driver, METHOD_QUERY_CURSOR_NEXT, next.clone()).unwrap();
        assert!(second.contains_key("cursorId"));
        let third = call(&mut driver, METHOD_QUERY_CURSOR_NEXT, next.clone()).unwrap();
        assert!(!third.contains_key("cursorId"));
        assert_eq!(third.get("rows").and_then(Value::as_list).map(<[Value]>::len), Some(1));

        // Exhausted cursors are gone.
        assert!(call(&mut driver, METHOD_QUERY_CURSOR_NEXT, next).is_err());
    }

    #[test]
    fn test_batch_continue_on_error() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);

        let op = |method: &str, sql: &str| map(vec![("method", Value::from(method)), ("sql", Value::from(sql))]);
        let operations = Value::List(vec![
            op("execute", "CREATE TABLE t (v INTEGER NOT NULL)"),
            op("insert", "INSERT INTO t VALUES (NULL)"),
            op("insert", "INSERT INTO t VALUES (1)"),
            op("query", "SELECT v FROM t"),
        ]);

        let results = call(
            &mut driver,
            METHOD_BATCH,
            map(vec![
                ("id", Value::from(id)),
                ("operations", operations.clone()),
                ("continueOnError", Value::from(true)),
            ]),
        )
        .unwrap();
        let slots = results.as_list().unwrap();
        assert_eq!(slots.len(), 4);
        assert!(slots[1].contains_key("error"));
        assert_eq!(slots[2].get("result"), Some(&Value::Int(1)));

        let err = call(
            &mut driver,
            METHOD_BATCH,
            map(vec![("id", Value::from(id)), ("operations", operations)]),
        )
        .unwrap_err();
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn test_close_in_transaction_requires_force() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let id = open_memory(&mut driver);
        call(&mut driver, METHOD_EXECUTE, sql(id, "BEGIN", vec![])).unwrap();

        let close = map(vec![("id", Value::from(id))]);
        assert!(call(&mut driver, METHOD_CLOSE_DATABASE, close.clone()).is_err());

        let forced = map(vec![("id", Value::from(id)), ("force", Value::from(true))]);
        call(&mut driver, METHOD_CLOSE_DATABASE, forced).unwrap();
        assert_eq!(driver.open_count(), 0);

        // Closing twice is fine.
        call(&mut driver, METHOD_CLOSE_DATABASE, close).unwrap();
    }

    #[test]
    fn test_single_instance_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let open = map(vec![("path", Value::from("app.db")), ("singleInstance", Value::from(true))]);

        let first = call(&mut driver, METHOD_OPEN_DATABASE, open.clone()).unwrap();
        let id = first.get("id").and_then(Value::as_i64).unwrap();
        call(&mut driver, METHOD_EXECUTE, sql(id, "CREATE TABLE t (v INTEGER)", vec![])).unwrap();
        let second = call(&mut driver, METHOD_OPEN_DATABASE, open).unwrap();
        assert_eq!(first.get("id"), second.get("id"));
        assert_eq!(second.get("recovered"), Some(&Value::Bool(true)));
        assert_eq!(second.get("recoveredInTransaction"), Some(&Value::Bool(false)));

        let path = dir.path().join("app.db");
        assert!(path.exists());
        std::fs::write(dir.path().join("app.db-wal"), b"x").unwrap();

        let exists = map(vec![("path", Value::from("app.db"))]);
        assert_eq!(call(&mut driver, METHOD_DATABASE_EXISTS, exists.clone()).unwrap(), Value::Bool(true));
        call(&mut driver, METHOD_DELETE_DATABASE, exists.clone()).unwrap();
        assert_eq!(call(&mut driver, METHOD_DATABASE_EXISTS, exists).unwrap(), Value::Bool(false));
        assert!(!dir.path().join("app.db-wal").exists());
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn test_read_only_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let err = call(
            &mut driver,
            METHOD_OPEN_DATABASE,
            map(vec![("path", Value::from("nope.db")), ("readOnly", Value::from(true))]),
        )
        .unwrap_err();
        assert!(err.message.contains("open_failed"));
    }

    #[test]
    fn test_database_bytes() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let payload = Value::from(vec![1_u8, 2, 3]);
        call(
            &mut driver,
            METHOD_WRITE_DATABASE_BYTES,
            map(vec![("path", Value::from("raw.db")), ("bytes", payload.clone())]),
        )
        .unwrap();
        let read = call(&mut driver, METHOD_READ_DATABASE_BYTES, map(vec![("path", Value::from("raw.db"))])).unwrap();
        assert_eq!(read, payload);
    }

    #[test]
    fn test_unknown_database_and_method() {
        let dir = TempDir::new().unwrap();
        let mut driver = driver(&dir);
        let err = call(&mut driver, METHOD_QUERY, sql(42, "SELECT 1", vec![])).unwrap_err();
        assert!(err.message.contains("database_closed"));

        let err = call(&mut driver, "frobnicate", Value::Null).unwrap_err();
        assert_eq!(err.code, sqlbridge_common::constants::ERROR_NOT_IMPLEMENTED);
    }
}
