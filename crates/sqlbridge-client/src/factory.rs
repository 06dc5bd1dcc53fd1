//! Database factory.
//!
//! The factory is the explicit registry every connection is opened
//! through. It owns the gateway handle, the single-instance cache keyed by
//! resolved path, and the lock-wait warning shared by its databases.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use sqlbridge_common::constants::{
    is_in_memory_path, METHOD_DATABASE_EXISTS, METHOD_DEBUG, METHOD_DELETE_DATABASE,
    METHOD_GET_DATABASES_PATH, METHOD_OPTIONS, METHOD_READ_DATABASE_BYTES,
    METHOD_WRITE_DATABASE_BYTES, PARAM_BYTES, PARAM_LOG_LEVEL, PARAM_ON, PARAM_PATH,
};
use sqlbridge_common::{BridgeConfig, LogLevel, Value};
use sqlbridge_gateway::{LocalGateway, NativeGateway};

use crate::args;
use crate::database::{Database, LockWarning, OpenOptions, Registry};
use crate::error::{SqliteError, SqliteResult};

struct FactoryInner {
    gateway: Arc<dyn NativeGateway>,
    config: BridgeConfig,
    databases_path: RwLock<Option<String>>,
    registry: Arc<Registry>,
    lock_warning: Arc<RwLock<LockWarning>>,
    /// Serializes opens so two callers never race on one single-instance path.
    open_lock: tokio::sync::Mutex<()>,
}

/// Opens, caches, closes and deletes databases.
///
/// Cheap to clone. Databases opened with `single_instance` (the default)
/// are cached by resolved path until closed, so opening the same path
/// twice returns the same [`Database`].
///
/// # Example
///
/// ```rust,ignore
/// let factory = DatabaseFactory::local(BridgeConfig::default())?;
/// let db = factory
///     .open_database("app.db", OpenOptions::new().version(1).on_create(|db, _| async move {
///         db.execute("CREATE TABLE note (id INTEGER PRIMARY KEY, body TEXT)", vec![]).await
///     }))
///     .await?;
/// ```
#[derive(Clone)]
pub struct DatabaseFactory {
    inner: Arc<FactoryInner>,
}

impl DatabaseFactory {
    /// Creates a factory over any gateway.
    pub fn new(gateway: Arc<dyn NativeGateway>, config: BridgeConfig) -> Self {
        let lock_warning = LockWarning::logging(config.lock_warning_duration());
        Self {
            inner: Arc::new(FactoryInner {
                gateway,
                config,
                databases_path: RwLock::new(None),
                registry: Arc::new(Mutex::new(HashMap::new())),
                lock_warning: Arc::new(RwLock::new(lock_warning)),
                open_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Creates a factory over the bundled rusqlite driver.
    pub fn local(config: BridgeConfig) -> io::Result<Self> {
        let gateway = LocalGateway::spawn(config.clone())?;
        Ok(Self::new(Arc::new(gateway), config))
    }

    /// The configuration the factory was created with.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    async fn invoke(&self, method: &str, args: Value) -> SqliteResult<Value> {
        self.inner
            .gateway
            .invoke(method, args)
            .await
            .map_err(SqliteError::from)
    }

    // =========================================================================
    // Paths
    // =========================================================================

    /// Base directory for relative paths, asked from the native layer once.
    pub async fn get_databases_path(&self) -> SqliteResult<String> {
        if let Some(path) = self.inner.databases_path.read().clone() {
            return Ok(path);
        }
        let result = self.invoke(METHOD_GET_DATABASES_PATH, Value::Null).await?;
        let path = result
            .as_str()
            .ok_or_else(|| {
                SqliteError::decode(format!(
                    "databases path must be a string, got {}",
                    result.type_name()
                ))
            })?
            .to_string();
        *self.inner.databases_path.write() = Some(path.clone());
        Ok(path)
    }

    /// Overrides the base directory for relative paths.
    pub fn set_databases_path(&self, path: impl AsRef<Path>) -> SqliteResult<()> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(SqliteError::invalid_argument(format!(
                "databases path must be absolute: {}",
                path.display()
            )));
        }
        *self.inner.databases_path.write() = Some(path.to_string_lossy().into_owned());
        Ok(())
    }

    /// Resolves `path` against the databases path. In-memory and absolute
    /// paths are returned unchanged.
    pub async fn resolve_path(&self, path: &str) -> SqliteResult<String> {
        if path.is_empty() {
            return Err(SqliteError::invalid_argument("path must not be empty"));
        }
        if is_in_memory_path(path) || Path::new(path).is_absolute() {
            return Ok(path.to_string());
        }
        let base = self.get_databases_path().await?;
        Ok(Path::new(&base).join(path).to_string_lossy().into_owned())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens a database, reusing the cached instance for a single-instance
    /// path that is already open.
    pub async fn open_database(&self, path: &str, options: OpenOptions) -> SqliteResult<Database> {
        let path = self.resolve_path(path).await?;
        let single_instance = options.is_single_instance() && !is_in_memory_path(&path);

        let _open = self.inner.open_lock.lock().await;
        if single_instance {
            if let Some(db) = self.inner.registry.lock().get(&path).cloned() {
                debug!(path = %path, "reusing single instance database");
                return Ok(db);
            }
        }

        let db = Database::new(
            path.clone(),
            options,
            self.inner.gateway.clone(),
            self.inner.lock_warning.clone(),
            self.inner.config.cursor_page_size,
            Arc::downgrade(&self.inner.registry),
        );
        db.open().await?;

        if single_instance {
            self.inner.registry.lock().insert(path, db.clone());
        }
        Ok(db)
    }

    /// Closes the single-instance database cached for `path`, if any.
    pub async fn close_database(&self, path: &str) -> SqliteResult<()> {
        let path = self.resolve_path(path).await?;
        let db = self.inner.registry.lock().get(&path).cloned();
        match db {
            Some(db) => db.close().await,
            None => Ok(()),
        }
    }

    /// Closes any cached connection on `path` and deletes the file with
    /// its side files.
    pub async fn delete_database(&self, path: &str) -> SqliteResult<()> {
        let path = self.resolve_path(path).await?;
        let cached = self.inner.registry.lock().remove(&path);
        if let Some(db) = cached {
            if let Err(e) = db.close().await {
                warn!(path = %path, "error closing database before delete: {}", e);
            }
        }
        self.invoke(METHOD_DELETE_DATABASE, args::path_args(&path))
            .await?;
        info!(path = %path, "database deleted");
        Ok(())
    }

    /// True if the database file exists.
    pub async fn database_exists(&self, path: &str) -> SqliteResult<bool> {
        let path = self.resolve_path(path).await?;
        let result = self
            .invoke(METHOD_DATABASE_EXISTS, args::path_args(&path))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Number of cached single-instance databases.
    pub fn open_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Closes every cached database. All are attempted; the first error is
    /// returned.
    pub async fn close_all(&self) -> SqliteResult<()> {
        let databases: Vec<Database> = self.inner.registry.lock().values().cloned().collect();
        let mut first_error = None;
        for db in databases {
            if let Err(e) = db.close().await {
                warn!(path = %db.path(), "error closing database: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // =========================================================================
    // Raw bytes
    // =========================================================================

    /// Writes `bytes` as the database file at `path`.
    pub async fn write_database_bytes(&self, path: &str, bytes: Bytes) -> SqliteResult<()> {
        let path = self.resolve_path(path).await?;
        let args: Value = vec![
            (PARAM_PATH, Value::from(path)),
            (PARAM_BYTES, Value::from(bytes)),
        ]
        .into_iter()
        .collect();
        self.invoke(METHOD_WRITE_DATABASE_BYTES, args).await?;
        Ok(())
    }

    /// Reads the database file at `path`.
    pub async fn read_database_bytes(&self, path: &str) -> SqliteResult<Bytes> {
        let path = self.resolve_path(path).await?;
        match self
            .invoke(METHOD_READ_DATABASE_BYTES, args::path_args(&path))
            .await?
        {
            Value::Bytes(bytes) => Ok(bytes),
            other => Err(SqliteError::decode(format!(
                "database bytes expected, got {}",
                other.type_name()
            ))),
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Sets the native log level.
    pub async fn set_log_level(&self, level: LogLevel) -> SqliteResult<()> {
        let args: Value = vec![(PARAM_LOG_LEVEL, Value::from(level.as_i64()))]
            .into_iter()
            .collect();
        self.invoke(METHOD_OPTIONS, args).await?;
        Ok(())
    }

    /// Toggles native debug mode.
    pub async fn set_debug(&self, on: bool) -> SqliteResult<()> {
        let args: Value = vec![(PARAM_ON, Value::from(on))].into_iter().collect();
        self.invoke(METHOD_DEBUG, args).await?;
        Ok(())
    }

    /// Replaces the lock-wait warning for every database of this factory,
    /// including those already open.
    pub fn set_lock_warning(&self, warning: LockWarning) {
        *self.inner.lock_warning.write() = warning;
    }
}

impl std::fmt::Debug for DatabaseFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseFactory")
            .field("databases_path", &*self.inner.databases_path.read())
            .field("open", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SqlExecutor;
    use tempfile::TempDir;

    fn factory(dir: &TempDir) -> DatabaseFactory {
        DatabaseFactory::local(BridgeConfig::for_testing(dir.path())).unwrap()
    }

    #[tokio::test]
    async fn test_relative_path_resolves_under_databases_path() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        let resolved = factory.resolve_path("app.db").await.unwrap();
        assert_eq!(resolved, dir.path().join("app.db").to_string_lossy());
        assert_eq!(factory.resolve_path(":memory:").await.unwrap(), ":memory:");
        assert!(factory.resolve_path("").await.is_err());
    }

    #[tokio::test]
    async fn test_set_databases_path_requires_absolute() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        assert!(factory.set_databases_path("relative/dir").is_err());
        let other = TempDir::new().unwrap();
        factory.set_databases_path(other.path()).unwrap();
        assert_eq!(
            factory.get_databases_path().await.unwrap(),
            other.path().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_single_instance_is_cached_until_closed() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        let first = factory.open_database("a.db", OpenOptions::new()).await.unwrap();
        let second = factory.open_database("a.db", OpenOptions::new()).await.unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(factory.open_count(), 1);

        factory.close_database("a.db").await.unwrap();
        assert_eq!(factory.open_count(), 0);
        assert!(!first.is_open());

        let third = factory.open_database("a.db", OpenOptions::new()).await.unwrap();
        assert!(!third.ptr_eq(&first));
        third.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_single_instance_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        let options = OpenOptions::new().single_instance(false);
        let first = factory.open_database("b.db", options.clone()).await.unwrap();
        let second = factory.open_database("b.db", options).await.unwrap();
        assert!(!first.ptr_eq(&second));
        assert_ne!(first.id(), second.id());
        assert_eq!(factory.open_count(), 0);

        first.close().await.unwrap();
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_closes_and_removes_files() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        let db = factory.open_database("c.db", OpenOptions::new()).await.unwrap();
        db.execute("CREATE TABLE t (v INTEGER)", vec![]).await.unwrap();
        assert!(factory.database_exists("c.db").await.unwrap());

        factory.delete_database("c.db").await.unwrap();
        assert!(!db.is_open());
        assert!(!factory.database_exists("c.db").await.unwrap());
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test]
    async fn test_database_bytes_round_trip() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        let db = factory.open_database("src.db", OpenOptions::new()).await.unwrap();
        db.execute("CREATE TABLE t (v TEXT)", vec![]).await.unwrap();
        db.raw_insert("INSERT INTO t VALUES (?)", vec![Value::from("kept")])
            .await
            .unwrap();
        db.close().await.unwrap();

        let bytes = factory.read_database_bytes("src.db").await.unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));
        factory.write_database_bytes("copy.db", bytes).await.unwrap();

        let copy = factory.open_database("copy.db", OpenOptions::new()).await.unwrap();
        let rows = copy.raw_query("SELECT v FROM t", vec![]).await.unwrap();
        assert_eq!(rows[0]["v"], Value::from("kept"));
        copy.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_all() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        let a = factory.open_database("x.db", OpenOptions::new()).await.unwrap();
        let b = factory.open_database("y.db", OpenOptions::new()).await.unwrap();
        assert_eq!(factory.open_count(), 2);

        factory.close_all().await.unwrap();
        assert_eq!(factory.open_count(), 0);
        assert!(!a.is_open());
        assert!(!b.is_open());
    }

    #[tokio::test]
    async fn test_native_options_accepted() {
        let dir = TempDir::new().unwrap();
        let factory = factory(&dir);

        factory.set_log_level(LogLevel::Verbose).await.unwrap();
        factory.set_debug(true).await.unwrap();
        factory.set_log_level(LogLevel::None).await.unwrap();
    }
}
