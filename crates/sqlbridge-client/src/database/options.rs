//! Options for opening a database.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::Database;
use crate::error::{SqliteError, SqliteResult};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `on_configure` / `on_open` callback.
pub type DatabaseCallback = Arc<dyn Fn(Database) -> BoxFuture<'static, SqliteResult<()>> + Send + Sync>;

/// `on_create` callback, receiving the requested version.
pub type CreateCallback =
    Arc<dyn Fn(Database, i32) -> BoxFuture<'static, SqliteResult<()>> + Send + Sync>;

/// `on_upgrade` / `on_downgrade` callback, receiving `(old, new)` versions.
pub type MigrationCallback =
    Arc<dyn Fn(Database, i32, i32) -> BoxFuture<'static, SqliteResult<()>> + Send + Sync>;

/// What happens when the stored version is above the requested one.
#[derive(Clone)]
pub(crate) enum Downgrade {
    /// Delete the file, reopen it and run `on_create`.
    DeleteAndRecreate,
    /// Run a caller callback.
    Callback(MigrationCallback),
}

/// How to open a database.
///
/// Version callbacks run inside one exclusive transaction. Every operation
/// they issue through the [`Database`] they receive joins that transaction.
#[derive(Clone)]
pub struct OpenOptions {
    pub(crate) version: Option<i32>,
    pub(crate) read_only: bool,
    pub(crate) single_instance: bool,
    pub(crate) on_configure: Option<DatabaseCallback>,
    pub(crate) on_create: Option<CreateCallback>,
    pub(crate) on_upgrade: Option<MigrationCallback>,
    pub(crate) on_downgrade: Option<Downgrade>,
    pub(crate) on_open: Option<DatabaseCallback>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            version: None,
            read_only: false,
            single_instance: true,
            on_configure: None,
            on_create: None,
            on_upgrade: None,
            on_downgrade: None,
            on_open: None,
        }
    }
}

impl OpenOptions {
    /// Creates default options: read-write, single instance, no version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema version stored in `PRAGMA user_version`. Must not be 0.
    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    /// Opens the database read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Shares one connection per path.
    pub fn single_instance(mut self, single_instance: bool) -> Self {
        self.single_instance = single_instance;
        self
    }

    /// Runs first, before any version check (e.g. `PRAGMA foreign_keys = ON`).
    pub fn on_configure<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Database) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SqliteResult<()>> + Send + 'static,
    {
        let callback: DatabaseCallback =
            Arc::new(move |db| -> BoxFuture<'static, SqliteResult<()>> { Box::pin(callback(db)) });
        self.on_configure = Some(callback);
        self
    }

    /// Runs when the stored version is 0.
    pub fn on_create<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Database, i32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SqliteResult<()>> + Send + 'static,
    {
        let callback: CreateCallback =
            Arc::new(move |db, version| -> BoxFuture<'static, SqliteResult<()>> {
                Box::pin(callback(db, version))
            });
        self.on_create = Some(callback);
        self
    }

    /// Runs when the requested version is above the stored one. Also used
    /// from version 0 when there is no `on_create`.
    pub fn on_upgrade<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Database, i32, i32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SqliteResult<()>> + Send + 'static,
    {
        let callback: MigrationCallback =
            Arc::new(move |db, old, new| -> BoxFuture<'static, SqliteResult<()>> {
                Box::pin(callback(db, old, new))
            });
        self.on_upgrade = Some(callback);
        self
    }

    /// Runs when the requested version is below the stored one.
    pub fn on_downgrade<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Database, i32, i32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SqliteResult<()>> + Send + 'static,
    {
        let callback: MigrationCallback =
            Arc::new(move |db, old, new| -> BoxFuture<'static, SqliteResult<()>> {
                Box::pin(callback(db, old, new))
            });
        self.on_downgrade = Some(Downgrade::Callback(callback));
        self
    }

    /// On downgrade, deletes the database and recreates it through
    /// `on_create`. This is also what happens when a version is set and no
    /// downgrade callback is given.
    pub fn on_downgrade_delete(mut self) -> Self {
        self.on_downgrade = Some(Downgrade::DeleteAndRecreate);
        self
    }

    /// Runs last, after any migration.
    pub fn on_open<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Database) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SqliteResult<()>> + Send + 'static,
    {
        let callback: DatabaseCallback =
            Arc::new(move |db| -> BoxFuture<'static, SqliteResult<()>> { Box::pin(callback(db)) });
        self.on_open = Some(callback);
        self
    }

    /// Requested schema version.
    pub fn get_version(&self) -> Option<i32> {
        self.version
    }

    /// True for read-only options.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True if the connection is shared per path.
    pub fn is_single_instance(&self) -> bool {
        self.single_instance
    }

    /// Checks the option combination.
    pub fn validate(&self) -> SqliteResult<()> {
        match self.version {
            Some(0) => Err(SqliteError::invalid_argument("version cannot be set to 0")),
            Some(_) => Ok(()),
            None => {
                if self.on_create.is_some() {
                    return Err(SqliteError::invalid_argument(
                        "on_create must be null if no version is specified",
                    ));
                }
                if self.on_upgrade.is_some() {
                    return Err(SqliteError::invalid_argument(
                        "on_upgrade must be null if no version is specified",
                    ));
                }
                if self.on_downgrade.is_some() {
                    return Err(SqliteError::invalid_argument(
                        "on_downgrade must be null if no version is specified",
                    ));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn downgrade(&self) -> Downgrade {
        self.on_downgrade
            .clone()
            .unwrap_or(Downgrade::DeleteAndRecreate)
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("version", &self.version)
            .field("read_only", &self.read_only)
            .field("single_instance", &self.single_instance)
            .field("on_configure", &self.on_configure.is_some())
            .field("on_create", &self.on_create.is_some())
            .field("on_upgrade", &self.on_upgrade.is_some())
            .field(
                "on_downgrade",
                &match &self.on_downgrade {
                    None => "default",
                    Some(Downgrade::DeleteAndRecreate) => "delete",
                    Some(Downgrade::Callback(_)) => "callback",
                },
            )
            .field("on_open", &self.on_open.is_some())
            .finish()
    }
}
