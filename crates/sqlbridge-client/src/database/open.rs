//! Open sequence: native open, configure, version migration, open callback.

use tracing::{debug, info, warn};

use sqlbridge_common::constants::{
    is_in_memory_path, METHOD_DELETE_DATABASE, METHOD_EXECUTE, METHOD_OPEN_DATABASE, PARAM_ID,
    PARAM_RECOVERED, PARAM_RECOVERED_IN_TRANSACTION,
};
use sqlbridge_common::Value;

use super::options::Downgrade;
use super::Database;
use crate::args;
use crate::error::{SqliteError, SqliteResult};
use crate::transaction::Transaction;

impl Database {
    /// Opens the native connection and runs the open callbacks.
    ///
    /// On failure the connection is closed again.
    pub(crate) async fn open(&self) -> SqliteResult<()> {
        self.options().validate()?;
        let id = self.open_native().await?;
        self.set_native_id(Some(id));
        debug!(path = %self.path(), id, "database opened");

        let result = self.run_open_callbacks().await;
        self.set_open_transaction(None);
        if let Err(e) = result {
            warn!(path = %self.path(), "error during open, closing: {}", e);
            self.close_native().await;
            return Err(e);
        }
        Ok(())
    }

    /// Invokes `openDatabase` and returns the native id.
    ///
    /// A connection the native layer recovered in the middle of a
    /// transaction is rolled back first, ignoring errors.
    async fn open_native(&self) -> SqliteResult<i64> {
        let read_only = self.read_only();
        let single_instance =
            self.options().is_single_instance() && !is_in_memory_path(self.path());
        let result = self
            .invoke(
                METHOD_OPEN_DATABASE,
                args::open_args(self.path(), read_only, single_instance),
            )
            .await?;

        match &result {
            Value::Int(id) => Ok(*id),
            Value::Map(_) => {
                let id = result
                    .get(PARAM_ID)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        SqliteError::open_failed(format!("no database id returned for {}", self.path()))
                    })?;
                if result.get(PARAM_RECOVERED).and_then(Value::as_bool) == Some(true) {
                    debug!(path = %self.path(), id, "recovered native connection");
                }
                let in_transaction = result
                    .get(PARAM_RECOVERED_IN_TRANSACTION)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if in_transaction && !read_only {
                    if let Err(e) = self
                        .invoke(METHOD_EXECUTE, args::forced_rollback_args(id))
                        .await
                    {
                        warn!(path = %self.path(), id, "ignoring recovered database ROLLBACK error: {}", e);
                    }
                }
                Ok(id)
            }
            other => Err(SqliteError::open_failed(format!(
                "unsupported open result type {}",
                other.type_name()
            ))),
        }
    }

    async fn run_open_callbacks(&self) -> SqliteResult<()> {
        let options = self.options().clone();

        if let Some(on_configure) = &options.on_configure {
            on_configure(self.clone()).await?;
        }

        if let Some(version) = options.version {
            let old_version = self.txn_get_version(None).await?;
            if old_version != version {
                let db = self.clone();
                let migrated = self
                    .exclusive_transaction(move |txn| async move { db.migrate(txn, version).await })
                    .await;
                // on_open runs outside the ended migration transaction
                self.set_open_transaction(None);
                migrated?;
            }
        }

        if let Some(on_open) = &options.on_open {
            on_open(self.clone()).await?;
        }
        Ok(())
    }

    /// Runs inside the exclusive migration transaction.
    async fn migrate(&self, txn: Transaction, version: i32) -> SqliteResult<()> {
        self.set_open_transaction(Some(txn.clone()));
        let old_version = self.txn_get_version(Some(&txn)).await?;
        let options = self.options().clone();

        if old_version == 0 {
            info!(path = %self.path(), version, "creating database");
            if let Some(on_create) = &options.on_create {
                on_create(self.clone(), version).await?;
            } else if let Some(on_upgrade) = &options.on_upgrade {
                on_upgrade(self.clone(), 0, version).await?;
            }
        } else if version > old_version {
            info!(path = %self.path(), old_version, version, "upgrading database");
            if let Some(on_upgrade) = &options.on_upgrade {
                on_upgrade(self.clone(), old_version, version).await?;
            }
        } else if version < old_version {
            info!(path = %self.path(), old_version, version, "downgrading database");
            match options.downgrade() {
                Downgrade::Callback(on_downgrade) => {
                    on_downgrade(self.clone(), old_version, version).await?
                }
                Downgrade::DeleteAndRecreate => self.downgrade_by_delete(version).await?,
            }
            // the downgrade may have replaced the connection and its transaction
            if let Some(current) = self.open_transaction() {
                if !current.ptr_eq(&txn) {
                    txn.set_id(current.id());
                }
            }
        }

        if old_version != version {
            let current = self.open_transaction().unwrap_or(txn);
            self.txn_set_version(Some(&current), version).await?;
        }
        Ok(())
    }

    /// Deletes the file, reopens it and recreates the schema inside a new
    /// exclusive transaction.
    async fn downgrade_by_delete(&self, version: i32) -> SqliteResult<()> {
        self.close_native().await;
        if let Some(stale) = self.open_transaction() {
            stale.set_id(None);
        }
        self.invoke(METHOD_DELETE_DATABASE, args::path_args(self.path()))
            .await?;

        let id = self.open_native().await?;
        self.set_native_id(Some(id));
        debug!(path = %self.path(), id, "database reopened after delete");

        let options = self.options().clone();
        let configured = match &options.on_configure {
            Some(on_configure) => on_configure(self.clone()).await,
            None => Ok(()),
        };
        // the enclosing migration still ends a transaction on this connection
        let txn = self.begin_transaction(true).await?;
        self.set_open_transaction(Some(txn));
        configured?;

        if let Some(on_create) = &options.on_create {
            on_create(self.clone(), version).await?;
        }
        Ok(())
    }
}
