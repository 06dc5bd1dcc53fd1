//! # sqlbridge-client
//!
//! Asynchronous SQLite client over a native invocation gateway.
//!
//! Every call reaches the engine through one
//! [`NativeGateway`](sqlbridge_gateway::NativeGateway). This crate adds
//! everything between the caller and that gateway:
//!
//! - **Factory**: [`DatabaseFactory`] resolves paths, caches single-instance
//!   connections and runs open, close and delete
//! - **Transactions**: one writer per connection, nested transactions that
//!   reuse the outer one, and a lock-wait warning
//! - **Batches**: many operations in one round-trip with per-slot results
//! - **Results**: compact and expanded query results, typed errors
//! - **Migrations**: `PRAGMA user_version` driven create/upgrade/downgrade
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlbridge_client::{DatabaseFactory, OpenOptions, SqlExecutor, TransactionOutcome, Value};
//! use sqlbridge_common::BridgeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = DatabaseFactory::local(BridgeConfig::default())?;
//!     let db = factory
//!         .open_database(
//!             "notes.db",
//!             OpenOptions::new().version(1).on_create(|db, _version| async move {
//!                 db.execute("CREATE TABLE note (id INTEGER PRIMARY KEY, body TEXT)", vec![])
//!                     .await
//!             }),
//!         )
//!         .await?;
//!
//!     // Commits when the body returns Ok
//!     db.transaction(|txn| async move {
//!         txn.raw_insert("INSERT INTO note (body) VALUES (?)", vec![Value::from("hello")])
//!             .await
//!     })
//!     .await?;
//!
//!     let notes = db.raw_query("SELECT id, body FROM note", vec![]).await?;
//!     println!("{} notes, first: {}", notes.count(), notes[0]["body"]);
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Batches
//!
//! ```rust,ignore
//! let mut batch = db.batch();
//! batch.raw_insert("INSERT INTO note (body) VALUES (?)", vec![Value::from("a")])?;
//! batch.raw_query("SELECT COUNT(*) FROM note", vec![])?;
//! let results = batch.commit(BatchOptions::new().continue_on_error(true)).await?;
//! assert_eq!(results.len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod args;

/// Batch assembler.
pub mod batch;

/// SQL statement builder.
pub mod builder;

/// Paged query cursor.
pub mod cursor;

/// Database handle, transactions and open sequence.
pub mod database;

/// Error types.
pub mod error;

/// Operations shared by databases and transactions.
pub mod executor;

/// Database factory and single-instance registry.
pub mod factory;

/// Result decoding.
pub mod result;

/// Schema creation and stepwise migrations.
pub mod schema;

/// Connection statistics.
pub mod stats;

/// Transaction handle.
pub mod transaction;

// Re-exports
pub use args::in_transaction_change;
pub use batch::{Batch, BatchOptions};
pub use builder::{ConflictAlgorithm, QueryOptions, SqlBuilder};
pub use cursor::QueryCursor;
pub use database::{
    BoxFuture, CreateCallback, Database, DatabaseCallback, LockWarning, LockWarningCallback,
    MigrationCallback, OpenOptions,
};
pub use error::{DatabaseException, SqliteError, SqliteResult};
pub use executor::SqlExecutor;
pub use factory::DatabaseFactory;
pub use result::{BatchResult, BatchResults, QueryResult, QueryRow};
pub use schema::{create_tables, migrate, MigrateResult, Migration};
pub use sqlbridge_common::{LogLevel, Value};
pub use stats::{ConnectionStats, StatsSnapshot};
pub use transaction::{Transaction, TransactionOutcome};
