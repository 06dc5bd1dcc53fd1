//! Schema helpers: best-effort table creation and stepwise migrations.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::SqliteResult;
use crate::executor::SqlExecutor;
use crate::transaction::{Transaction, TransactionOutcome};

/// Runs each statement in order and returns how many succeeded.
///
/// A failing statement is logged and skipped; the remaining statements
/// still run. Meant for initial schema creation where one table that
/// cannot be created should not prevent the others.
pub async fn create_tables<E>(executor: &E, statements: &[&str]) -> usize
where
    E: SqlExecutor + ?Sized,
{
    let mut created = 0;
    for sql in statements {
        match executor.execute(sql, Vec::new()).await {
            Ok(()) => created += 1,
            Err(e) => warn!(sql = %sql, "table creation failed, continuing: {}", e),
        }
    }
    debug!(created, total = statements.len(), "schema statements applied");
    created
}

// =============================================================================
// Stepwise migrations
// =============================================================================

/// Result of one migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateResult {
    /// The step applied.
    Success,
    /// The step could not apply; the whole run rolls back.
    Failed,
}

/// One schema step, from version `n` to `n + 1`.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Applies the step inside `txn`.
    async fn migrate(&self, txn: &Transaction) -> SqliteResult<MigrateResult>;
}

/// Applies `migrations[from - 1 .. to - 1]` in one transaction.
///
/// `migrations[i]` moves the schema from version `i + 1` to `i + 2`; steps
/// past the end of the slice are skipped. Returns `true` when every step
/// succeeded. A [`MigrateResult::Failed`] step rolls the run back and
/// returns `false`; an error rolls back and propagates. Called from
/// `on_upgrade`, the steps join the migration transaction and a failed run
/// only reports `false`.
pub async fn migrate(
    database: &Database,
    from: i32,
    to: i32,
    migrations: &[Box<dyn Migration>],
) -> SqliteResult<bool> {
    let start = usize::try_from(from.saturating_sub(1)).unwrap_or(0);
    let end = usize::try_from(to.saturating_sub(1))
        .unwrap_or(0)
        .min(migrations.len());
    debug!(path = %database.path(), from, to, "migrating");

    database
        .transaction_with_outcome(false, move |txn| async move {
            let mut result = MigrateResult::Success;
            for index in start..end {
                let step = migrations[index].migrate(&txn).await.map_err(|e| {
                    warn!(step = index + 1, "migration step failed: {}", e);
                    e
                })?;
                debug!(step = index + 1, result = ?step, "migration step applied");
                if step == MigrateResult::Failed {
                    result = MigrateResult::Failed;
                }
            }
            Ok(match result {
                MigrateResult::Success => TransactionOutcome::Commit(true),
                MigrateResult::Failed => TransactionOutcome::Rollback(false),
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::OpenOptions;
    use crate::factory::DatabaseFactory;
    use sqlbridge_common::BridgeConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_failed_statement_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        let factory = DatabaseFactory::local(BridgeConfig::for_testing(dir.path())).unwrap();
        let db = factory
            .open_database(":memory:", OpenOptions::new())
            .await
            .unwrap();

        let created = create_tables(
            &db,
            &[
                "CREATE TABLE a (id INTEGER PRIMARY KEY)",
                "CREATE TABLE a (id INTEGER PRIMARY KEY)",
                "CREATE TABLE b (id INTEGER PRIMARY KEY)",
            ],
        )
        .await;
        assert_eq!(created, 2);

        let tables = db
            .raw_query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(tables.count(), 2);
        assert_eq!(tables[1]["name"], sqlbridge_common::Value::from("b"));
    }

    struct CreateTable(&'static str);

    #[async_trait]
    impl Migration for CreateTable {
        async fn migrate(&self, txn: &Transaction) -> SqliteResult<MigrateResult> {
            txn.execute(&format!("CREATE TABLE {} (id INTEGER)", self.0), vec![])
                .await?;
            Ok(MigrateResult::Success)
        }
    }

    struct Refuse;

    #[async_trait]
    impl Migration for Refuse {
        async fn migrate(&self, _txn: &Transaction) -> SqliteResult<MigrateResult> {
            Ok(MigrateResult::Failed)
        }
    }

    struct Broken;

    #[async_trait]
    impl Migration for Broken {
        async fn migrate(&self, txn: &Transaction) -> SqliteResult<MigrateResult> {
            txn.raw_query("SELECT * FROM missing", vec![]).await?;
            Ok(MigrateResult::Success)
        }
    }

    async fn tables(db: &Database) -> Vec<String> {
        db.raw_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            vec![],
        )
        .await
        .unwrap()
        .iter()
        .filter_map(|row| row.get_str("name").map(str::to_string))
        .collect()
    }

    async fn open(dir: &TempDir) -> (DatabaseFactory, Database) {
        let factory = DatabaseFactory::local(BridgeConfig::for_testing(dir.path())).unwrap();
        let db = factory
            .open_database(":memory:", OpenOptions::new())
            .await
            .unwrap();
        (factory, db)
    }

    #[tokio::test]
    async fn test_migrate_applies_only_the_requested_range() {
        let dir = TempDir::new().unwrap();
        let (_factory, db) = open(&dir).await;
        let migrations: Vec<Box<dyn Migration>> = vec![
            Box::new(CreateTable("v2")),
            Box::new(CreateTable("v3")),
            Box::new(CreateTable("v4")),
        ];

        assert!(migrate(&db, 2, 3, &migrations).await.unwrap());
        assert_eq!(tables(&db).await, vec!["v3".to_string()]);

        // the range is clamped to the available steps
        assert!(migrate(&db, 3, 10, &migrations).await.unwrap());
        assert_eq!(tables(&db).await, vec!["v3".to_string(), "v4".to_string()]);

        // nothing to do
        assert!(migrate(&db, 4, 4, &migrations).await.unwrap());
        assert_eq!(db.stats().commits, 3);
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back_the_run() {
        let dir = TempDir::new().unwrap();
        let (_factory, db) = open(&dir).await;
        let migrations: Vec<Box<dyn Migration>> = vec![
            Box::new(CreateTable("v2")),
            Box::new(Refuse),
            Box::new(CreateTable("v4")),
        ];

        assert!(!migrate(&db, 1, 4, &migrations).await.unwrap());
        assert!(tables(&db).await.is_empty());
        assert_eq!(db.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_step_error_propagates_and_rolls_back() {
        let dir = TempDir::new().unwrap();
        let (_factory, db) = open(&dir).await;
        let migrations: Vec<Box<dyn Migration>> =
            vec![Box::new(CreateTable("v2")), Box::new(Broken)];

        let err = migrate(&db, 1, 3, &migrations).await.unwrap_err();
        assert!(err
            .as_database_exception()
            .map_or(false, |e| e.is_no_such_table(Some("missing"))));
        assert!(tables(&db).await.is_empty());
    }
}
