//! End-to-end integration tests for sqlbridge.
//!
//! These tests run the client against the bundled rusqlite gateway and
//! check both the observable results and the exact native calls issued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlbridge_client::{
    BatchOptions, Database, LockWarning, OpenOptions, SqlExecutor, SqliteError, TransactionOutcome,
    Value,
};
use sqlbridge_common::constants::{
    METHOD_CLOSE_DATABASE, METHOD_EXECUTE, METHOD_INSERT, METHOD_OPEN_DATABASE, METHOD_QUERY,
    PARAM_ID, PARAM_TRANSACTION_ID, TRANSACTION_ID_FORCE,
};
use sqlbridge_gateway::NativeGateway;
use sqlbridge_test::{map, TestBridge};
use tokio::time::timeout;

/// Opens an in-memory database with a single-column table.
async fn open_with_table(bridge: &TestBridge) -> Database {
    let db = bridge
        .factory()
        .open_database(":memory:", OpenOptions::new())
        .await
        .expect("open failed");
    db.execute("CREATE TABLE t (v INTEGER)", vec![])
        .await
        .expect("create table failed");
    bridge.reset();
    db
}

async fn values(db: &Database) -> Vec<i64> {
    db.raw_query("SELECT v FROM t ORDER BY rowid", vec![])
        .await
        .unwrap()
        .iter()
        .filter_map(|row| row.get_i64("v"))
        .collect()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// =============================================================================
// Ordering and transactions
// =============================================================================

#[tokio::test]
async fn test_operations_run_in_submission_order() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let (a, b, c) = tokio::join!(
        db.raw_insert("INSERT INTO t VALUES (?)", vec![Value::from(1)]),
        db.raw_insert("INSERT INTO t VALUES (?)", vec![Value::from(2)]),
        db.raw_insert("INSERT INTO t VALUES (?)", vec![Value::from(3)]),
    );
    assert_eq!(a.unwrap(), Some(1));
    assert_eq!(b.unwrap(), Some(2));
    assert_eq!(c.unwrap(), Some(3));

    assert_eq!(values(&db).await, vec![1, 2, 3]);
    assert_eq!(bridge.calls(METHOD_INSERT).len(), 3);
}

#[tokio::test]
async fn test_failed_body_rolls_back_and_keeps_its_error() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let err = db
        .transaction(|txn| async move {
            txn.raw_insert("INSERT INTO t VALUES (1)", vec![]).await?;
            Err::<(), _>(SqliteError::invalid_argument("stop here"))
        })
        .await
        .unwrap_err();

    match err {
        SqliteError::InvalidArgument(message) => assert_eq!(message, "stop here"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(bridge.count("BEGIN"), 1);
    assert_eq!(bridge.count("ROLLBACK"), 1);
    assert_eq!(bridge.count("COMMIT"), 0);
    assert!(values(&db).await.is_empty());
}

#[tokio::test]
async fn test_successful_body_commits() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let id = db
        .transaction(|txn| async move { txn.raw_insert("INSERT INTO t VALUES (5)", vec![]).await })
        .await
        .unwrap();
    assert_eq!(id, Some(1));

    assert_eq!(bridge.count("BEGIN"), 1);
    assert_eq!(bridge.count("COMMIT"), 1);
    assert_eq!(bridge.count("ROLLBACK"), 0);
    assert_eq!(values(&db).await, vec![5]);
}

#[tokio::test]
async fn test_transaction_operations_carry_the_native_id() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let id = db
        .transaction(|txn| async move {
            txn.raw_insert("INSERT INTO t VALUES (1)", vec![]).await?;
            Ok(txn.id())
        })
        .await
        .unwrap();

    assert!(id.is_some());
    let insert = &bridge.calls(METHOD_INSERT)[0];
    assert_eq!(insert.args.get(PARAM_TRANSACTION_ID).and_then(Value::as_i64), id);
}

#[tokio::test]
async fn test_nested_transaction_shares_one_native_transaction() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let inner = db.clone();
    db.transaction(|txn| async move {
        txn.raw_insert("INSERT INTO t VALUES (1)", vec![]).await?;
        inner
            .transaction(|nested| async move {
                nested.raw_insert("INSERT INTO t VALUES (2)", vec![]).await
            })
            .await
    })
    .await
    .unwrap();

    assert_eq!(bridge.count("BEGIN"), 1);
    assert_eq!(bridge.count("COMMIT"), 1);
    assert_eq!(values(&db).await, vec![1, 2]);
}

#[tokio::test]
async fn test_nested_rollback_outcome_leaves_the_outer_transaction_alone() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let inner = db.clone();
    let value = db
        .transaction(|txn| async move {
            txn.raw_insert("INSERT INTO t VALUES (1)", vec![]).await?;
            inner
                .transaction_with_outcome(false, |_nested| async move {
                    Ok(TransactionOutcome::Rollback(42))
                })
                .await
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(bridge.count("BEGIN"), 1);
    assert_eq!(bridge.count("COMMIT"), 1);
    assert_eq!(bridge.count("ROLLBACK"), 0);
    assert_eq!(values(&db).await, vec![1]);
}

#[tokio::test]
async fn test_read_only_transaction_issues_no_transaction_statements() {
    let bridge = TestBridge::new();
    let factory = bridge.factory();

    let db = factory
        .open_database("ro.db", OpenOptions::new())
        .await
        .unwrap();
    db.execute("CREATE TABLE t (v INTEGER)", vec![]).await.unwrap();
    db.raw_insert("INSERT INTO t VALUES (9)", vec![]).await.unwrap();
    db.close().await.unwrap();

    let db = factory
        .open_database("ro.db", OpenOptions::new().read_only(true))
        .await
        .unwrap();
    assert!(db.read_only());
    bridge.reset();

    let rows = db
        .transaction(|txn| async move { txn.raw_query("SELECT v FROM t", vec![]).await })
        .await
        .unwrap();
    assert_eq!(rows.first_int_value(), Some(9));

    assert_eq!(bridge.count("BEGIN"), 0);
    assert_eq!(bridge.count("COMMIT"), 0);
    assert_eq!(bridge.count("ROLLBACK"), 0);
}

// =============================================================================
// Batches and results
// =============================================================================

#[tokio::test]
async fn test_batch_continue_on_error_returns_one_slot_per_operation() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let mut batch = db.batch();
    batch.raw_insert("INSERT INTO t VALUES (?)", vec![Value::from(1)]).unwrap();
    batch.raw_query("SELECT * FROM missing", vec![]).unwrap();
    batch.raw_update("UPDATE t SET v = 2", vec![]).unwrap();
    batch.raw_query("SELECT v FROM t", vec![]).unwrap();
    assert_eq!(batch.len(), 4);

    let results = batch
        .commit(BatchOptions::new().continue_on_error(true))
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results.error_count(), 1);
    assert_eq!(results[0].as_i64(), Some(1));
    assert!(results[1]
        .as_error()
        .map_or(false, |e| e.is_no_such_table(Some("missing"))));
    assert_eq!(results[2].as_i64(), Some(1));
    assert_eq!(
        results[3].as_rows().and_then(|rows| rows.first_int_value()),
        Some(2)
    );
    assert_eq!(bridge.count("BEGIN"), 1);
    assert_eq!(bridge.count("COMMIT"), 1);
}

#[tokio::test]
async fn test_batch_without_continue_on_error_fails_and_rolls_back() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let mut batch = db.batch();
    batch.raw_insert("INSERT INTO t VALUES (1)", vec![]).unwrap();
    batch.raw_query("SELECT * FROM missing", vec![]).unwrap();

    let err = batch.commit(BatchOptions::new()).await.unwrap_err();
    assert!(err
        .as_database_exception()
        .map_or(false, |e| e.is_no_such_table(None)));
    assert_eq!(bridge.count("ROLLBACK"), 1);
    assert!(values(&db).await.is_empty());
}

#[tokio::test]
async fn test_compact_result_access() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let result = db
        .raw_query(
            "SELECT 1 AS id, 'alpha' AS name UNION ALL SELECT 2, 'beta'",
            vec![],
        )
        .await
        .unwrap();

    assert_eq!(result.count(), 2);
    assert_eq!(result[0]["name"], Value::from("alpha"));
    assert_eq!(result[1].get_i64("id"), Some(2));
    assert!(result[5].is_empty());
    assert_eq!(result[5]["name"], Value::Null);
    assert_eq!(result[0]["missing"], Value::Null);
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_close_twice_closes_natively_once() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    db.close().await.unwrap();
    db.close().await.unwrap();
    assert_eq!(bridge.calls(METHOD_CLOSE_DATABASE).len(), 1);
    assert!(!db.is_open());
}

#[tokio::test]
async fn test_leaked_transaction_is_closed() {
    let bridge = TestBridge::new();
    let db = open_with_table(&bridge).await;

    let leaked = db.transaction(|txn| async move { Ok(txn) }).await.unwrap();
    let err = leaked.raw_query("SELECT 1", vec![]).await.unwrap_err();
    assert!(err.is_transaction_closed());

    assert_eq!(bridge.count("COMMIT"), 1);
    assert_eq!(bridge.calls(METHOD_QUERY).len(), 0);
}

// =============================================================================
// Versioning
// =============================================================================

#[tokio::test]
async fn test_create_persists_version_and_reopen_skips_callbacks() {
    let bridge = TestBridge::new();
    let factory = bridge.factory();
    let created = counter();
    let upgraded = counter();

    let options = {
        let created = created.clone();
        let upgraded = upgraded.clone();
        OpenOptions::new()
            .version(2)
            .on_create(move |db, version| {
                let created = created.clone();
                async move {
                    created.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(version, 2);
                    db.execute("CREATE TABLE note (body TEXT)", vec![]).await
                }
            })
            .on_upgrade(move |_db, _old, _new| {
                let upgraded = upgraded.clone();
                async move {
                    upgraded.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    };

    let db = factory.open_database("version.db", options.clone()).await.unwrap();
    assert_eq!(db.get_version().await.unwrap(), 2);
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.count("BEGIN EXCLUSIVE"), 1);
    db.close().await.unwrap();

    let db = factory.open_database("version.db", options).await.unwrap();
    assert_eq!(db.get_version().await.unwrap(), 2);
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(upgraded.load(Ordering::SeqCst), 0);
    assert_eq!(bridge.count("BEGIN EXCLUSIVE"), 1);
}

async fn create_at_version_3(bridge: &TestBridge, path: &str) {
    let db = bridge
        .factory()
        .open_database(
            path,
            OpenOptions::new().version(3).on_create(|db, _| async move {
                db.execute("CREATE TABLE old (v INTEGER)", vec![]).await
            }),
        )
        .await
        .unwrap();
    db.close().await.unwrap();
    bridge.reset();
}

#[tokio::test]
async fn test_downgrade_through_callback() {
    let bridge = TestBridge::new();
    create_at_version_3(&bridge, "down.db").await;
    let seen = Arc::new(Mutex::new(None));

    let db = {
        let seen = seen.clone();
        bridge
            .factory()
            .open_database(
                "down.db",
                OpenOptions::new().version(1).on_downgrade(move |db, old, new| {
                    *seen.lock().unwrap() = Some((old, new));
                    async move { db.execute("DROP TABLE old", vec![]).await }
                }),
            )
            .await
            .unwrap()
    };

    assert_eq!(*seen.lock().unwrap(), Some((3, 1)));
    assert_eq!(db.get_version().await.unwrap(), 1);
    assert_eq!(bridge.calls(METHOD_OPEN_DATABASE).len(), 1);
}

#[tokio::test]
async fn test_downgrade_by_delete_recreates_on_new_connection() {
    let bridge = TestBridge::new();
    create_at_version_3(&bridge, "recreate.db").await;
    let created = counter();

    let db = {
        let created = created.clone();
        bridge
            .factory()
            .open_database(
                "recreate.db",
                OpenOptions::new()
                    .version(1)
                    .on_downgrade_delete()
                    .on_create(move |db, version| {
                        let created = created.clone();
                        async move {
                            created.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(version, 1);
                            db.execute("CREATE TABLE fresh (v INTEGER)", vec![]).await
                        }
                    }),
            )
            .await
            .unwrap()
    };

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(db.get_version().await.unwrap(), 1);
    assert_eq!(bridge.calls(METHOD_OPEN_DATABASE).len(), 2);

    // the version is written on the reopened connection
    let set_version = bridge
        .calls(METHOD_EXECUTE)
        .into_iter()
        .find(|call| call.sql() == Some("PRAGMA user_version = 1"))
        .expect("set version call");
    assert_eq!(set_version.args.get(PARAM_ID).and_then(Value::as_i64), db.id());

    let err = db.raw_query("SELECT * FROM old", vec![]).await.unwrap_err();
    assert!(err
        .as_database_exception()
        .map_or(false, |e| e.is_no_such_table(Some("old"))));
    db.raw_query("SELECT * FROM fresh", vec![]).await.unwrap();
}

#[tokio::test]
async fn test_on_open_runs_after_migration_ends() {
    let bridge = TestBridge::new();
    let opened = counter();

    let db = {
        let opened = opened.clone();
        bridge
            .factory()
            .open_database(
                "open.db",
                OpenOptions::new()
                    .version(1)
                    .on_create(|db, _| async move {
                        db.execute("CREATE TABLE t (v INTEGER)", vec![]).await
                    })
                    .on_open(move |db| {
                        let opened = opened.clone();
                        async move {
                            db.raw_insert("INSERT INTO t VALUES (1)", vec![]).await?;
                            let rows = db.raw_query("SELECT v FROM t", vec![]).await?;
                            assert_eq!(rows.count(), 1);
                            opened.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
            )
            .await
            .unwrap()
    };

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(db.get_version().await.unwrap(), 1);
    assert_eq!(bridge.count("BEGIN EXCLUSIVE"), 1);
    assert_eq!(bridge.count("COMMIT"), 1);

    // the insert ran after the migration committed, outside any transaction
    let insert = &bridge.calls(METHOD_INSERT)[0];
    assert_eq!(insert.args.get(PARAM_TRANSACTION_ID), None);
    assert_eq!(values(&db).await, vec![1]);
}

// =============================================================================
// Native gate and lock warning
// =============================================================================

#[tokio::test]
async fn test_foreign_transaction_id_waits_for_current_transaction() {
    let bridge = TestBridge::new();
    let gateway = bridge.gateway();

    let opened = gateway
        .invoke(METHOD_OPEN_DATABASE, map(vec![("path", Value::from(":memory:"))]))
        .await
        .unwrap();
    let id = opened.get(PARAM_ID).cloned().unwrap();
    gateway
        .invoke(
            METHOD_EXECUTE,
            map(vec![("id", id.clone()), ("sql", Value::from("CREATE TABLE t (v INTEGER)"))]),
        )
        .await
        .unwrap();

    let begun = gateway
        .invoke(
            METHOD_EXECUTE,
            map(vec![
                ("id", id.clone()),
                ("sql", Value::from("BEGIN IMMEDIATE")),
                ("transactionId", Value::Null),
                ("inTransactionChange", Value::from(true)),
            ]),
        )
        .await
        .unwrap();
    let txn = begun.get(PARAM_TRANSACTION_ID).and_then(Value::as_i64).unwrap();

    // an operation for another transaction is held back
    let foreign = gateway.invoke(
        METHOD_INSERT,
        map(vec![
            ("id", id.clone()),
            ("sql", Value::from("INSERT INTO t VALUES (8)")),
            ("transactionId", Value::from(txn + 1)),
        ]),
    );
    tokio::pin!(foreign);
    assert!(timeout(Duration::from_millis(100), &mut foreign).await.is_err());

    // the current transaction's own work goes through
    gateway
        .invoke(
            METHOD_INSERT,
            map(vec![
                ("id", id.clone()),
                ("sql", Value::from("INSERT INTO t VALUES (7)")),
                ("transactionId", Value::from(txn)),
            ]),
        )
        .await
        .unwrap();
    gateway
        .invoke(
            METHOD_EXECUTE,
            map(vec![
                ("id", id.clone()),
                ("sql", Value::from("COMMIT")),
                ("transactionId", Value::from(txn)),
                ("inTransactionChange", Value::from(false)),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(foreign.await.unwrap(), Value::Int(2));
    let rows = gateway
        .invoke(
            METHOD_QUERY,
            map(vec![("id", id), ("sql", Value::from("SELECT v FROM t ORDER BY rowid"))]),
        )
        .await
        .unwrap();
    assert_eq!(
        rows.get("rows"),
        Some(&Value::List(vec![
            Value::List(vec![Value::Int(7)]),
            Value::List(vec![Value::Int(8)]),
        ]))
    );
}

#[tokio::test]
async fn test_open_rolls_back_a_connection_recovered_in_transaction() {
    let bridge = TestBridge::new();
    let path = bridge.path().join("recovered.db").to_string_lossy().into_owned();
    let gateway = bridge.gateway();

    // leave the native connection in the middle of a raw transaction
    let opened = gateway
        .invoke(
            METHOD_OPEN_DATABASE,
            map(vec![
                ("path", Value::from(path.as_str())),
                ("singleInstance", Value::from(true)),
            ]),
        )
        .await
        .unwrap();
    let id = opened.get(PARAM_ID).cloned().unwrap();
    gateway
        .invoke(
            METHOD_EXECUTE,
            map(vec![("id", id.clone()), ("sql", Value::from("CREATE TABLE t (v INTEGER)"))]),
        )
        .await
        .unwrap();
    gateway
        .invoke(
            METHOD_EXECUTE,
            map(vec![("id", id.clone()), ("sql", Value::from("BEGIN IMMEDIATE"))]),
        )
        .await
        .unwrap();
    bridge.reset();

    let db = bridge
        .factory()
        .open_database(&path, OpenOptions::new())
        .await
        .unwrap();
    assert_eq!(db.id(), id.as_i64());

    let rollback = bridge
        .calls(METHOD_EXECUTE)
        .into_iter()
        .find(|call| call.sql() == Some("ROLLBACK"))
        .expect("forced rollback");
    assert_eq!(
        rollback.args.get(PARAM_TRANSACTION_ID).and_then(Value::as_i64),
        Some(TRANSACTION_ID_FORCE)
    );

    // the connection is usable right away
    let inserted = timeout(
        Duration::from_secs(2),
        db.raw_insert("INSERT INTO t VALUES (1)", vec![]),
    )
    .await
    .expect("insert was queued")
    .unwrap();
    assert_eq!(inserted, Some(1));
    assert_eq!(
        bridge.statements(),
        vec![
            "ROLLBACK".to_string(),
            "INSERT INTO t VALUES (1)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_lock_warning_fires_once_per_long_wait() {
    let bridge = TestBridge::new();
    let warnings = counter();
    {
        let warnings = warnings.clone();
        bridge
            .factory()
            .set_lock_warning(LockWarning::new(Duration::from_millis(50), move |_| {
                warnings.fetch_add(1, Ordering::SeqCst);
            }));
    }
    let db = open_with_table(&bridge).await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let holder = {
        let db = db.clone();
        tokio::spawn(async move {
            db.transaction(|txn| async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(300)).await;
                txn.raw_insert("INSERT INTO t VALUES (1)", vec![]).await
            })
            .await
        })
    };
    started_rx.await.unwrap();

    // spawned tasks do not inherit the transaction, so this waits
    let waiter = {
        let db = db.clone();
        tokio::spawn(async move { db.raw_insert("INSERT INTO t VALUES (2)", vec![]).await })
    };

    holder.await.unwrap().unwrap();
    waiter.await.unwrap().unwrap();

    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    assert_eq!(db.stats().lock_warnings, 1);
    assert_eq!(values(&db).await, vec![1, 2]);
}
