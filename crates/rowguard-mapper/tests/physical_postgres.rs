// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Physical and pessimistic locking on a live server. Runs only when
//! `ROWGUARD_TEST_POSTGRES_URL` points at a disposable database.

use std::time::Duration;

use rowguard_core::{IsolationLevel, RawWhere, RowGuardError, Session, SqlValue, TableLockMode};
use rowguard_mapper::{
    EditState, LockTableFlag, Optimistic, Pessimistic, Physical, RecordMapper,
    SingleRecordMapper,
};
use rowguard_postgres::PostgresConnector;

fn connector() -> Option<PostgresConnector> {
    let url = std::env::var("ROWGUARD_TEST_POSTGRES_URL").ok()?;
    Some(PostgresConnector::from_url(&url).unwrap())
}

async fn seed(connector: &PostgresConnector, table: &str) {
    let mut session = connector.open().await.unwrap();
    session
        .execute(&format!("DROP TABLE IF EXISTS {table}"), &[])
        .await
        .unwrap();
    session
        .execute(
            &format!(
                "CREATE TABLE {table} (id INTEGER PRIMARY KEY, name TEXT NOT NULL, \
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT now())"
            ),
            &[],
        )
        .await
        .unwrap();
    session
        .execute(
            &format!("INSERT INTO {table} (id, name) VALUES (1, 'bolt'), (2, 'nut')"),
            &[],
        )
        .await
        .unwrap();
    session.close().await.unwrap();
}

async fn row_mapper(
    connector: &PostgresConnector,
    table: &str,
    id: i64,
) -> SingleRecordMapper<Physical> {
    SingleRecordMapper::new(Box::new(connector.open().await.unwrap()), table, Physical)
        .unwrap()
        .with_filter(RawWhere::new("id = $1", vec![SqlValue::from(id)]))
}

#[tokio::test]
async fn locked_row_refuses_second_editor_until_commit() {
    let Some(connector) = connector() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    seed(&connector, "rg_physical_rows").await;

    let mut a = row_mapper(&connector, "rg_physical_rows", 1).await;
    let mut b = row_mapper(&connector, "rg_physical_rows", 1).await;
    a.edit().await.unwrap();

    let err = b.edit().await.unwrap_err();
    assert!(matches!(err, RowGuardError::LockUnavailable { .. }), "got {err:?}");
    assert_eq!(b.state(), EditState::Idle);

    // Another row stays available.
    let mut c = row_mapper(&connector, "rg_physical_rows", 2).await;
    c.edit().await.unwrap();
    c.close().await.unwrap();

    a.session_mut()
        .execute("UPDATE rg_physical_rows SET name = 'hex bolt' WHERE id = 1", &[])
        .await
        .unwrap();
    a.commit().await.unwrap();

    b.edit().await.unwrap();
    assert_eq!(b.record().unwrap().get("name"), Some("hex bolt"));
    b.close().await.unwrap();
}

#[tokio::test]
async fn unfiltered_edit_locks_the_whole_table() {
    let Some(connector) = connector() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    seed(&connector, "rg_physical_table").await;

    let mut a = RecordMapper::new(
        Box::new(connector.open().await.unwrap()),
        "rg_physical_table",
        Physical,
    )
    .unwrap()
    .with_order_by(["id"]);
    a.edit().await.unwrap();
    assert_eq!(a.records().len(), 2);

    let mut b = row_mapper(&connector, "rg_physical_table", 2).await;
    assert!(matches!(
        b.edit().await,
        Err(RowGuardError::LockUnavailable { .. })
    ));

    a.close().await.unwrap();
    b.edit().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn optimistic_conflict_on_server_timestamps() {
    let Some(connector) = connector() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    seed(&connector, "rg_optimistic").await;

    let mut mapper = RecordMapper::new(
        Box::new(connector.open().await.unwrap()),
        "rg_optimistic",
        Optimistic::default(),
    )
    .unwrap();
    mapper.edit().await.unwrap();

    let mut other = connector.open().await.unwrap();
    other
        .execute(
            "UPDATE rg_optimistic SET updated_at = updated_at + interval '1 second' WHERE id = 2",
            &[],
        )
        .await
        .unwrap();
    other.close().await.unwrap();

    let err = mapper.begin_save(IsolationLevel::Immediate).await.unwrap_err();
    assert!(matches!(
        err,
        RowGuardError::OptimisticConflict { ref identifier, .. } if identifier == "2"
    ));
    mapper.close().await.unwrap();
}

async fn flagged_mapper(
    connector: &PostgresConnector,
    lock_table: &str,
    owner: &str,
) -> SingleRecordMapper<Pessimistic> {
    let flag = LockTableFlag::new(lock_table, "rg_pessimistic", "1", owner).unwrap();
    let strategy = Pessimistic::new(flag, connector.clone());
    SingleRecordMapper::new(Box::new(connector.open().await.unwrap()), "rg_pessimistic", strategy)
        .unwrap()
        .with_filter(RawWhere::new("id = $1", vec![SqlValue::from(1i64)]))
}

#[tokio::test]
async fn flag_negotiation_fails_fast_while_another_session_negotiates() {
    let Some(connector) = connector() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    let lock_table = "rg_pessimistic_locks";
    seed(&connector, "rg_pessimistic").await;
    let mut admin = connector.open().await.unwrap();
    admin
        .execute(&format!("DROP TABLE IF EXISTS {lock_table}"), &[])
        .await
        .unwrap();
    LockTableFlag::ensure_schema(&mut admin, lock_table).await.unwrap();

    // Stands in for a locking session caught between its check and its set.
    admin.begin(IsolationLevel::Deferred).await.unwrap();
    admin
        .lock_table(lock_table, TableLockMode::Exclusive)
        .await
        .unwrap();

    let mut a = flagged_mapper(&connector, lock_table, "alice").await;
    let attempt = tokio::time::timeout(Duration::from_secs(5), a.edit())
        .await
        .expect("flag negotiation must not wait for the other session");
    assert!(matches!(attempt, Err(RowGuardError::LockUnavailable { .. })), "got {attempt:?}");
    assert_eq!(a.state(), EditState::Idle);

    admin.rollback().await.unwrap();
    assert!(LockTableFlag::list(&mut admin, lock_table).await.unwrap().is_empty());

    a.edit().await.unwrap();
    let mut b = flagged_mapper(&connector, lock_table, "bob").await;
    assert!(matches!(
        b.edit().await,
        Err(RowGuardError::EditingConflict { .. })
    ));

    a.close().await.unwrap();
    assert!(LockTableFlag::list(&mut admin, lock_table).await.unwrap().is_empty());
    b.close().await.unwrap();
    admin.close().await.unwrap();
}
