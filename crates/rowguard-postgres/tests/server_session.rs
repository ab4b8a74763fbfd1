// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live-server tests. They run only when `ROWGUARD_TEST_POSTGRES_URL` points
//! at a disposable database.

use rowguard_core::{IsolationLevel, RowGuardError, Session, SqlValue, TableLockMode};
use rowguard_postgres::{PostgresConnector, ServerSession};

fn postgres_url() -> Option<String> {
    std::env::var("ROWGUARD_TEST_POSTGRES_URL").ok()
}

async fn fresh_table(url: &str, table: &str) -> ServerSession {
    let mut session = ServerSession::connect(url).await.unwrap();
    session
        .execute(&format!("DROP TABLE IF EXISTS {table}"), &[])
        .await
        .unwrap();
    session
        .execute(
            &format!("CREATE TABLE {table} (id INTEGER PRIMARY KEY, name TEXT, updated_at TIMESTAMPTZ NOT NULL DEFAULT now())"),
            &[],
        )
        .await
        .unwrap();
    session
        .execute(
            &format!("INSERT INTO {table} (id, name) VALUES (1, 'a'), (2, 'b')"),
            &[],
        )
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn row_lock_contention_is_lock_unavailable() {
    let Some(url) = postgres_url() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    let mut setup = fresh_table(&url, "rg_row_lock").await;
    let connector = PostgresConnector::from_url(&url).unwrap();
    let mut a = connector.open().await.unwrap();
    let mut b = connector.open().await.unwrap();

    a.begin(IsolationLevel::Deferred).await.unwrap();
    let rows = a
        .fetch("SELECT * FROM rg_row_lock WHERE id = $1 FOR UPDATE NOWAIT", &[SqlValue::from(1i64)])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    b.begin(IsolationLevel::Deferred).await.unwrap();
    let err = b
        .fetch("SELECT * FROM rg_row_lock WHERE id = $1 FOR UPDATE NOWAIT", &[SqlValue::from(1i64)])
        .await
        .unwrap_err();
    assert!(matches!(err, RowGuardError::LockUnavailable { .. }), "got {err:?}");
    b.rollback().await.unwrap();

    // A different row is not affected.
    b.begin(IsolationLevel::Deferred).await.unwrap();
    let other = b
        .fetch("SELECT * FROM rg_row_lock WHERE id = $1 FOR UPDATE NOWAIT", &[SqlValue::from(2i64)])
        .await
        .unwrap();
    assert_eq!(other[0].get("name"), Some("b"));
    b.rollback().await.unwrap();

    a.commit().await.unwrap();
    b.close().await.unwrap();
    a.close().await.unwrap();
    setup.close().await.unwrap();
}

#[tokio::test]
async fn table_lock_contention_is_lock_unavailable() {
    let Some(url) = postgres_url() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    let mut setup = fresh_table(&url, "rg_table_lock").await;
    let mut a = ServerSession::connect(&url).await.unwrap();
    let mut b = ServerSession::connect(&url).await.unwrap();

    let err = a.lock_table_exclusive("rg_table_lock").await.unwrap_err();
    assert!(matches!(err, RowGuardError::TransactionState(_)));

    a.begin(IsolationLevel::Deferred).await.unwrap();
    a.lock_table_readonly("rg_table_lock").await.unwrap();

    b.begin(IsolationLevel::Deferred).await.unwrap();
    let err = b
        .lock_table("rg_table_lock", TableLockMode::Exclusive)
        .await
        .unwrap_err();
    assert!(err.is_contention(), "got {err:?}");
    b.rollback().await.unwrap();

    a.rollback().await.unwrap();
    b.begin(IsolationLevel::Deferred).await.unwrap();
    b.lock_table_exclusive("rg_table_lock").await.unwrap();
    b.commit().await.unwrap();
    setup.close().await.unwrap();
}

#[tokio::test]
async fn rows_decode_to_text_and_timestamps_parse() {
    let Some(url) = postgres_url() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    let mut session = ServerSession::connect(&url).await.unwrap();
    let rows = session
        .fetch(
            "SELECT 1::int4 AS i, 2::int8 AS l, true AS flag, 'x'::varchar AS v, NULL::text AS n, \
             now() AS ts, '{\"a\":1}'::jsonb AS doc, $1::text AS bound",
            &[SqlValue::from("param")],
        )
        .await
        .unwrap();
    let row = &rows[0];
    assert_eq!(row.get("i"), Some("1"));
    assert_eq!(row.get("l"), Some("2"));
    assert_eq!(row.get("flag"), Some("true"));
    assert_eq!(row.get("v"), Some("x"));
    assert_eq!(row.get("n"), None);
    assert_eq!(row.get("doc"), Some("{\"a\":1}"));
    assert_eq!(row.get("bound"), Some("param"));
    assert!(rowguard_core::parse_timestamp(row.get("ts").unwrap()).is_some());

    let now = session.current_time().await.unwrap();
    assert!(now.timestamp() > 0);
    assert!(session.table_exists("pg_catalog.pg_class").await.unwrap());
    assert!(!session.table_exists("rg_surely_missing").await.unwrap());
    session.close().await.unwrap();
}

#[tokio::test]
async fn close_rolls_back_open_transaction() {
    let Some(url) = postgres_url() else {
        eprintln!("skipping: ROWGUARD_TEST_POSTGRES_URL not set");
        return;
    };
    let mut setup = fresh_table(&url, "rg_close_rollback").await;
    let mut a = ServerSession::connect(&url).await.unwrap();
    a.begin(IsolationLevel::Immediate).await.unwrap();
    a.execute("DELETE FROM rg_close_rollback", &[]).await.unwrap();
    a.close().await.unwrap();
    assert!(a.is_closed());

    let rows = setup.fetch("SELECT id FROM rg_close_rollback", &[]).await.unwrap();
    assert_eq!(rows.len(), 2);
    setup.close().await.unwrap();
}
