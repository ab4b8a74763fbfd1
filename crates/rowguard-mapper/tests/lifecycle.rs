// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapper lifecycle driven through scripted sessions.

use futures::FutureExt;
use rowguard_core::{Backend, IsolationLevel, RawWhere, Record, RowGuardError, SqlValue};
use rowguard_mapper::{EditState, Optimistic, Pessimistic, Physical, RecordMapper};
use rowguard_test_utils::{
    FlagBoard, MemoryFlag, Script, ScriptedFactory, ScriptedFailure, ScriptedSession,
};
use tracing_test::traced_test;

fn row(id: &str, updated: &str) -> Record {
    Record::from_pairs([
        ("id", Some(id.to_string())),
        ("updated_at", Some(updated.to_string())),
    ])
}

fn pessimistic_mapper(
    board: &FlagBoard,
    owner: &str,
) -> (RecordMapper<Pessimistic>, Script, Script) {
    let session = ScriptedSession::new(Backend::File);
    let main = session.script();
    let factory = ScriptedFactory::new(Backend::File);
    let locking = factory.script();
    let strategy = Pessimistic::new(MemoryFlag::new(board, "items", "1", owner), factory);
    let mapper = RecordMapper::new(Box::new(session), "items", strategy).unwrap();
    (mapper, main, locking)
}

#[tokio::test]
async fn repeated_edit_acquires_once() {
    let board = FlagBoard::new();
    let (mut mapper, main, locking) = pessimistic_mapper(&board, "alice");
    mapper.edit().await.unwrap();
    mapper.edit().await.unwrap();
    mapper.edit().await.unwrap();
    assert_eq!(locking.count("FLAG SET"), 1);
    assert_eq!(main.count("SELECT * FROM items"), 1);
    mapper.close().await.unwrap();
}

#[tokio::test]
async fn close_closes_main_session_before_clearing_the_flag() {
    let board = FlagBoard::new();
    let (mut mapper, main, locking) = pessimistic_mapper(&board, "alice");
    mapper.edit().await.unwrap();
    let opens_before_close = locking.count("OPEN");
    mapper.close().await.unwrap();

    assert_eq!(main.statements().last().map(String::as_str), Some("CLOSE"));
    assert_eq!(locking.count("OPEN"), opens_before_close + 1);
    assert_eq!(locking.count("FLAG CLEAR"), 1);
    assert_eq!(board.holder("items", "1"), None);
    assert_eq!(mapper.state(), EditState::Closed);
}

#[tokio::test]
async fn closed_mapper_cannot_edit_again() {
    let board = FlagBoard::new();
    let (mut mapper, _main, _locking) = pessimistic_mapper(&board, "alice");
    mapper.edit().await.unwrap();
    mapper.close().await.unwrap();
    let err = mapper.edit().await.unwrap_err();
    assert!(matches!(err, RowGuardError::Connection { .. }));
}

#[tokio::test]
async fn failed_fetch_restores_pre_edit_state() {
    let board = FlagBoard::new();
    let (mut mapper, main, locking) = pessimistic_mapper(&board, "alice");
    main.fail_on("SELECT * FROM items", ScriptedFailure::Query);

    assert!(mapper.edit().await.is_err());
    assert_eq!(mapper.state(), EditState::Idle);
    assert_eq!(board.holder("items", "1"), None);
    assert_eq!(locking.count("FLAG CLEAR"), 1);

    main.clear_failures();
    mapper.edit().await.unwrap();
    assert!(mapper.is_editing());
    mapper.close().await.unwrap();
}

#[tokio::test]
async fn physical_lock_refusal_rolls_back_its_transaction() {
    let session = ScriptedSession::new(Backend::Server);
    let script = session.script();
    script.fail_on("FOR UPDATE NOWAIT", ScriptedFailure::LockUnavailable);
    let mut mapper = RecordMapper::new(Box::new(session), "items", Physical)
        .unwrap()
        .with_filter(RawWhere::new("id = $1", vec![SqlValue::from(1i64)]));

    let err = mapper.edit().await.unwrap_err();
    assert!(matches!(err, RowGuardError::LockUnavailable { .. }));
    assert_eq!(mapper.state(), EditState::Idle);
    assert_eq!(mapper.session().isolation_level(), IsolationLevel::NoLock);
    assert_eq!(
        script.statements(),
        vec![
            "BEGIN DEFERRED",
            "SELECT * FROM items WHERE id = $1 FOR UPDATE NOWAIT",
            "ROLLBACK",
        ]
    );
}

#[tokio::test]
async fn caller_transaction_survives_failed_edit() {
    let mut session = ScriptedSession::new(Backend::Server);
    let script = session.script();
    rowguard_core::Session::begin(&mut session, IsolationLevel::Immediate)
        .await
        .unwrap();
    script.fail_on("LOCK TABLE", ScriptedFailure::LockUnavailable);
    let mut mapper = RecordMapper::new(Box::new(session), "items", Physical).unwrap();

    assert!(mapper.edit().await.is_err());
    assert_eq!(mapper.session().isolation_level(), IsolationLevel::Immediate);
    assert_eq!(script.count("ROLLBACK"), 0);
    mapper.close().await.unwrap();
    assert_eq!(script.count("ROLLBACK"), 1);
}

#[tokio::test]
async fn physical_commit_releases_locks_and_skips_detection() {
    let session = ScriptedSession::new(Backend::Server);
    let script = session.script();
    script.push_rows(vec![row("1", "2026-01-01T00:00:00Z")]);
    let mut mapper = RecordMapper::new(Box::new(session), "items", Physical).unwrap();

    mapper.edit().await.unwrap();
    mapper.begin_save(IsolationLevel::Exclusive).await.unwrap();
    mapper.commit().await.unwrap();
    assert_eq!(
        script.statements(),
        vec![
            "BEGIN DEFERRED",
            "LOCK TABLE items IN EXCLUSIVE MODE NOWAIT",
            "SELECT * FROM items",
            "COMMIT",
            "CLOSE",
        ]
    );
}

#[tokio::test]
async fn optimistic_detection_compares_by_identifier() {
    let session = ScriptedSession::new(Backend::File);
    let script = session.script();
    script.push_rows(vec![
        row("1", "2026-01-01T00:00:00Z"),
        row("2", "2026-01-01T00:00:00Z"),
    ]);
    let mut mapper = RecordMapper::new(Box::new(session), "items", Optimistic::default()).unwrap();
    mapper.edit().await.unwrap();

    // Same rows, different order, one extra: no conflict.
    script.push_rows(vec![
        row("3", "2026-02-01T00:00:00Z"),
        row("2", "2026-01-01T00:00:00Z"),
        row("1", "2026-01-01T00:00:00Z"),
    ]);
    mapper.begin_save(IsolationLevel::Immediate).await.unwrap();
    mapper.session_mut().rollback().await.unwrap();

    script.push_rows(vec![row("1", "2026-01-01T00:00:00Z")]);
    let err = mapper.begin_save(IsolationLevel::Immediate).await.unwrap_err();
    assert!(matches!(err, RowGuardError::OptimisticConflict { ref identifier, .. } if identifier == "2"));
    mapper.close().await.unwrap();
}

#[tokio::test]
async fn commit_before_edit_is_a_state_error() {
    let session = ScriptedSession::new(Backend::File);
    let mut mapper = RecordMapper::new(Box::new(session), "items", Optimistic::default()).unwrap();
    let err = mapper.commit().await.unwrap_err();
    assert!(matches!(err, RowGuardError::TransactionState(_)));
}

#[tokio::test]
async fn run_edit_commits_on_success() {
    let board = FlagBoard::new();
    let (mapper, main, locking) = pessimistic_mapper(&board, "alice");
    main.push_rows(vec![row("1", "2026-01-01T00:00:00Z")]);

    let count = mapper
        .run_edit(|m| {
            async move {
                m.begin_save(IsolationLevel::Immediate).await?;
                m.session_mut()
                    .execute("UPDATE items SET qty = 1", &[])
                    .await?;
                Ok(m.records().len())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(main.count("COMMIT"), 1);
    assert_eq!(main.count("CLOSE"), 1);
    assert_eq!(locking.count("FLAG CLEAR"), 1);
}

#[tokio::test]
async fn run_edit_closes_when_the_body_fails() {
    let board = FlagBoard::new();
    let (mapper, main, locking) = pessimistic_mapper(&board, "alice");

    let err = mapper
        .run_edit(|m| {
            async move {
                m.begin_save(IsolationLevel::Immediate).await?;
                Err::<(), _>(RowGuardError::Internal("validation failed".to_string()))
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RowGuardError::Internal(_)));
    assert_eq!(main.count("COMMIT"), 0);
    assert_eq!(main.count("ROLLBACK"), 1);
    assert_eq!(main.count("CLOSE"), 1);
    assert_eq!(locking.count("FLAG CLEAR"), 1);
    assert_eq!(board.holder("items", "1"), None);
}

#[tokio::test]
async fn run_edit_reports_editing_conflict_and_leaves_flag_alone() {
    let board = FlagBoard::new();
    let (mut alice, _main, _locking) = pessimistic_mapper(&board, "alice");
    alice.edit().await.unwrap();

    let (bob, bob_main, bob_locking) = pessimistic_mapper(&board, "bob");
    let err = bob
        .run_edit(|_| async { Ok(()) }.boxed())
        .await
        .unwrap_err();
    assert!(matches!(err, RowGuardError::EditingConflict { .. }));
    assert_eq!(bob_main.count("CLOSE"), 1);
    assert_eq!(bob_locking.count("FLAG CLEAR"), 0);
    assert_eq!(board.holder("items", "1").as_deref(), Some("alice"));
    alice.close().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn failing_rollback_on_close_is_logged_not_raised() {
    let session = ScriptedSession::new(Backend::Server);
    let script = session.script();
    let mut mapper = RecordMapper::new(Box::new(session), "items", Physical).unwrap();
    mapper.edit().await.unwrap();

    script.fail_on("ROLLBACK", ScriptedFailure::Connection);
    mapper.close().await.unwrap();

    assert_eq!(mapper.state(), EditState::Closed);
    assert_eq!(mapper.session().isolation_level(), IsolationLevel::NoLock);
    assert!(logs_contain("rollback during close failed"));
}

#[tokio::test]
#[traced_test]
async fn dropping_an_editing_mapper_warns() {
    let board = FlagBoard::new();
    let (mut mapper, _main, _locking) = pessimistic_mapper(&board, "alice");
    mapper.edit().await.unwrap();
    drop(mapper);
    assert!(logs_contain("record mapper dropped while editing"));
    assert_eq!(board.holder("items", "1").as_deref(), Some("alice"));
}

#[tokio::test]
async fn forcibly_close_without_edit_clears_a_stranded_flag() {
    let board = FlagBoard::new();
    let (mut alice, _main, _locking) = pessimistic_mapper(&board, "alice");
    alice.edit().await.unwrap();
    drop(alice);

    let (mut janitor, _main, locking) = pessimistic_mapper(&board, "janitor");
    janitor.forcibly_close().await.unwrap();
    assert_eq!(board.holder("items", "1"), None);
    assert_eq!(locking.count("FLAG CLEAR"), 1);
    assert_eq!(janitor.state(), EditState::Closed);
}
