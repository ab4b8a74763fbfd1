// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-record mapper edge cases.

use rowguard_core::{Backend, RawWhere, Record, RowGuardError, SqlValue};
use rowguard_mapper::{EditState, LockTableFlag, Optimistic, Pessimistic, SingleRecordMapper};
use rowguard_test_utils::{
    FlagBoard, MemoryFlag, ScriptedFactory, ScriptedSession, SqliteFixture,
};

fn row(id: &str) -> Record {
    Record::from_pairs([
        ("id", Some(id.to_string())),
        ("updated_at", Some("2026-01-01T00:00:00Z".to_string())),
    ])
}

#[tokio::test]
async fn no_match_is_data_not_found() {
    let fixture = SqliteFixture::new().unwrap();
    fixture.seed_items(&[(1, "bolt", 10)]).await.unwrap();
    let mut single = SingleRecordMapper::new(
        fixture.session().await.unwrap(),
        "items",
        Optimistic::default(),
    )
    .unwrap()
    .with_filter(RawWhere::new("id = ?1", vec![SqlValue::from(404i64)]));

    let err = single.edit().await.unwrap_err();
    assert!(matches!(err, RowGuardError::DataNotFound { ref table } if table == "items"));
    assert_eq!(single.state(), EditState::Idle);
    assert!(single.record().is_err());
    single.close().await.unwrap();
}

#[tokio::test]
async fn no_match_with_default_edits_the_default() {
    let fixture = SqliteFixture::new().unwrap();
    fixture.seed_items(&[]).await.unwrap();
    let default = Record::blank(["id", "name", "qty", "updated_at"]);
    let mut single = SingleRecordMapper::new(
        fixture.session().await.unwrap(),
        "items",
        Optimistic::default(),
    )
    .unwrap()
    .with_filter(RawWhere::new("id = ?1", vec![SqlValue::from(9i64)]))
    .with_default(default.clone());

    single.edit().await.unwrap();
    assert!(single.is_new());
    assert_eq!(single.record().unwrap(), &default);
    assert_eq!(single.identifier(), None);
    single.record_mut().unwrap().set("name", Some("spring".to_string()));
    assert_eq!(single.record().unwrap().get("name"), Some("spring"));
    single.close().await.unwrap();
}

#[tokio::test]
async fn several_matches_is_ambiguous_and_releases_the_flag() {
    let board = FlagBoard::new();
    let factory = ScriptedFactory::new(Backend::File);
    let session = ScriptedSession::new(Backend::File);
    session.script().push_rows(vec![row("1"), row("2")]);

    let strategy = Pessimistic::new(MemoryFlag::new(&board, "items", "1", "alice"), factory.clone());
    let mut single = SingleRecordMapper::new(Box::new(session), "items", strategy).unwrap();

    let err = single.edit().await.unwrap_err();
    assert!(matches!(err, RowGuardError::AmbiguousRecord { count: 2, .. }));
    assert_eq!(single.state(), EditState::Idle);
    assert_eq!(board.holder("items", "1"), None);
    assert_eq!(factory.script().count("FLAG SET"), 1);
    assert_eq!(factory.script().count("FLAG CLEAR"), 1);
}

#[tokio::test]
async fn not_found_after_pessimistic_checkout_clears_the_flag() {
    let fixture = SqliteFixture::new().unwrap();
    fixture.seed_items(&[]).await.unwrap();
    let mut setup = fixture.open().await.unwrap();
    LockTableFlag::ensure_schema(&mut setup, "editing_locks").await.unwrap();

    let flag = LockTableFlag::new("editing_locks", "items", "5", "alice").unwrap();
    let mut single = SingleRecordMapper::new(
        fixture.session().await.unwrap(),
        "items",
        Pessimistic::new(flag, fixture.connector.clone()),
    )
    .unwrap()
    .with_filter(RawWhere::new("id = ?1", vec![SqlValue::from(5i64)]));

    assert!(matches!(
        single.edit().await,
        Err(RowGuardError::DataNotFound { .. })
    ));
    assert!(LockTableFlag::list(&mut setup, "editing_locks").await.unwrap().is_empty());
    single.close().await.unwrap();
    rowguard_core::Session::close(&mut setup).await.unwrap();
}

#[tokio::test]
async fn exactly_one_match_is_edited() {
    let session = ScriptedSession::new(Backend::Server);
    session.script().push_rows(vec![row("7")]);
    let mut single = SingleRecordMapper::new(Box::new(session), "items", Optimistic::default())
        .unwrap();
    single.edit().await.unwrap();
    assert!(!single.is_new());
    assert_eq!(single.identifier().as_deref(), Some("7"));
    assert!(single.last_update_time().is_some());
    single.commit().await.unwrap();
    assert_eq!(single.state(), EditState::Closed);
}
