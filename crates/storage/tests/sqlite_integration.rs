use chrono::Duration;
use practice_core::model::{
    AnswerRecord, Choice, ChoiceId, PackageId, PracticeSession, QuestionId, QuestionItem,
    SessionId, SessionStatus, UserId,
};
use practice_core::time::fixed_now;
use storage::repository::{
    AnswerLogRepository, AnswerPersistence, QuestionBank, SessionPrecondition, SessionRepository,
    StorageError,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn question(id: u64, package: Option<u64>) -> QuestionItem {
    QuestionItem::new(
        QuestionId::new(id),
        package.map(PackageId::new),
        format!("Q{id}"),
        vec![
            Choice::new(ChoiceId::new(1), "one"),
            Choice::new(ChoiceId::new(2), "two"),
        ],
        ChoiceId::new(1),
        format!("because {id}"),
    )
    .unwrap()
}

fn session(user: u64, offset_secs: i64, time_limit: Option<u32>) -> PracticeSession {
    PracticeSession::new(
        SessionId::generate(),
        UserId::new(user),
        None,
        time_limit,
        vec![QuestionId::new(1), QuestionId::new(2)],
        fixed_now() + Duration::seconds(offset_secs),
    )
    .unwrap()
}

#[tokio::test]
async fn session_roundtrip_preserves_state() {
    let repo = repo("memdb_session_roundtrip").await;
    let mut s = session(1, 0, Some(120));
    repo.insert_session(&s).await.unwrap();

    let expected = SessionPrecondition::capture(&s);
    s.record_answer(QuestionId::new(1), true, fixed_now() + Duration::seconds(30))
        .unwrap();
    repo.save_session(&s, expected).await.unwrap();

    let loaded = repo.load_session(UserId::new(1), s.id()).await.unwrap();
    assert_eq!(loaded, s);
    assert_eq!(loaded.elapsed_for(QuestionId::new(1)), 30);
    assert_eq!(loaded.current_index(), 1);

    let other_user = repo.load_session(UserId::new(2), s.id()).await;
    assert!(matches!(other_user, Err(StorageError::NotFound)));
}

#[tokio::test]
async fn stale_save_is_a_conflict_and_missing_is_not_found() {
    let repo = repo("memdb_stale_save").await;
    let s = session(1, 0, None);
    repo.insert_session(&s).await.unwrap();

    let stale = SessionPrecondition::capture(&s);
    let mut first = s.clone();
    first.pause(fixed_now() + Duration::seconds(10)).unwrap();
    repo.save_session(&first, stale).await.unwrap();

    let mut second = s.clone();
    second
        .record_answer(QuestionId::new(1), false, fixed_now() + Duration::seconds(11))
        .unwrap();
    let err = repo.save_session(&second, stale).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let ghost = session(1, 0, None);
    let err = repo
        .save_session(&ghost, SessionPrecondition::capture(&ghost))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn apply_answer_is_atomic() {
    let repo = repo("memdb_apply_answer").await;
    let s = session(1, 0, None);
    repo.insert_session(&s).await.unwrap();

    let expected = SessionPrecondition::capture(&s);
    let mut next = s.clone();
    let at = fixed_now() + Duration::seconds(12);
    let progress = next.record_answer(QuestionId::new(1), true, at).unwrap();
    let answer = AnswerRecord::new(
        s.id(),
        progress.index,
        QuestionId::new(1),
        ChoiceId::new(1),
        true,
        "because 1",
        progress.time_taken_seconds,
        at,
    );
    repo.apply_answer(&next, expected, &answer).await.unwrap();

    // Replaying the same write against the old revision leaves both tables alone.
    let err = repo.apply_answer(&next, expected, &answer).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let answers = repo.answers_for_session(s.id()).await.unwrap();
    assert_eq!(answers, vec![answer]);
    let loaded = repo.load_session(UserId::new(1), s.id()).await.unwrap();
    assert_eq!(loaded.correct_count(), 1);
    assert_eq!(loaded.revision(), next.revision());
}

#[tokio::test]
async fn candidates_follow_id_order_within_package() {
    let repo = repo("memdb_candidates").await;
    for (id, package) in [(5, Some(1)), (2, Some(2)), (3, Some(1)), (1, None)] {
        repo.upsert_question(&question(id, package)).await.unwrap();
    }

    let all = repo.candidate_ids(None, 10).await.unwrap();
    assert_eq!(all, [1, 2, 3, 5].map(QuestionId::new));

    let scoped = repo.candidate_ids(Some(PackageId::new(1)), 1).await.unwrap();
    assert_eq!(scoped, vec![QuestionId::new(3)]);

    let item = repo.get_item(QuestionId::new(5)).await.unwrap();
    assert_eq!(item, question(5, Some(1)));
    assert!(matches!(
        repo.get_item(QuestionId::new(99)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn listing_is_newest_first_and_filtered() {
    let repo = repo("memdb_listing").await;
    let older = session(7, 0, None);
    let newer = session(7, 60, None);
    let foreign = session(8, 120, None);
    for s in [&older, &newer, &foreign] {
        repo.insert_session(s).await.unwrap();
    }

    let mut paused = newer.clone();
    paused.pause(fixed_now() + Duration::seconds(70)).unwrap();
    repo.save_session(&paused, SessionPrecondition::capture(&newer))
        .await
        .unwrap();

    let page = repo.list_sessions(UserId::new(7), None, 10, 0).await.unwrap();
    assert_eq!(
        page.iter().map(PracticeSession::id).collect::<Vec<_>>(),
        vec![newer.id(), older.id()]
    );

    let filtered = repo
        .list_sessions(UserId::new(7), Some(SessionStatus::Paused), 10, 0)
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].status(), SessionStatus::Paused);

    let second_page = repo.list_sessions(UserId::new(7), None, 1, 1).await.unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].id(), older.id());
}

#[tokio::test]
async fn due_timed_sessions_returns_only_lapsed_active_rows() {
    let repo = repo("memdb_due_timed").await;
    let live = session(3, 0, None);
    let timed = session(3, 10, Some(60));
    for s in [&live, &timed] {
        repo.insert_session(s).await.unwrap();
    }

    let before = repo
        .due_timed_sessions(UserId::new(3), fixed_now() + Duration::seconds(69))
        .await
        .unwrap();
    assert!(before.is_empty());

    let due = repo
        .due_timed_sessions(UserId::new(3), fixed_now() + Duration::seconds(70))
        .await
        .unwrap();
    assert_eq!(due, vec![timed]);
}
