use std::collections::BTreeMap;

use session_orchestrator::models::output::{RunnerOutput, SessionOutput};
use session_orchestrator::models::session::{NewSession, SessionKind, SessionStatus, Transition};
use session_orchestrator::orchestrator::output;
use session_orchestrator::orchestrator::session_store::SessionStore;
use session_orchestrator::AppError;

async fn running_session(store: &SessionStore) -> String {
    let session = store
        .create(NewSession::new(SessionKind::Testing, "run the suite"))
        .await
        .expect("create");
    store.update_status(&session.id, Transition::Queue).await.expect("queue");
    store.update_status(&session.id, Transition::Start).await.expect("start");
    session.id
}

#[test]
fn omitted_fields_normalize_to_empty() {
    let raw: RunnerOutput =
        serde_json::from_str(r#"{"summary":"ok","tests_passed":12}"#).expect("parse");
    let normalized = SessionOutput::from(raw);

    assert_eq!(normalized.summary, "ok");
    assert_eq!(normalized.tests_passed, 12);
    assert!(normalized.files_created.is_empty());
    assert!(normalized.files_modified.is_empty());
    assert!(normalized.errors.is_empty());
    assert!(normalized.logs.is_empty());
    assert!(normalized.metrics.is_empty());
    assert!(normalized.artifacts.is_empty());
    assert!(normalized.next_steps.is_empty());
}

#[test]
fn supplied_fields_are_preserved() {
    let raw = RunnerOutput {
        files_created: Some(vec!["src/lib.rs".into()]),
        metrics: Some(BTreeMap::from([(
            "coverage".to_owned(),
            serde_json::json!(0.82),
        )])),
        next_steps: Some(vec!["add docs".into()]),
        ..RunnerOutput::default()
    };
    let normalized = SessionOutput::from(raw);

    assert_eq!(normalized.files_created, vec!["src/lib.rs".to_owned()]);
    assert_eq!(normalized.metrics["coverage"], serde_json::json!(0.82));
    assert_eq!(normalized.next_steps, vec!["add docs".to_owned()]);
    assert_eq!(normalized.summary, "");
}

#[tokio::test]
async fn collect_returns_normalized_output_for_completed_session() {
    let store = SessionStore::new();
    let id = running_session(&store).await;
    let raw = RunnerOutput {
        summary: Some("all green".into()),
        tests_passed: Some(40),
        ..RunnerOutput::default()
    };
    store
        .update_status(&id, Transition::Complete(raw))
        .await
        .expect("complete");

    let collected = output::collect(&store, &id).await.expect("collect");
    assert_eq!(collected.summary, "all green");
    assert_eq!(collected.tests_passed, 40);
    assert!(collected.logs.is_empty());
}

#[tokio::test]
async fn collect_rejects_unfinished_session() {
    let store = SessionStore::new();
    let id = running_session(&store).await;

    let err = output::collect(&store, &id).await.unwrap_err();
    assert_eq!(
        err,
        AppError::NotCompleted {
            session_id: id,
            status: SessionStatus::Running,
        }
    );
}

#[tokio::test]
async fn collect_unknown_session_is_not_found() {
    let store = SessionStore::new();
    assert!(matches!(
        output::collect(&store, "ghost").await,
        Err(AppError::NotFound(_))
    ));
}
