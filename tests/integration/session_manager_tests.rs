//! Caller-facing session manager operations.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use session_orchestrator::models::output::RunnerOutput;
use session_orchestrator::models::session::{NewSession, SessionKind, SessionStatus};
use session_orchestrator::AppError;

use super::test_helpers::harness;

#[tokio::test]
async fn create_session_with_unknown_dependency_fails() {
    let h = harness().build();
    let err = h
        .manager
        .create_session(NewSession::new(SessionKind::Analysis, "x").depends_on(["missing"]))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Validation("unknown dependency missing".into()));
    assert!(h.manager.list_sessions(None, None).await.is_empty());
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let h = harness().build();
    let m = &h.manager;

    assert!(matches!(m.get_session_status("nope").await, Err(AppError::NotFound(_))));
    assert!(matches!(m.get_session_output("nope").await, Err(AppError::NotFound(_))));
    assert!(matches!(m.start_session("nope").await, Err(AppError::NotFound(_))));
    assert!(matches!(
        m.wait_for_session("nope", Some(Duration::from_millis(10)), None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn output_round_trips_with_default_filling() {
    let h = harness().build();
    let m = &h.manager;

    let session = m
        .create_session(NewSession::new(SessionKind::Documentation, "write the guide"))
        .await
        .expect("create");
    h.wait_for_status(&session.id, SessionStatus::Running).await;

    assert_eq!(
        m.get_session_output(&session.id).await.unwrap_err(),
        AppError::NotCompleted {
            session_id: session.id.clone(),
            status: SessionStatus::Running,
        }
    );

    let supplied = RunnerOutput {
        summary: Some("guide written".into()),
        files_created: Some(vec!["docs/guide.md".into()]),
        ..RunnerOutput::default()
    };
    m.callback_sink()
        .completed(&session.id, supplied.clone())
        .await
        .expect("complete");
    let completed = h.wait_terminal(&session.id).await;
    assert_eq!(completed.output, Some(supplied));

    let output = m.get_session_output(&session.id).await.expect("output");
    assert_eq!(output.summary, "guide written");
    assert_eq!(output.files_created, vec!["docs/guide.md".to_owned()]);
    assert!(output.files_modified.is_empty());
    assert_eq!(output.tests_passed, 0);
    assert!(output.metrics.is_empty());
}

#[tokio::test]
async fn wait_timeout_leaves_running_session_untouched() {
    let h = harness().build();
    let m = &h.manager;

    let session = m
        .create_session(NewSession::new(SessionKind::Testing, "long suite"))
        .await
        .expect("create");
    let running = h.wait_for_status(&session.id, SessionStatus::Running).await;

    let err = m
        .wait_for_session(
            &session.id,
            Some(Duration::from_millis(100)),
            Some(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AppError::Timeout {
            session_id: session.id.clone(),
            last_status: SessionStatus::Running,
        }
    );
    assert_eq!(
        m.get_session_status(&session.id).await.expect("get"),
        running
    );
}

#[tokio::test]
async fn list_filters_by_status() {
    let h = harness().build();
    let m = &h.manager;

    let first = m
        .create_session(NewSession::new(SessionKind::Review, "first"))
        .await
        .expect("first");
    let second = m
        .create_session(NewSession::new(SessionKind::Review, "second").depends_on([first.id.clone()]))
        .await
        .expect("second");
    h.wait_for_status(&first.id, SessionStatus::Running).await;

    let running = m.list_sessions(None, Some(SessionStatus::Running)).await;
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, first.id);

    let pending = m.list_sessions(None, Some(SessionStatus::Pending)).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
}

#[tokio::test]
async fn concurrent_creations_are_all_recorded() {
    let h = harness().build();
    let store = Arc::clone(h.manager.store());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .create(
                        NewSession::new(SessionKind::Implementation, format!("task {i}"))
                            .in_orchestration("burst"),
                    )
                    .await
            })
        })
        .collect();
    let mut created = HashSet::new();
    for handle in handles {
        created.insert(handle.await.expect("join").expect("create").id);
    }

    let listed = h.manager.list_sessions(Some("burst"), None).await;
    assert_eq!(listed.len(), 16);
    assert!(listed.iter().all(|session| created.contains(&session.id)));
    assert!(listed
        .windows(2)
        .all(|pair| pair[0].created_at <= pair[1].created_at));
}
