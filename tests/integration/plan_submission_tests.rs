//! Batch submission of orchestration plans.

use session_orchestrator::models::output::RunnerOutput;
use session_orchestrator::models::plan::{OrchestrationPlan, PlannedSession};
use session_orchestrator::models::session::{NewSession, SessionKind, SessionStatus};
use session_orchestrator::AppError;

use super::test_helpers::{harness, Script};

fn planned(name: &str, depends_on: &[&str]) -> PlannedSession {
    PlannedSession {
        name: name.to_owned(),
        kind: SessionKind::Implementation,
        requirements: format!("do {name}"),
        depends_on: depends_on.iter().map(|s| (*s).to_owned()).collect(),
        repository: Some("acme/widgets".into()),
        context: None,
        branch: None,
    }
}

fn plan(sessions: Vec<PlannedSession>) -> OrchestrationPlan {
    OrchestrationPlan {
        orchestration_id: Some("orch-1".into()),
        name: Some("test plan".into()),
        sessions,
    }
}

#[tokio::test]
async fn plan_names_resolve_to_created_ids() {
    let h = harness().build();
    let m = &h.manager;

    // Entries listed out of dependency order.
    let submission = m
        .submit_plan(plan(vec![
            planned("review", &["build"]),
            planned("build", &["design"]),
            planned("design", &[]),
        ]))
        .await
        .expect("submit");

    assert_eq!(submission.orchestration_id, "orch-1");
    assert_eq!(submission.session_ids.len(), 3);

    let design = &submission.session_ids["design"];
    let build = &submission.session_ids["build"];
    let review = &submission.session_ids["review"];

    let build_session = m.get_session_status(build).await.expect("build");
    assert!(build_session.dependencies.contains(design));
    assert_eq!(build_session.repository.as_deref(), Some("acme/widgets"));
    assert_eq!(build_session.requirements, "do build");
    let review_session = m.get_session_status(review).await.expect("review");
    assert!(review_session.dependencies.contains(build));

    let listed: Vec<String> = m
        .list_sessions(Some("orch-1"), None)
        .await
        .into_iter()
        .map(|session| session.id)
        .collect();
    assert_eq!(listed, vec![design.clone(), build.clone(), review.clone()]);
}

#[tokio::test]
async fn cyclic_plan_is_rejected_and_nothing_is_created() {
    let h = harness().build();
    let err = h
        .manager
        .submit_plan(plan(vec![
            planned("a", &["b"]),
            planned("b", &["a"]),
            planned("c", &[]),
        ]))
        .await
        .unwrap_err();

    let AppError::CycleDetected { cycle } = err else {
        panic!("expected cycle, got {err:?}");
    };
    assert_eq!(cycle.first(), cycle.last());
    assert!(cycle.contains(&"a".to_owned()) && cycle.contains(&"b".to_owned()));
    assert!(h.manager.list_sessions(None, None).await.is_empty());
}

#[tokio::test]
async fn self_dependency_in_plan_is_a_cycle() {
    let h = harness().build();
    let err = h
        .manager
        .submit_plan(plan(vec![planned("solo", &["solo"])]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AppError::CycleDetected {
            cycle: vec!["solo".into(), "solo".into()]
        }
    );
}

#[tokio::test]
async fn invalid_plans_are_rejected_before_creation() {
    let h = harness().build();
    let m = &h.manager;

    let empty = m.submit_plan(plan(Vec::new())).await.unwrap_err();
    assert_eq!(empty, AppError::Validation("plan has no sessions".into()));

    let duplicate = m
        .submit_plan(plan(vec![planned("x", &[]), planned("x", &[])]))
        .await
        .unwrap_err();
    assert_eq!(
        duplicate,
        AppError::Validation("duplicate plan session name x".into())
    );

    let unknown = m
        .submit_plan(plan(vec![planned("x", &[]), planned("y", &["ghost"])]))
        .await
        .unwrap_err();
    assert_eq!(
        unknown,
        AppError::Validation("plan session y depends on unknown ghost".into())
    );

    let unnamed = m
        .submit_plan(plan(vec![planned(" ", &[])]))
        .await
        .unwrap_err();
    assert!(matches!(unnamed, AppError::Validation(_)));

    let blank = m
        .submit_plan(plan(vec![PlannedSession {
            requirements: String::new(),
            ..planned("x", &[])
        }]))
        .await
        .unwrap_err();
    assert!(matches!(blank, AppError::Validation(_)));

    assert!(m.list_sessions(None, None).await.is_empty());
}

#[tokio::test]
async fn plan_may_depend_on_existing_sessions() {
    let h = harness().default_script(Script::Complete(RunnerOutput::default())).build();
    let m = &h.manager;

    let existing = m
        .create_session(NewSession::new(SessionKind::Analysis, "survey"))
        .await
        .expect("existing");
    let submission = m
        .submit_plan(plan(vec![planned("follow-up", &[existing.id.as_str()])]))
        .await
        .expect("submit");

    let follow_up = &submission.session_ids["follow-up"];
    let session = h.wait_terminal(follow_up).await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.dependencies.contains(&existing.id));
}

#[tokio::test]
async fn missing_orchestration_id_is_generated() {
    let h = harness().build();
    let submission = h
        .manager
        .submit_plan(OrchestrationPlan {
            orchestration_id: None,
            name: None,
            sessions: vec![planned("only", &[])],
        })
        .await
        .expect("submit");

    assert!(!submission.orchestration_id.is_empty());
    let listed = h
        .manager
        .list_sessions(Some(&submission.orchestration_id), None)
        .await;
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn orchestration_filter_ignores_unrelated_sessions() {
    let h = harness().build();
    let m = &h.manager;

    for i in 0..5 {
        m.create_session(
            NewSession::new(SessionKind::Testing, format!("noise {i}")).in_orchestration("other"),
        )
        .await
        .expect("noise");
    }
    let submission = m
        .submit_plan(plan(vec![planned("one", &[]), planned("two", &["one"])]))
        .await
        .expect("submit");
    m.create_session(NewSession::new(SessionKind::Review, "ungrouped"))
        .await
        .expect("ungrouped");

    let listed = m.list_sessions(Some("orch-1"), None).await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, submission.session_ids["one"]);
    assert_eq!(listed[1].id, submission.session_ids["two"]);
    assert!(listed
        .iter()
        .all(|session| session.orchestration_id.as_deref() == Some("orch-1")));
}
