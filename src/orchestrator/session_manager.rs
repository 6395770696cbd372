//! Caller-facing session operations.
//!
//! [`SessionManager`] wires the session store, scheduler and waiter
//! together and exposes the operations an outer CLI or API layer needs:
//! create, start, inspect, list, wait and collect output, plus batch
//! submission of an [`OrchestrationPlan`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::dependency_graph::DependencyGraph;
use super::output;
use super::scheduler::{self, Scheduler};
use super::session_store::SessionStore;
use super::waiter::Waiter;
use crate::config::GlobalConfig;
use crate::models::output::SessionOutput;
use crate::models::plan::{OrchestrationPlan, PlannedSession};
use crate::models::session::{NewSession, Session, SessionStatus};
use crate::runner::{CallbackSink, Runner};
use crate::{AppError, Result};

/// Result of [`SessionManager::submit_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSubmission {
    /// Grouping key shared by every created session.
    pub orchestration_id: String,
    /// Plan-local name to created session id.
    pub session_ids: BTreeMap<String, String>,
}

/// Entry point for orchestration callers.
pub struct SessionManager {
    config: GlobalConfig,
    store: Arc<SessionStore>,
    waiter: Waiter,
    callbacks: CallbackSink,
    cancel: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build the store, spawn the scheduler and return the manager.
    ///
    /// `make_runner` receives the sink the runner must report through.
    /// Must be called from within a Tokio runtime.
    pub fn start<F, R>(config: GlobalConfig, make_runner: F) -> Self
    where
        F: FnOnce(CallbackSink) -> R,
        R: Runner + 'static,
    {
        Self::with_store(config, Arc::new(SessionStore::new()), make_runner)
    }

    /// Like [`start`](Self::start) over a caller-provided store, e.g. one
    /// built with [`SessionStore::with_event_capacity`].
    pub fn with_store<F, R>(
        config: GlobalConfig,
        store: Arc<SessionStore>,
        make_runner: F,
    ) -> Self
    where
        F: FnOnce(CallbackSink) -> R,
        R: Runner + 'static,
    {
        let (callbacks, inbox) = scheduler::inbox(config.scheduler.inbox_capacity);
        let runner: Arc<dyn Runner> = Arc::new(make_runner(callbacks.clone()));
        let cancel = CancellationToken::new();

        let handle = Scheduler::new(
            Arc::clone(&store),
            runner,
            config.scheduler.clone(),
            inbox,
            cancel.clone(),
        )
        .spawn();

        let waiter = Waiter::new(
            Arc::clone(&store),
            Duration::from_secs(config.waiter.poll_interval_seconds),
        );

        Self {
            config,
            store,
            waiter,
            callbacks,
            cancel,
            scheduler: Mutex::new(Some(handle)),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Sink for delivering runner callbacks from an external runtime.
    #[must_use]
    pub fn callback_sink(&self) -> CallbackSink {
        self.callbacks.clone()
    }

    /// Create a session in `pending`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` or `AppError::CycleDetected`; no
    /// session is stored on error.
    pub async fn create_session(&self, request: NewSession) -> Result<Session> {
        self.store.create(request).await
    }

    /// Record intent to start a session.
    ///
    /// Idempotent, and a no-op for sessions already past `pending`. The
    /// actual start remains gated by dependency readiness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn start_session(&self, session_id: &str) -> Result<Session> {
        let session = self.store.request_start(session_id).await?;
        info!(session_id, status = %session.status, "start requested");
        Ok(session)
    }

    /// Current snapshot of a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get_session_status(&self, session_id: &str) -> Result<Session> {
        self.store.get(session_id).await
    }

    /// Normalized output of a completed session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::NotCompleted`.
    pub async fn get_session_output(&self, session_id: &str) -> Result<SessionOutput> {
        output::collect(&self.store, session_id).await
    }

    /// Sessions matching the filters, in creation order.
    pub async fn list_sessions(
        &self,
        orchestration_id: Option<&str>,
        status: Option<SessionStatus>,
    ) -> Vec<Session> {
        self.store.list(orchestration_id, status).await
    }

    /// Wait for a session to reach a terminal status.
    ///
    /// `None` arguments fall back to the configured waiter defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Timeout`.
    pub async fn wait_for_session(
        &self,
        session_id: &str,
        timeout: Option<Duration>,
        poll_interval: Option<Duration>,
    ) -> Result<Session> {
        let timeout = timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.waiter.default_timeout_seconds));
        let poll_interval = poll_interval
            .unwrap_or_else(|| Duration::from_secs(self.config.waiter.poll_interval_seconds));
        self.waiter
            .wait_with_interval(session_id, timeout, poll_interval)
            .await
    }

    /// Validate and create every session of a plan.
    ///
    /// The whole plan is checked before anything is created: duplicate or
    /// empty names, dependencies that are neither plan names nor existing
    /// session ids, and cycles between plan entries are all rejected.
    /// Sessions are then created in dependency order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` or `AppError::CycleDetected` (cycle
    /// reported with plan-local names).
    pub async fn submit_plan(&self, plan: OrchestrationPlan) -> Result<PlanSubmission> {
        let orchestration_id = plan
            .orchestration_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = info_span!("submit_plan", orchestration_id = %orchestration_id);

        async move {
            let order = self.validate_plan(&plan).await?;
            let by_name: HashMap<&str, &PlannedSession> = plan
                .sessions
                .iter()
                .map(|planned| (planned.name.as_str(), planned))
                .collect();

            let mut session_ids = BTreeMap::new();
            for name in order {
                let Some(planned) = by_name.get(name.as_str()) else {
                    continue;
                };
                let dependencies = planned
                    .depends_on
                    .iter()
                    .map(|dep| session_ids.get(dep).cloned().unwrap_or_else(|| dep.clone()))
                    .collect();
                let session = self
                    .store
                    .create(planned.to_request(dependencies, &orchestration_id))
                    .await?;
                session_ids.insert(name, session.id);
            }

            info!(sessions = session_ids.len(), "plan submitted");
            Ok(PlanSubmission {
                orchestration_id,
                session_ids,
            })
        }
        .instrument(span)
        .await
    }

    /// Check a plan and return its entries in dependency order.
    async fn validate_plan(&self, plan: &OrchestrationPlan) -> Result<Vec<String>> {
        if plan.sessions.is_empty() {
            return Err(AppError::Validation("plan has no sessions".into()));
        }

        let mut names = HashSet::new();
        for planned in &plan.sessions {
            if planned.name.trim().is_empty() {
                return Err(AppError::Validation("plan session name must not be empty".into()));
            }
            if planned.requirements.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "plan session {} has empty requirements",
                    planned.name
                )));
            }
            if !names.insert(planned.name.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate plan session name {}",
                    planned.name
                )));
            }
        }

        let mut graph = DependencyGraph::new();
        for planned in &plan.sessions {
            graph.add_node(&planned.name);
            for dep in &planned.depends_on {
                if !names.contains(dep.as_str()) && !self.store.contains(dep).await {
                    return Err(AppError::Validation(format!(
                        "plan session {} depends on unknown {dep}",
                        planned.name
                    )));
                }
            }
        }
        for planned in &plan.sessions {
            let local: Vec<String> = planned
                .depends_on
                .iter()
                .filter(|dep| names.contains(dep.as_str()))
                .cloned()
                .collect();
            graph.add_edges(&planned.name, &local)?;
        }

        Ok(graph.topological_order())
    }

    /// Stop the scheduler and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.scheduler.lock().await.take() {
            let _ = handle.await;
        }
        info!("session manager shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
