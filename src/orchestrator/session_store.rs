//! In-memory session store.
//!
//! Owns every [`Session`] record together with the [`DependencyGraph`]
//! linking them. Each session sits behind its own mutex so transitions on
//! one id are serialized without a store-wide lock; cross-session reads
//! (readiness, dependents) only take read locks.
//!
//! Committed changes are published twice: on a per-session `watch`
//! channel consumed by waiters, and on a store-wide `broadcast` channel
//! consumed by the scheduler. Both are sent while the session lock is
//! still held, so observers see changes in commit order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info};

use super::dependency_graph::DependencyGraph;
use crate::models::session::{NewSession, Session, SessionStatus, Transition};
use crate::{AppError, Result};

/// Default capacity of the store-wide event channel.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Change notifications published by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A session was created in `pending`.
    Created {
        /// New session.
        session_id: String,
    },
    /// A caller recorded intent to start a session.
    StartRequested {
        /// Session the intent was recorded on.
        session_id: String,
    },
    /// A status transition was committed.
    StatusChanged {
        /// Session that moved.
        session_id: String,
        /// Status before the transition.
        from: SessionStatus,
        /// Status after the transition.
        to: SessionStatus,
    },
}

struct SessionEntry {
    /// Creation sequence number; orders sessions with equal timestamps.
    seq: u64,
    session: Mutex<Session>,
    status: watch::Sender<SessionStatus>,
}

/// Shared store of session records and their dependency edges.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    graph: RwLock<DependencyGraph>,
    next_seq: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty store with a custom event channel capacity.
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            sessions: RwLock::new(HashMap::new()),
            graph: RwLock::new(DependencyGraph::new()),
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Subscribe to store-wide change events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Create a `pending` session and record its dependency edges atomically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `requirements` is blank or a
    /// dependency id is unknown, and `AppError::CycleDetected` if the edges
    /// would close a cycle. Nothing is stored on error.
    pub async fn create(&self, request: NewSession) -> Result<Session> {
        if request.requirements.trim().is_empty() {
            return Err(AppError::Validation("requirements must not be empty".into()));
        }

        let mut graph = self.graph.write().await;
        let mut sessions = self.sessions.write().await;

        if let Some(unknown) = request
            .dependencies
            .iter()
            .find(|dep| !sessions.contains_key(dep.as_str()))
        {
            return Err(AppError::Validation(format!(
                "unknown dependency {unknown}"
            )));
        }

        let session = Session::new(request);
        let dependencies: Vec<String> = session.dependencies.iter().cloned().collect();
        graph.add_edges(&session.id, &dependencies)?;

        let (status, _) = watch::channel(session.status);
        let entry = Arc::new(SessionEntry {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            session: Mutex::new(session.clone()),
            status,
        });
        sessions.insert(session.id.clone(), entry);
        drop(sessions);
        drop(graph);

        info!(
            session_id = %session.id,
            kind = %session.kind,
            dependencies = session.dependencies.len(),
            "session created"
        );
        let _ = self.events.send(StoreEvent::Created {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    /// Retrieve a snapshot of a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let entry = self.entry(id).await?;
        let session = entry.session.lock().await;
        Ok(session.clone())
    }

    /// Whether a session with this id exists.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Current status of a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn status(&self, id: &str) -> Result<SessionStatus> {
        let entry = self.entry(id).await?;
        let status = *entry.status.borrow();
        Ok(status)
    }

    /// Snapshot of sessions matching the filters, oldest first.
    pub async fn list(
        &self,
        orchestration_id: Option<&str>,
        status: Option<SessionStatus>,
    ) -> Vec<Session> {
        let entries = self.ordered_entries().await;
        let mut matched = Vec::new();
        for entry in entries {
            let session = entry.session.lock().await;
            let orchestration_matches = orchestration_id
                .map_or(true, |wanted| session.orchestration_id.as_deref() == Some(wanted));
            let status_matches = status.map_or(true, |wanted| session.status == wanted);
            if orchestration_matches && status_matches {
                matched.push(session.clone());
            }
        }
        matched
    }

    /// Ids of sessions currently in `status`, oldest first.
    pub async fn ids_with_status(&self, status: SessionStatus) -> Vec<String> {
        let entries = self.ordered_entries().await;
        let mut ids = Vec::new();
        for entry in entries {
            if *entry.status.borrow() == status {
                ids.push(entry.session.lock().await.id.clone());
            }
        }
        ids
    }

    /// Apply a status transition atomically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist, or
    /// `AppError::InvalidTransition` if the target status is not reachable
    /// from the current one. The session is unchanged on error.
    pub async fn update_status(&self, id: &str, transition: Transition) -> Result<Session> {
        let entry = self.entry(id).await?;
        let mut session = entry.session.lock().await;

        let to = transition.target();
        let Some(from) = session.apply(transition) else {
            return Err(AppError::InvalidTransition {
                session_id: id.to_owned(),
                from: session.status,
                to,
            });
        };

        entry.status.send_replace(to);
        let _ = self.events.send(StoreEvent::StatusChanged {
            session_id: id.to_owned(),
            from,
            to,
        });
        debug!(session_id = id, %from, %to, "status committed");
        Ok(session.clone())
    }

    /// Record that a caller wants this session started. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn request_start(&self, id: &str) -> Result<Session> {
        let entry = self.entry(id).await?;
        let mut session = entry.session.lock().await;
        if !session.start_requested {
            session.start_requested = true;
            let _ = self.events.send(StoreEvent::StartRequested {
                session_id: id.to_owned(),
            });
        }
        Ok(session.clone())
    }

    /// Watch a session's status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn subscribe(&self, id: &str) -> Result<watch::Receiver<SessionStatus>> {
        let entry = self.entry(id).await?;
        Ok(entry.status.subscribe())
    }

    /// Direct dependencies of a session.
    pub async fn dependencies(&self, id: &str) -> Vec<String> {
        self.graph.read().await.dependencies(id)
    }

    /// Direct dependents of a session.
    pub async fn dependents(&self, id: &str) -> Vec<String> {
        self.graph.read().await.dependents(id)
    }

    /// True iff every dependency of the session is `completed`.
    pub async fn ready(&self, id: &str) -> bool {
        let graph = self.graph.read().await;
        let sessions = self.sessions.read().await;
        graph.ready(id, |dep| current_status(&sessions, dep))
    }

    /// True iff any dependency of the session is `failed` or `cancelled`.
    pub async fn blocked_by_failure(&self, id: &str) -> bool {
        let graph = self.graph.read().await;
        let sessions = self.sessions.read().await;
        graph.blocked_by_failure(id, |dep| current_status(&sessions, dep))
    }

    /// A `failed` or `cancelled` dependency of the session, if any.
    pub async fn blocking_dependency(&self, id: &str) -> Option<(String, SessionStatus)> {
        let graph = self.graph.read().await;
        let sessions = self.sessions.read().await;
        graph.blocking_dependency(id, |dep| current_status(&sessions, dep))
    }

    async fn entry(&self, id: &str) -> Result<Arc<SessionEntry>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
    }

    async fn ordered_entries(&self) -> Vec<Arc<SessionEntry>> {
        let mut entries: Vec<Arc<SessionEntry>> =
            self.sessions.read().await.values().cloned().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }
}

fn current_status(
    sessions: &HashMap<String, Arc<SessionEntry>>,
    id: &str,
) -> Option<SessionStatus> {
    sessions.get(id).map(|entry| *entry.status.borrow())
}
