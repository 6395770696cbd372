//! Scheduler control loop.
//!
//! A single task owns every scheduler-driven transition. It reacts to:
//!
//! - store events (creation, start intent, terminal transitions),
//! - commands on its inbound queue (runner callbacks, start acknowledgements),
//! - a reconciliation tick that re-scans `pending` sessions in case an
//!   event was lost.
//!
//! Runner start requests run on their own tasks so a slow runner never
//! stalls the loop; their outcome comes back through the same queue.
//! Callbacks that arrive for a session whose start acknowledgement is
//! still in flight are held back and replayed after it, preserving
//! per-session order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::session_store::{SessionStore, StoreEvent};
use crate::config::{SchedulerConfig, StartPolicy};
use crate::models::session::{Session, SessionError, SessionStatus, Transition};
use crate::runner::{CallbackSink, Runner, RunnerReport, StartAck, StatusCallback};
use crate::{AppError, Result};

/// Commands delivered to the scheduler's inbound queue.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Status report from the runner.
    Callback(StatusCallback),
    /// Result of a [`Runner::start`] call.
    StartOutcome {
        /// Session that was started.
        session_id: String,
        /// Runner acknowledgement or infrastructure error.
        outcome: Result<StartAck>,
    },
}

/// Receiving half of the scheduler queue.
pub struct SchedulerInbox {
    tx: mpsc::Sender<SchedulerCommand>,
    rx: mpsc::Receiver<SchedulerCommand>,
}

/// Create the scheduler queue, returning the runner-facing sink and the inbox.
#[must_use]
pub fn inbox(capacity: usize) -> (CallbackSink, SchedulerInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CallbackSink::new(tx.clone()), SchedulerInbox { tx, rx })
}

/// Builder for the scheduler loop. Call [`spawn`](Self::spawn) to start it.
pub struct Scheduler {
    store: Arc<SessionStore>,
    runner: Arc<dyn Runner>,
    config: SchedulerConfig,
    inbox: SchedulerInbox,
    events: broadcast::Receiver<StoreEvent>,
    cancel: CancellationToken,
    in_flight: HashSet<String>,
    deferred: HashMap<String, Vec<StatusCallback>>,
}

impl Scheduler {
    /// Construct a scheduler. Subscribes to store events immediately so
    /// nothing committed after this call is missed.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        runner: Arc<dyn Runner>,
        config: SchedulerConfig,
        inbox: SchedulerInbox,
        cancel: CancellationToken,
    ) -> Self {
        let events = store.subscribe_events();
        Self {
            store,
            runner,
            config,
            inbox,
            events,
            cancel,
            in_flight: HashSet::new(),
            deferred: HashMap::new(),
        }
    }

    /// Spawn the control loop.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().instrument(info_span!("scheduler")))
    }

    async fn run(mut self) {
        let mut tick = tokio::time::interval(self.config.reconcile_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            reconcile_interval_seconds = self.config.reconcile_interval_seconds,
            start_policy = ?self.config.start_policy,
            "scheduler started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
                Some(command) = self.inbox.rx.recv() => self.handle_command(command).await,
                event = self.events.recv() => match event {
                    Ok(event) => self.handle_store_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "scheduler lagged behind store events, reconciling");
                        self.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("store event channel closed");
                        break;
                    }
                },
                _ = tick.tick() => self.reconcile().await,
            }
        }
    }

    async fn handle_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Created { session_id } | StoreEvent::StartRequested { session_id } => {
                self.evaluate(&session_id).await;
            }
            StoreEvent::StatusChanged { session_id, to, .. } if to.is_terminal() => {
                for dependent in self.store.dependents(&session_id).await {
                    self.evaluate(&dependent).await;
                }
            }
            StoreEvent::StatusChanged { .. } => {}
        }
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Callback(callback) => {
                if self.in_flight.contains(&callback.session_id) {
                    debug!(session_id = %callback.session_id, "deferring callback until start is acknowledged");
                    self.deferred
                        .entry(callback.session_id.clone())
                        .or_default()
                        .push(callback);
                } else {
                    self.apply_callback(callback).await;
                }
            }
            SchedulerCommand::StartOutcome {
                session_id,
                outcome,
            } => {
                self.in_flight.remove(&session_id);
                self.apply_start_outcome(&session_id, outcome).await;
                for callback in self.deferred.remove(&session_id).unwrap_or_default() {
                    self.apply_callback(callback).await;
                }
            }
        }
    }

    /// Re-evaluate every `pending` session.
    async fn reconcile(&mut self) {
        let pending = self.store.ids_with_status(SessionStatus::Pending).await;
        debug!(pending = pending.len(), "reconciliation tick");
        for session_id in pending {
            self.evaluate(&session_id).await;
        }
    }

    /// Move a `pending` session forward if its dependencies allow it.
    async fn evaluate(&mut self, session_id: &str) {
        let session = match self.store.get(session_id).await {
            Ok(session) => session,
            Err(err) => {
                warn!(session_id, %err, "cannot evaluate unknown session");
                return;
            }
        };
        if session.status != SessionStatus::Pending {
            return;
        }

        if let Some((dependency, status)) = self.store.blocking_dependency(session_id).await {
            let reason = format!("dependency {dependency} {status}");
            match self
                .store
                .update_status(session_id, Transition::Cancel { reason })
                .await
            {
                Ok(_) => info!(session_id, %dependency, %status, "session cancelled by failed dependency"),
                Err(err) => debug!(session_id, %err, "cancellation raced with another transition"),
            }
            return;
        }

        if self.config.start_policy == StartPolicy::Explicit && !session.start_requested {
            debug!(session_id, "waiting for explicit start request");
            return;
        }

        if !self.store.ready(session_id).await {
            return;
        }

        match self.store.update_status(session_id, Transition::Queue).await {
            Ok(queued) => {
                info!(session_id, "session queued");
                self.dispatch(queued);
            }
            Err(err) => debug!(session_id, %err, "queue transition raced with another transition"),
        }
    }

    /// Issue the runner start request on its own task.
    fn dispatch(&mut self, session: Session) {
        let session_id = session.id.clone();
        self.in_flight.insert(session_id.clone());

        let runner = Arc::clone(&self.runner);
        let tx = self.inbox.tx.clone();
        let span = info_span!("dispatch", session_id = %session_id);
        tokio::spawn(
            async move {
                // A panicking runner still yields an outcome.
                let start = tokio::spawn(
                    async move { runner.start(session).await }.in_current_span(),
                );
                let outcome = match start.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(%err, "runner start aborted");
                        Err(AppError::Runner(format!("runner start aborted: {err}")))
                    }
                };
                if tx
                    .send(SchedulerCommand::StartOutcome {
                        session_id,
                        outcome,
                    })
                    .await
                    .is_err()
                {
                    warn!("scheduler gone before start outcome was delivered");
                }
            }
            .instrument(span),
        );
    }

    async fn apply_start_outcome(&self, session_id: &str, outcome: Result<StartAck>) {
        let transition = match outcome {
            Ok(StartAck::Accepted) => Transition::Start,
            Ok(StartAck::Rejected { reason }) => {
                warn!(session_id, %reason, "runner rejected session");
                Transition::Fail(SessionError::start_failure(reason))
            }
            Err(err) => {
                warn!(session_id, %err, "runner failed to start session");
                Transition::Fail(SessionError::start_failure(err.to_string()))
            }
        };

        match self.store.update_status(session_id, transition).await {
            Ok(session) => info!(session_id, status = %session.status, "start acknowledged"),
            Err(err) => warn!(session_id, %err, "discarding start outcome"),
        }
    }

    /// Apply a runner callback, discarding it if it implies an invalid transition.
    async fn apply_callback(&self, callback: StatusCallback) {
        let StatusCallback { session_id, report } = callback;
        let transition = match report {
            RunnerReport::Running => {
                if self.store.status(&session_id).await.ok() == Some(SessionStatus::Running) {
                    debug!(session_id = %session_id, "duplicate running report");
                    return;
                }
                Transition::Start
            }
            RunnerReport::Completed { output } => Transition::Complete(output),
            RunnerReport::Failed { error } => {
                Transition::Fail(SessionError::runner_failure(error))
            }
        };

        match self.store.update_status(&session_id, transition).await {
            Ok(session) => info!(session_id = %session_id, status = %session.status, "runner callback applied"),
            Err(err @ (AppError::InvalidTransition { .. } | AppError::NotFound(_))) => {
                warn!(session_id = %session_id, %err, "discarding spurious runner callback");
            }
            Err(err) => warn!(session_id = %session_id, %err, "failed to apply runner callback"),
        }
    }
}
