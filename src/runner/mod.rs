//! Execution backend abstraction.
//!
//! The [`Runner`] trait decouples the orchestration core from whatever
//! actually performs a session's work. The scheduler calls
//! [`Runner::start`] once a session is queued; execution progress comes
//! back asynchronously through a [`CallbackSink`] as [`StatusCallback`]s.

pub mod process;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::output::RunnerOutput;
use crate::models::session::Session;
use crate::orchestrator::scheduler::SchedulerCommand;
use crate::{AppError, Result};

/// Acknowledgement returned by [`Runner::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartAck {
    /// The runner took the session and will report progress.
    Accepted,
    /// The runner refused the session.
    Rejected {
        /// Why the runner refused.
        reason: String,
    },
}

/// Progress reported by a runner for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunnerReport {
    /// Execution has begun.
    Running,
    /// Execution succeeded.
    Completed {
        /// Output as produced; omitted fields are filled on collection.
        #[serde(default)]
        output: RunnerOutput,
    },
    /// Execution failed.
    Failed {
        /// Failure description.
        error: String,
    },
}

/// Status callback delivered by a runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCallback {
    /// Session the report is about.
    pub session_id: String,
    /// What happened.
    #[serde(flatten)]
    pub report: RunnerReport,
}

impl StatusCallback {
    /// Parse a callback from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the payload is malformed.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Handle through which runners deliver [`StatusCallback`]s to the scheduler.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl CallbackSink {
    pub(crate) fn new(tx: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { tx }
    }

    /// Deliver a callback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runner` if the scheduler has shut down.
    pub async fn report(&self, callback: StatusCallback) -> Result<()> {
        self.tx
            .send(SchedulerCommand::Callback(callback))
            .await
            .map_err(|_| AppError::Runner("scheduler inbox closed".into()))
    }

    /// Report that a session began executing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runner` if the scheduler has shut down.
    pub async fn running(&self, session_id: &str) -> Result<()> {
        self.report(StatusCallback {
            session_id: session_id.to_owned(),
            report: RunnerReport::Running,
        })
        .await
    }

    /// Report that a session completed with `output`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runner` if the scheduler has shut down.
    pub async fn completed(&self, session_id: &str, output: RunnerOutput) -> Result<()> {
        self.report(StatusCallback {
            session_id: session_id.to_owned(),
            report: RunnerReport::Completed { output },
        })
        .await
    }

    /// Report that a session failed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Runner` if the scheduler has shut down.
    pub async fn failed(&self, session_id: &str, error: impl Into<String>) -> Result<()> {
        self.report(StatusCallback {
            session_id: session_id.to_owned(),
            report: RunnerReport::Failed {
                error: error.into(),
            },
        })
        .await
    }
}

/// Execution backend that performs a session's work.
pub trait Runner: Send + Sync {
    /// Ask the backend to start `session`.
    ///
    /// Returns once the backend has accepted or rejected the session;
    /// execution progress arrives later through the [`CallbackSink`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Runner`] on backend infrastructure failure. The
    /// scheduler records such errors as a start failure.
    fn start(
        &self,
        session: Session,
    ) -> Pin<Box<dyn Future<Output = Result<StartAck>> + Send + '_>>;
}
