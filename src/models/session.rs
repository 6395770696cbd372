//! Session model and lifecycle helpers.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::output::RunnerOutput;

/// Kind of delegated work. Informational only; never affects scheduling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Writing new code.
    Implementation,
    /// Investigating a codebase or problem.
    Analysis,
    /// Writing or running tests.
    Testing,
    /// Reviewing existing changes.
    Review,
    /// Producing documentation.
    Documentation,
    /// Coordinating other sessions.
    Coordination,
}

impl Display for SessionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Implementation => "implementation",
            Self::Analysis => "analysis",
            Self::Testing => "testing",
            Self::Review => "review",
            Self::Documentation => "documentation",
            Self::Coordination => "coordination",
        };
        f.write_str(label)
    }
}

/// Lifecycle status for a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, waiting for dependencies.
    Pending,
    /// Dependencies satisfied; start request issued to the runner.
    Queued,
    /// Runner acknowledged the start.
    Running,
    /// Runner reported success.
    Completed,
    /// Runner reported failure or refused to start.
    Failed,
    /// Cancelled because an ancestor failed or was cancelled.
    Cancelled,
}

impl SessionStatus {
    /// Whether no further transition can leave this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a dependent of a session in this status must be cancelled.
    #[must_use]
    pub fn blocks_dependents(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Determine whether moving from `self` to `next` is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Queued)
                | (Self::Queued, Self::Running | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed)
                | (
                    Self::Pending | Self::Queued | Self::Running,
                    Self::Cancelled
                )
        )
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Classification of a recorded session error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// Runner refused or was unable to start the session.
    StartFailure,
    /// Runner reported the session failed during execution.
    RunnerFailure,
}

/// Error descriptor recorded on a `failed` session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionError {
    /// Failure classification.
    pub kind: SessionErrorKind,
    /// Human-readable reason supplied by the runner.
    pub message: String,
}

impl SessionError {
    /// Error for a session the runner refused to start.
    #[must_use]
    pub fn start_failure(message: impl Into<String>) -> Self {
        Self {
            kind: SessionErrorKind::StartFailure,
            message: message.into(),
        }
    }

    /// Error for a session the runner reported as failed.
    #[must_use]
    pub fn runner_failure(message: impl Into<String>) -> Self {
        Self {
            kind: SessionErrorKind::RunnerFailure,
            message: message.into(),
        }
    }
}

/// Creation request for a session.
///
/// `requirements`, `repository`, `context` and `branch` are opaque to the
/// orchestrator and passed to the runner unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSession {
    /// Kind of work.
    pub kind: SessionKind,
    /// Task description.
    pub requirements: String,
    /// Ids of sessions that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Grouping key used for listing.
    #[serde(default)]
    pub orchestration_id: Option<String>,
    /// Target repository, e.g. `owner/repo`.
    #[serde(default)]
    pub repository: Option<String>,
    /// Additional free-form context.
    #[serde(default)]
    pub context: Option<String>,
    /// Target branch.
    #[serde(default)]
    pub branch: Option<String>,
}

impl NewSession {
    /// Request with no dependencies and no optional payload.
    #[must_use]
    pub fn new(kind: SessionKind, requirements: impl Into<String>) -> Self {
        Self {
            kind,
            requirements: requirements.into(),
            dependencies: Vec::new(),
            orchestration_id: None,
            repository: None,
            context: None,
            branch: None,
        }
    }

    /// Add dependency ids.
    #[must_use]
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Assign the orchestration grouping key.
    #[must_use]
    pub fn in_orchestration(mut self, orchestration_id: impl Into<String>) -> Self {
        self.orchestration_id = Some(orchestration_id.into());
        self
    }
}

/// Session domain entity held by the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Unique identifier, immutable.
    pub id: String,
    /// Kind of work.
    pub kind: SessionKind,
    /// Opaque task description.
    pub requirements: String,
    /// Ids of sessions that must complete first.
    pub dependencies: BTreeSet<String>,
    /// Optional grouping key.
    pub orchestration_id: Option<String>,
    /// Opaque target repository.
    pub repository: Option<String>,
    /// Opaque additional context.
    pub context: Option<String>,
    /// Opaque target branch.
    pub branch: Option<String>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Whether a caller asked for this session to be started.
    pub start_requested: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once on the transition to `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set once on the transition to a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Output as reported by the runner; only set on `completed`.
    pub output: Option<RunnerOutput>,
    /// Only set on `failed`.
    pub error: Option<SessionError>,
    /// Reason recorded on propagated cancellation.
    pub cancel_reason: Option<String>,
}

impl Session {
    /// Construct a `pending` session from a creation request.
    #[must_use]
    pub fn new(request: NewSession) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: request.kind,
            requirements: request.requirements,
            dependencies: request.dependencies.into_iter().collect(),
            orchestration_id: request.orchestration_id,
            repository: request.repository,
            context: request.context,
            branch: request.branch,
            status: SessionStatus::Pending,
            start_requested: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            output: None,
            error: None,
            cancel_reason: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// Wall-clock time between start and finish, when both are known.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// A status change with the fields it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `pending → queued`.
    Queue,
    /// `queued → running`.
    Start,
    /// `running → completed`.
    Complete(RunnerOutput),
    /// `queued | running → failed`.
    Fail(SessionError),
    /// `pending | queued | running → cancelled`.
    Cancel {
        /// Why the session was cancelled.
        reason: String,
    },
}

impl Transition {
    /// Status this transition moves a session into.
    #[must_use]
    pub fn target(&self) -> SessionStatus {
        match self {
            Self::Queue => SessionStatus::Queued,
            Self::Start => SessionStatus::Running,
            Self::Complete(_) => SessionStatus::Completed,
            Self::Fail(_) => SessionStatus::Failed,
            Self::Cancel { .. } => SessionStatus::Cancelled,
        }
    }
}

impl Session {
    /// Apply a transition in place, stamping the timestamps it owns.
    ///
    /// Returns the previous status on success. The session is left
    /// untouched when the transition is not permitted.
    pub(crate) fn apply(&mut self, transition: Transition) -> Option<SessionStatus> {
        let next = transition.target();
        if !self.can_transition_to(next) {
            return None;
        }

        let previous = self.status;
        let now = Utc::now();
        match transition {
            Transition::Queue => {}
            Transition::Start => self.started_at = Some(now),
            Transition::Complete(output) => self.output = Some(output),
            Transition::Fail(error) => self.error = Some(error),
            Transition::Cancel { reason } => self.cancel_reason = Some(reason),
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Some(previous)
    }
}
