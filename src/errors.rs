//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::models::session::SessionStatus;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Bad input at creation: unknown dependency, malformed fields.
    Validation(String),
    /// Adding the requested edges would close a dependency cycle.
    CycleDetected {
        /// Offending cycle, first id repeated at the end.
        cycle: Vec<String>,
    },
    /// Requested session does not exist.
    NotFound(String),
    /// State machine violation, including a malformed runner callback.
    InvalidTransition {
        /// Session the transition was attempted on.
        session_id: String,
        /// Status at the time of the attempt.
        from: SessionStatus,
        /// Requested status.
        to: SessionStatus,
    },
    /// Runner refused to start a session.
    StartFailure(String),
    /// Waiter deadline exceeded before a terminal state was observed.
    Timeout {
        /// Session being waited on.
        session_id: String,
        /// Last status observed before the deadline.
        last_status: SessionStatus,
    },
    /// Output requested for a session that has not completed.
    NotCompleted {
        /// Session whose output was requested.
        session_id: String,
        /// Status at the time of the request.
        status: SessionStatus,
    },
    /// Configuration parsing or validation failure.
    Config(String),
    /// Runner infrastructure failure (spawn, channel closed).
    Runner(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::CycleDetected { cycle } => write!(f, "cycle detected: {}", cycle.join(" -> ")),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidTransition {
                session_id,
                from,
                to,
            } => write!(f, "invalid transition: session {session_id} {from} -> {to}"),
            Self::StartFailure(msg) => write!(f, "start failure: {msg}"),
            Self::Timeout {
                session_id,
                last_status,
            } => write!(
                f,
                "timeout: session {session_id} still {last_status} at deadline"
            ),
            Self::NotCompleted { session_id, status } => {
                write!(f, "not completed: session {session_id} is {status}")
            }
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Runner(msg) => write!(f, "runner: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed payload: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
