//! Orchestration plan: a batch of sessions wired together by local names.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::session::{NewSession, SessionKind};
use crate::{AppError, Result};

/// One entry of an [`OrchestrationPlan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedSession {
    /// Name unique within the plan; used by `depends_on`.
    pub name: String,
    /// Kind of work.
    pub kind: SessionKind,
    /// Opaque task description.
    pub requirements: String,
    /// Plan-local names or existing session ids.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Opaque target repository.
    #[serde(default)]
    pub repository: Option<String>,
    /// Opaque additional context.
    #[serde(default)]
    pub context: Option<String>,
    /// Opaque target branch.
    #[serde(default)]
    pub branch: Option<String>,
}

impl PlannedSession {
    /// Build the creation request once dependency names are resolved to ids.
    #[must_use]
    pub fn to_request(&self, dependencies: Vec<String>, orchestration_id: &str) -> NewSession {
        NewSession {
            kind: self.kind,
            requirements: self.requirements.clone(),
            dependencies,
            orchestration_id: Some(orchestration_id.to_owned()),
            repository: self.repository.clone(),
            context: self.context.clone(),
            branch: self.branch.clone(),
        }
    }
}

/// A named set of sessions submitted together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestrationPlan {
    /// Grouping key; generated when absent.
    #[serde(default)]
    pub orchestration_id: Option<String>,
    /// Human-readable title.
    #[serde(default)]
    pub name: Option<String>,
    /// Sessions in the plan, in any order.
    #[serde(default)]
    pub sessions: Vec<PlannedSession>,
}

impl OrchestrationPlan {
    /// Load a plan from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read, or
    /// `AppError::Validation` if it is not a valid plan.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Io(format!("failed to read plan: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse a plan from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if parsing fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| AppError::Validation(format!("invalid plan: {err}")))
    }
}
