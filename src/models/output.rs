//! Session output as reported by a runner and in normalized form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Output payload exactly as the runner supplied it.
///
/// Every field is optional; the runner may omit any of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerOutput {
    /// Short description of what was accomplished.
    #[serde(default)]
    pub summary: Option<String>,
    /// Paths of files created.
    #[serde(default)]
    pub files_created: Option<Vec<String>>,
    /// Paths of files modified.
    #[serde(default)]
    pub files_modified: Option<Vec<String>>,
    /// Number of tests that passed.
    #[serde(default)]
    pub tests_passed: Option<u32>,
    /// Error messages encountered during an otherwise successful run.
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    /// Log lines.
    #[serde(default)]
    pub logs: Option<Vec<String>>,
    /// Free-form numeric or structured metrics.
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, serde_json::Value>>,
    /// Produced artifacts (commits, pull requests, files).
    #[serde(default)]
    pub artifacts: Option<Vec<serde_json::Value>>,
    /// Suggested follow-up work.
    #[serde(default)]
    pub next_steps: Option<Vec<String>>,
}

/// Normalized output returned to callers. Omitted fields are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionOutput {
    /// Short description of what was accomplished.
    pub summary: String,
    /// Paths of files created.
    pub files_created: Vec<String>,
    /// Paths of files modified.
    pub files_modified: Vec<String>,
    /// Number of tests that passed.
    pub tests_passed: u32,
    /// Error messages encountered during the run.
    pub errors: Vec<String>,
    /// Log lines.
    pub logs: Vec<String>,
    /// Free-form metrics.
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Produced artifacts.
    pub artifacts: Vec<serde_json::Value>,
    /// Suggested follow-up work.
    pub next_steps: Vec<String>,
}

impl From<RunnerOutput> for SessionOutput {
    fn from(raw: RunnerOutput) -> Self {
        Self {
            summary: raw.summary.unwrap_or_default(),
            files_created: raw.files_created.unwrap_or_default(),
            files_modified: raw.files_modified.unwrap_or_default(),
            tests_passed: raw.tests_passed.unwrap_or_default(),
            errors: raw.errors.unwrap_or_default(),
            logs: raw.logs.unwrap_or_default(),
            metrics: raw.metrics.unwrap_or_default(),
            artifacts: raw.artifacts.unwrap_or_default(),
            next_steps: raw.next_steps.unwrap_or_default(),
        }
    }
}
