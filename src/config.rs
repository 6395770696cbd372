//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Whether creation alone makes a session eligible to start.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Sessions start as soon as their dependencies complete.
    #[default]
    Auto,
    /// Sessions additionally wait for an explicit `start_session`.
    Explicit,
}

/// Scheduler control loop settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Seconds between reconciliation scans of `pending` sessions.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    /// Capacity of the inbound callback queue.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
    /// Start gating policy.
    #[serde(default)]
    pub start_policy: StartPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_seconds: default_reconcile_interval(),
            inbox_capacity: default_inbox_capacity(),
            start_policy: StartPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Reconciliation tick as a [`Duration`].
    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_seconds)
    }
}

/// Waiter defaults used when callers do not supply their own.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WaiterConfig {
    /// Default wait deadline.
    #[serde(default = "default_wait_timeout")]
    pub default_timeout_seconds: u64,
    /// Fallback re-check interval while waiting.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: default_wait_timeout(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

/// Host CLI used by the process runner.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Host CLI binary (e.g., `claude`).
    #[serde(default = "default_host_cli")]
    pub host_cli: String,
    /// Arguments passed before the session payload.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Working directory for spawned processes.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            host_cli: default_host_cli(),
            host_cli_args: Vec::new(),
            working_dir: None,
        }
    }
}

fn default_reconcile_interval() -> u64 {
    5
}

fn default_inbox_capacity() -> usize {
    256
}

fn default_wait_timeout() -> u64 {
    3600
}

fn default_poll_interval() -> u64 {
    10
}

fn default_host_cli() -> String {
    "claude".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Waiter settings.
    #[serde(default)]
    pub waiter: WaiterConfig,
    /// Process runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.reconcile_interval_seconds == 0 {
            return Err(AppError::Config(
                "reconcile_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.scheduler.inbox_capacity == 0 {
            return Err(AppError::Config(
                "inbox_capacity must be greater than zero".into(),
            ));
        }

        if self.waiter.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.runner.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        Ok(())
    }
}
