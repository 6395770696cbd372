#![forbid(unsafe_code)]

//! `session-orchestrator`: runs an orchestration plan to completion.
//!
//! Loads configuration and a plan file, submits the plan, drives every
//! session through the host CLI runner, and prints a JSON report of the
//! final session states on stdout.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use session_orchestrator::config::{GlobalConfig, StartPolicy};
use session_orchestrator::models::output::SessionOutput;
use session_orchestrator::models::plan::OrchestrationPlan;
use session_orchestrator::models::session::{Session, SessionStatus};
use session_orchestrator::orchestrator::session_manager::{PlanSubmission, SessionManager};
use session_orchestrator::runner::process::ProcessRunner;
use session_orchestrator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "session-orchestrator", about = "Dependency-aware session orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the orchestration plan (TOML).
    plan: PathBuf,

    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overall deadline for the plan; defaults to the waiter timeout.
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("session-orchestrator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration and plan ─────────────────────
    let config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let plan = OrchestrationPlan::load_from_path(&args.plan)?;
    info!(sessions = plan.sessions.len(), "plan loaded");

    let deadline = Duration::from_secs(
        args.timeout_seconds
            .unwrap_or(config.waiter.default_timeout_seconds),
    );

    // ── Start the orchestrator ──────────────────────────
    let runner_config = config.runner.clone();
    let explicit_start = config.scheduler.start_policy == StartPolicy::Explicit;
    let manager = SessionManager::start(config, |sink| ProcessRunner::new(runner_config, sink));

    let submission = manager.submit_plan(plan).await?;
    if explicit_start {
        for session_id in submission.session_ids.values() {
            manager.start_session(session_id).await?;
        }
    }

    // ── Wait for every session or a shutdown signal ─────
    let report = tokio::select! {
        report = wait_all(&manager, &submission, deadline) => report,
        () = shutdown_signal() => {
            warn!("shutdown signal received before plan finished");
            manager.shutdown().await;
            return Err(AppError::Runner("interrupted".into()));
        }
    };

    let unfinished = report
        .iter()
        .filter(|entry| entry.status != SessionStatus::Completed)
        .count();

    let rendered = serde_json::json!({
        "orchestration_id": submission.orchestration_id,
        "sessions": report,
    });
    let text = serde_json::to_string_pretty(&rendered)
        .map_err(|err| AppError::Io(format!("failed to render report: {err}")))?;
    println!("{text}");

    manager.shutdown().await;

    if unfinished > 0 {
        error!(unfinished, "orchestration finished with incomplete sessions");
        return Err(AppError::Runner(format!(
            "{unfinished} session(s) did not complete"
        )));
    }
    info!("orchestration completed");
    Ok(())
}

/// Final state of one plan entry.
#[derive(Debug, serde::Serialize)]
struct ReportEntry {
    name: String,
    session_id: String,
    status: SessionStatus,
    timed_out: bool,
    duration_seconds: Option<i64>,
    output: Option<SessionOutput>,
    error: Option<String>,
    cancel_reason: Option<String>,
}

impl ReportEntry {
    fn from_session(name: &str, session: Session, output: Option<SessionOutput>) -> Self {
        Self {
            name: name.to_owned(),
            session_id: session.id.clone(),
            status: session.status,
            timed_out: false,
            duration_seconds: session.duration().map(|d| d.num_seconds()),
            output,
            error: session.error.map(|err| err.message),
            cancel_reason: session.cancel_reason,
        }
    }
}

async fn wait_all(
    manager: &SessionManager,
    submission: &PlanSubmission,
    deadline: Duration,
) -> Vec<ReportEntry> {
    // An unrepresentable deadline leaves every wait unbounded.
    let deadline = Instant::now().checked_add(deadline);
    let mut report = Vec::with_capacity(submission.session_ids.len());

    for (name, session_id) in &submission.session_ids {
        let remaining = deadline.map_or(Duration::MAX, |deadline| {
            deadline.saturating_duration_since(Instant::now())
        });
        match manager.wait_for_session(session_id, Some(remaining), None).await {
            Ok(session) => {
                let output = manager.get_session_output(session_id).await.ok();
                report.push(ReportEntry::from_session(name, session, output));
            }
            Err(AppError::Timeout { last_status, .. }) => {
                warn!(%name, %session_id, %last_status, "session did not finish before deadline");
                report.push(ReportEntry {
                    name: name.clone(),
                    session_id: session_id.clone(),
                    status: last_status,
                    timed_out: true,
                    duration_seconds: None,
                    output: None,
                    error: None,
                    cancel_reason: None,
                });
            }
            Err(err) => {
                error!(%name, %session_id, %err, "failed to wait for session");
                report.push(ReportEntry {
                    name: name.clone(),
                    session_id: session_id.clone(),
                    status: SessionStatus::Pending,
                    timed_out: false,
                    duration_seconds: None,
                    output: None,
                    error: Some(err.to_string()),
                    cancel_reason: None,
                });
            }
        }
    }

    report
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
