//! Runner that executes each session as a host CLI child process.
//!
//! The requirements text is written to the child's stdin and the opaque
//! project fields are exported as `SESSION_*` environment variables. A
//! zero exit status reports `completed`; stdout is parsed as a JSON
//! [`RunnerOutput`] when possible, otherwise its lines become the logs.
//! Any other exit reports `failed` with the tail of stderr.

use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{info, info_span, warn, Instrument};

use super::{CallbackSink, Runner, RunnerReport, StartAck, StatusCallback};
use crate::config::RunnerConfig;
use crate::models::output::RunnerOutput;
use crate::models::session::Session;
use crate::Result;

/// Maximum number of stderr lines kept in a failure report.
const STDERR_TAIL_LINES: usize = 20;

/// Spawns the configured host CLI for every started session.
pub struct ProcessRunner {
    config: RunnerConfig,
    callbacks: CallbackSink,
}

impl ProcessRunner {
    /// Construct a runner reporting through `callbacks`.
    #[must_use]
    pub fn new(config: RunnerConfig, callbacks: CallbackSink) -> Self {
        Self { config, callbacks }
    }

    fn command(&self, session: &Session) -> Command {
        let mut cmd = Command::new(&self.config.host_cli);
        cmd.args(&self.config.host_cli_args)
            .env("SESSION_ID", &session.id)
            .env("SESSION_KIND", session.kind.to_string())
            .env("SESSION_REPOSITORY", session.repository.as_deref().unwrap_or_default())
            .env("SESSION_BRANCH", session.branch.as_deref().unwrap_or_default())
            .env("SESSION_CONTEXT", session.context.as_deref().unwrap_or_default())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Runner for ProcessRunner {
    fn start(
        &self,
        session: Session,
    ) -> Pin<Box<dyn Future<Output = Result<StartAck>> + Send + '_>> {
        Box::pin(async move {
            let child = match self.command(&session).spawn() {
                Ok(child) => child,
                Err(err) => {
                    warn!(session_id = %session.id, %err, "failed to spawn host cli");
                    return Ok(StartAck::Rejected {
                        reason: format!("failed to spawn {}: {err}", self.config.host_cli),
                    });
                }
            };

            info!(
                session_id = %session.id,
                pid = child.id().unwrap_or(0),
                host_cli = %self.config.host_cli,
                "session process spawned"
            );

            let span = info_span!("session_process", session_id = %session.id);
            tokio::spawn(
                monitor(child, session.id, session.requirements, self.callbacks.clone())
                    .instrument(span),
            );
            Ok(StartAck::Accepted)
        })
    }
}

/// Feed the payload, wait for exit and report the outcome.
async fn monitor(mut child: Child, session_id: String, payload: String, callbacks: CallbackSink) {
    // Written alongside the output drain so neither pipe can fill up and stall.
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(
            async move {
                if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                    warn!(%err, "failed to write requirements to host cli");
                }
            }
            .in_current_span(),
        );
    }

    let report = match child.wait_with_output().await {
        Ok(output) if output.status.success() => RunnerReport::Completed {
            output: parse_output(&output.stdout),
        },
        Ok(output) => RunnerReport::Failed {
            error: failure_message(output.status, &output.stderr),
        },
        Err(err) => RunnerReport::Failed {
            error: format!("failed to wait for host cli: {err}"),
        },
    };

    info!(
        completed = matches!(report, RunnerReport::Completed { .. }),
        "session process exited"
    );
    if let Err(err) = callbacks.report(StatusCallback { session_id, report }).await {
        warn!(%err, "failed to deliver process outcome");
    }
}

/// Interpret stdout as structured output, falling back to plain log lines.
#[must_use]
pub fn parse_output(stdout: &[u8]) -> RunnerOutput {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        if let Ok(output) = serde_json::from_str::<RunnerOutput>(trimmed) {
            return output;
        }
    }
    RunnerOutput {
        logs: Some(trimmed.lines().map(str::to_owned).collect()),
        ..RunnerOutput::default()
    }
}

fn failure_message(status: ExitStatus, stderr: &[u8]) -> String {
    let status_text = status.code().map_or_else(
        || "terminated by signal".to_owned(),
        |code| format!("exited with code {code}"),
    );
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim().lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    if tail.is_empty() {
        format!("host cli {status_text}")
    } else {
        format!("host cli {status_text}: {tail}")
    }
}
