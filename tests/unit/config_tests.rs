use std::io::Write;
use std::time::Duration;

use session_orchestrator::config::{GlobalConfig, StartPolicy};
use session_orchestrator::AppError;

fn sample_toml() -> &'static str {
    r#"
[scheduler]
reconcile_interval_seconds = 2
inbox_capacity = 64
start_policy = "explicit"

[waiter]
default_timeout_seconds = 120
poll_interval_seconds = 3

[runner]
host_cli = "claude"
host_cli_args = ["--print", "--output-format", "json"]
working_dir = "/tmp/work"
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.scheduler.reconcile_interval(), Duration::from_secs(2));
    assert_eq!(config.scheduler.inbox_capacity, 64);
    assert_eq!(config.scheduler.start_policy, StartPolicy::Explicit);
    assert_eq!(config.waiter.default_timeout_seconds, 120);
    assert_eq!(config.waiter.poll_interval_seconds, 3);
    assert_eq!(config.runner.host_cli, "claude");
    assert_eq!(config.runner.host_cli_args.len(), 3);
    assert_eq!(
        config.runner.working_dir.as_deref(),
        Some(std::path::Path::new("/tmp/work"))
    );
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.scheduler.reconcile_interval_seconds, 5);
    assert_eq!(config.scheduler.inbox_capacity, 256);
    assert_eq!(config.scheduler.start_policy, StartPolicy::Auto);
    assert_eq!(config.waiter.default_timeout_seconds, 3600);
    assert_eq!(config.waiter.poll_interval_seconds, 10);
    assert_eq!(config.runner.host_cli, "claude");
    assert!(config.runner.working_dir.is_none());
}

#[test]
fn partial_section_keeps_other_defaults() {
    let config = GlobalConfig::from_toml_str("[waiter]\ndefault_timeout_seconds = 5\n")
        .expect("partial config");
    assert_eq!(config.waiter.default_timeout_seconds, 5);
    assert_eq!(config.waiter.poll_interval_seconds, 10);
}

#[test]
fn zero_reconcile_interval_is_rejected() {
    let err = GlobalConfig::from_toml_str("[scheduler]\nreconcile_interval_seconds = 0\n")
        .unwrap_err();
    assert_eq!(
        err,
        AppError::Config("reconcile_interval_seconds must be greater than zero".into())
    );
}

#[test]
fn zero_inbox_capacity_is_rejected() {
    let err = GlobalConfig::from_toml_str("[scheduler]\ninbox_capacity = 0\n").unwrap_err();
    assert_eq!(
        err,
        AppError::Config("inbox_capacity must be greater than zero".into())
    );
}

#[test]
fn zero_poll_interval_is_rejected() {
    let err = GlobalConfig::from_toml_str("[waiter]\npoll_interval_seconds = 0\n").unwrap_err();
    assert_eq!(
        err,
        AppError::Config("poll_interval_seconds must be greater than zero".into())
    );
}

#[test]
fn blank_host_cli_is_rejected() {
    let err = GlobalConfig::from_toml_str("[runner]\nhost_cli = \"  \"\n").unwrap_err();
    assert_eq!(err, AppError::Config("host_cli must not be empty".into()));
}

#[test]
fn unknown_start_policy_is_rejected() {
    let err = GlobalConfig::from_toml_str("[scheduler]\nstart_policy = \"later\"\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write");

    let config = GlobalConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.scheduler.start_policy, StartPolicy::Explicit);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = GlobalConfig::load_from_path(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("failed to read config")));
}
