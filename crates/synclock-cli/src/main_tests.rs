//! CLI tests

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use synclock_core::Error;
use synclock_core::config::Config;
use synclock_core::domain::events::InMemoryEventStore;
use synclock_core::domain::locking::{
    AcquireOutcome, AcquireReason, LockCoordinator, LockStore, RequestContext, RetryPolicy,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Cli, Commands, EngineReport, OutputFormat, format_event, format_report, render_error,
    run_engine,
};

fn parse_simulate(args: &[&str]) -> crate::SimulateArgs {
    let cli = Cli::try_parse_from(args).expect("Should parse");
    match cli.command {
        Commands::Simulate(args) => args,
        _ => panic!("expected simulate"),
    }
}

#[test]
fn test_simulate_defaults() {
    let args = parse_simulate(&["synclock", "simulate"]);

    assert_eq!(args.engines, 3);
    assert_eq!(args.task_type, "quota_sync");
    assert!(!args.forced);
    assert!(args.retries.is_none());
}

#[test]
fn test_simulate_overrides_config_policy() {
    let args = parse_simulate(&[
        "synclock",
        "simulate",
        "--retries",
        "2",
        "--interval-ms",
        "0",
        "--forced",
    ]);
    let policy = args.retry_policy(&Config::default());

    assert!(args.forced);
    assert_eq!(policy.max_retries, 2);
    assert_eq!(policy.retry_interval, Duration::ZERO);
}

#[test]
fn test_simulate_falls_back_to_config_policy() {
    let args = parse_simulate(&["synclock", "simulate"]);
    let policy = args.retry_policy(&Config::default());

    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.retry_interval, Duration::from_secs(10));
}

#[tokio::test]
async fn test_key_only_release_flag_configures_store() {
    let args = parse_simulate(&["synclock", "simulate", "--key-only-release"]);
    let store = args.store();
    let ctx = RequestContext::new();

    store.acquire(&ctx, "quota_sync", "engine-1").await.unwrap();
    assert!(store.release(&ctx, "quota_sync", "engine-2").await.unwrap());
}

#[test]
fn test_global_format_flag() {
    let cli = Cli::try_parse_from(["synclock", "whoami", "--format", "json"]).unwrap();
    assert!(cli.format == OutputFormat::Json);
    assert!(matches!(cli.command, Commands::Whoami));
}

#[test]
fn test_format_report() {
    let report = EngineReport {
        holder: "engine-1".to_string(),
        outcome: AcquireOutcome {
            acquired: true,
            reason: AcquireReason::Stolen,
            acquire_attempts: 4,
            steal_attempted: true,
        },
        released: Some(false),
    };

    assert_eq!(
        format_report(&report),
        "engine-1: acquired (stolen) attempts=4 steal=true release refused"
    );
}

#[test]
fn test_report_serializes_flat() {
    let report = EngineReport {
        holder: "engine-2".to_string(),
        outcome: AcquireOutcome {
            acquired: false,
            reason: AcquireReason::Contended,
            acquire_attempts: 3,
            steal_attempted: false,
        },
        released: None,
    };

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["holder"], "engine-2");
    assert_eq!(json["reason"], "contended");
    assert_eq!(json["acquire_attempts"], 3);
    assert!(json["released"].is_null());
}

#[test]
fn test_render_error_shows_code_and_hint() {
    let err: anyhow::Error =
        Error::InvalidInput("--engines must be at least 1".to_string()).into();

    assert_eq!(
        render_error(&err),
        "Error [E800]: Invalid input: --engines must be at least 1\n  hint: synclock simulate --help"
    );
}

#[test]
fn test_render_error_keeps_context_chain() {
    let err = anyhow::Error::from(Error::ConfigError("bad value".to_string()))
        .context("Failed to update config");
    let rendered = render_error(&err);

    assert!(rendered.starts_with(
        "Error [E600]: Failed to update config: Configuration error: bad value"
    ));
    assert!(rendered.ends_with("hint: synclock config list"));
}

#[test]
fn test_render_error_without_code() {
    let err = anyhow::anyhow!("disk full");
    assert_eq!(render_error(&err), "Error: disk full");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_token_cancels_waiting_engine() {
    let args = parse_simulate(&["synclock", "simulate", "--forced"]);
    let store = Arc::new(args.store());
    let coordinator = LockCoordinator::new(store.clone(), RetryPolicy::default());
    store.acquire(&RequestContext::new(), "quota_sync", "engine-0").await.unwrap();

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    let report = run_engine(
        coordinator,
        args,
        "engine-1".to_string(),
        RequestContext::child_of(&shutdown),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome.reason, AcquireReason::Cancelled);
    assert_eq!(report.outcome.acquire_attempts, 2);
    assert!(!report.outcome.steal_attempted);
    assert!(report.released.is_none());
}

#[tokio::test]
async fn test_engine_failure_is_coded() {
    let args = parse_simulate(&["synclock", "simulate", "--task-type", ""]);
    let coordinator = LockCoordinator::new(Arc::new(args.store()), RetryPolicy::no_retry());

    let err = run_engine(coordinator, args, "engine-1".to_string(), RequestContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.downcast_ref::<Error>().map(Error::code), Some("E310"));
}

#[tokio::test]
async fn test_format_event_line() {
    let args = parse_simulate(&["synclock", "simulate", "--show-events"]);
    assert!(args.show_events);

    let events = Arc::new(InMemoryEventStore::new());
    let coordinator = LockCoordinator::new(Arc::new(args.store()), RetryPolicy::no_retry())
        .with_publisher(events.clone());
    coordinator
        .release_lock(&RequestContext::new(), "engine-1", "quota_sync")
        .await
        .unwrap();

    let log = events.all_events();
    assert_eq!(log.len(), 1);
    let line = format_event(&log[0]);
    assert!(line.contains(" quota_sync releasing "));
    assert!(line.contains("engine-1"));
}
