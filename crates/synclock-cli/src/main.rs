//! Synclock CLI - inspect lock settings and simulate contending engines

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use synclock_core::Error;
use synclock_core::config::Config;
use synclock_core::domain::events::{InMemoryEventStore, StoredEvent};
use synclock_core::domain::locking::{
    AcquireOutcome, AcquireRequest, InMemoryLockStore, LockCoordinator, ReleasePolicy,
    RequestContext, RetryPolicy,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "synclock")]
#[command(author, version, about = "Distributed task-type lock coordinator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run several engines contending for one task type on an in-memory store
    Simulate(SimulateArgs),

    /// Print the holder identity this process would use
    Whoami,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct SimulateArgs {
    /// Number of contending engines
    #[arg(short, long, default_value_t = 3)]
    engines: usize,

    /// Task type to lock
    #[arg(short, long, default_value = "quota_sync")]
    task_type: String,

    /// Steal the lock once retries are exhausted
    #[arg(long)]
    forced: bool,

    /// Retries after the first failed attempt (defaults to locks.lock_retry_times)
    #[arg(long)]
    retries: Option<u32>,

    /// Milliseconds between attempts (defaults to locks.lock_retry_interval)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Milliseconds a winner holds the lock before releasing
    #[arg(long, default_value_t = 0)]
    hold_ms: u64,

    /// Winners never release, as if they died holding the lock
    #[arg(long)]
    no_release: bool,

    /// Minimum lock age before the store honours a steal
    #[arg(long, default_value_t = 0)]
    min_steal_age_ms: u64,

    /// Let any engine release by key, without checking the holder
    #[arg(long)]
    key_only_release: bool,

    /// Print the lock protocol event log after the run
    #[arg(long)]
    show_events: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// What one simulated engine ended up with
#[derive(Debug, Clone, Serialize)]
struct EngineReport {
    holder: String,
    #[serde(flatten)]
    outcome: AcquireOutcome,
    released: Option<bool>,
}

/// JSON shape of `simulate --show-events`
#[derive(Serialize)]
struct SimulationLog<'a> {
    engines: &'a [EngineReport],
    events: &'a [StoredEvent],
}

impl SimulateArgs {
    fn retry_policy(&self, config: &Config) -> RetryPolicy {
        let mut policy = config.retry_policy();
        if let Some(retries) = self.retries {
            policy = policy.with_max_retries(retries);
        }
        if let Some(ms) = self.interval_ms {
            policy = policy.with_retry_interval(Duration::from_millis(ms));
        }
        policy
    }

    fn store(&self) -> InMemoryLockStore {
        let policy = if self.key_only_release {
            ReleasePolicy::KeyOnly
        } else {
            ReleasePolicy::VerifyHolder
        };
        InMemoryLockStore::new()
            .with_min_steal_age(Duration::from_millis(self.min_steal_age_ms))
            .with_release_policy(policy)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("synclock=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate(args) => cmd_simulate(args, cli.format, cli.quiet).await,
        Commands::Whoami => cmd_whoami(),
        Commands::Config { action } => cmd_config(action, cli.quiet),
    };

    if let Err(err) = result {
        eprintln!("{}", render_error(&err));
        std::process::exit(1);
    }
    Ok(())
}

/// Error line with its code, plus a hint when one is known
fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<Error>() {
        Some(coded) => match coded.suggestion() {
            Some(hint) => format!("Error [{}]: {:#}\n  hint: {}", coded.code(), err, hint),
            None => format!("Error [{}]: {:#}", coded.code(), err),
        },
        None => format!("Error: {:#}", err),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_simulate(args: SimulateArgs, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    if args.engines == 0 {
        return Err(Error::InvalidInput("--engines must be at least 1".to_string()).into());
    }

    let config = Config::load()?;
    let policy = args.retry_policy(&config);
    let store = Arc::new(args.store());
    let events = Arc::new(InMemoryEventStore::new());
    let mut coordinator = LockCoordinator::new(store.clone(), policy);
    if args.show_events {
        coordinator = coordinator.with_publisher(events.clone());
    }
    let base_identity = config.holder_identity();

    // Ctrl-C cancels every pending acquire
    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling pending lock requests");
            interrupt.cancel();
        }
    });

    if !quiet && format == OutputFormat::Text {
        println!(
            "Simulating {} engine(s) on '{}' (retries={}, interval={}ms, forced={})",
            args.engines,
            args.task_type,
            policy.max_retries,
            policy.retry_interval.as_millis(),
            args.forced
        );
    }

    let tasks = (0..args.engines).map(|i| {
        let coordinator = coordinator.clone();
        let args = args.clone();
        let holder = format!("{}#{}", base_identity, i);
        let ctx = RequestContext::child_of(&shutdown);
        tokio::spawn(async move { run_engine(coordinator, args, holder, ctx).await })
    });

    let mut reports = Vec::with_capacity(args.engines);
    for joined in futures_util::future::join_all(tasks).await {
        reports.push(joined??);
    }

    let log = events.all_events();
    match format {
        OutputFormat::Json if args.show_events => {
            let output = SimulationLog {
                engines: &reports,
                events: &log,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                println!("{}", format_report(report));
            }
            if args.show_events {
                println!();
                for event in &log {
                    println!("{}", format_event(event));
                }
            }
            if !quiet {
                let winners = reports.iter().filter(|r| r.outcome.acquired).count();
                println!();
                println!("{} of {} engine(s) acquired the lock", winners, reports.len());
                if let Some(holder) = store.holder(&args.task_type).await {
                    println!("Still held by {}", holder);
                }
            }
        }
    }

    Ok(())
}

async fn run_engine(
    coordinator: LockCoordinator,
    args: SimulateArgs,
    holder: String,
    ctx: RequestContext,
) -> anyhow::Result<EngineReport> {
    let request = AcquireRequest::new(&holder, &args.task_type).forced(args.forced);
    let outcome = coordinator
        .acquire_lock(&ctx, &request)
        .await
        .map_err(Error::from)?;

    let mut released = None;
    if outcome.acquired && !args.no_release {
        tokio::time::sleep(Duration::from_millis(args.hold_ms)).await;
        released = Some(
            coordinator
                .release_lock(&ctx, &holder, &args.task_type)
                .await
                .map_err(Error::from)?,
        );
    }

    info!(holder = %holder, reason = %outcome.reason, "Engine finished");
    Ok(EngineReport {
        holder,
        outcome,
        released,
    })
}

fn format_report(report: &EngineReport) -> String {
    let released = match report.released {
        Some(true) => "released",
        Some(false) => "release refused",
        None => "not released",
    };
    format!(
        "{}: {} ({}) attempts={} steal={} {}",
        report.holder,
        if report.outcome.acquired { "acquired" } else { "failed" },
        report.outcome.reason,
        report.outcome.acquire_attempts,
        report.outcome.steal_attempted,
        released
    )
}

fn format_event(event: &StoredEvent) -> String {
    let data = event
        .data
        .as_ref()
        .map(|data| data.to_string())
        .unwrap_or_default();
    format!(
        "{} {} {} {}",
        event.created_at.format("%H:%M:%S%.3f"),
        event.aggregate_key,
        event.event_type,
        data
    )
    .trim_end()
    .to_string()
}

fn cmd_whoami() -> anyhow::Result<()> {
    let config = Config::load()?;
    println!("{}", config.holder_identity());
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod main_tests;
