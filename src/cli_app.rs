//! Top-level CLI definition and dispatch.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use service_health_monitor::core::config::{ConfigOverrides, MonitorConfig};
use service_health_monitor::core::errors::MonitorError;
use service_health_monitor::daemon::lifecycle::{
    DaemonController, StatusReport, StopOutcome, run_detached_child,
};
use service_health_monitor::daemon::loop_main::HealthMonitor;
use service_health_monitor::daemon::signals::SignalHandler;
use service_health_monitor::logger::activity::{ActivityLog, ActivityLogConfig};
use service_health_monitor::monitor::status::ServiceStatus;

const EXAMPLES: &str = "\
Examples:
  svcmon --url http://localhost:8080/health
  svcmon --url http://myserver:8080/health --interval 60 --daemon start
  svcmon --url http://10.0.0.5:8080/health --webhook https://hooks.example.com/T000/B000

Daemon management:
  svcmon daemon start --url http://localhost:8080/health
  svcmon daemon stop
  svcmon daemon status
  svcmon daemon restart --url http://localhost:8080/health";

/// Service Health Monitor — polls a health endpoint and alerts on up/down transitions.
#[derive(Debug, Parser)]
#[command(
    name = "svcmon",
    author,
    version,
    about = "Service Health Monitor - polls a health endpoint and alerts on up/down transitions",
    long_about = None,
    after_help = EXAMPLES
)]
pub struct Cli {
    #[command(flatten)]
    monitor: MonitorArgs,
    /// Daemon management (same as the `daemon` subcommand).
    #[arg(long = "daemon", value_enum, value_name = "ACTION")]
    daemon_action: Option<DaemonAction>,
    /// Optional TOML config file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Manage the background monitor.
    Daemon {
        #[arg(value_enum)]
        action: DaemonAction,
    },
    /// Detached monitor process; reads its configuration from stdin.
    #[command(name = "__daemon-child", hide = true)]
    DaemonChild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DaemonAction {
    Start,
    Stop,
    Status,
    Restart,
}

/// Monitoring parameters. Unset values fall back to the config file,
/// then `SVCMON_*` environment variables, then built-in defaults.
#[derive(Debug, Clone, Args, Default)]
struct MonitorArgs {
    /// Service URL to monitor (required to start monitoring).
    #[arg(short, long, global = true, value_name = "URL")]
    url: Option<String>,
    /// Check interval in seconds [default: 30].
    #[arg(short, long, global = true, value_name = "SECS")]
    interval: Option<u64>,
    /// Request timeout in seconds [default: 10].
    #[arg(short, long, global = true, value_name = "SECS")]
    timeout: Option<u64>,
    /// Attempts per check before the service counts as down [default: 3].
    #[arg(short, long, global = true, value_name = "N")]
    retries: Option<u32>,
    /// Pause between failed attempts in seconds [default: 5].
    #[arg(long, global = true, value_name = "SECS")]
    retry_delay: Option<u64>,
    /// Log file path [default: monitor.log].
    #[arg(short, long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Webhook URL for notifications.
    #[arg(short = 's', long, global = true, alias = "slack-webhook", value_name = "URL")]
    webhook: Option<String>,
    /// Notification channel [default: #service-monitor].
    #[arg(short, long, global = true, alias = "slack-channel", value_name = "NAME")]
    channel: Option<String>,
    /// Also append notifications to this file as JSON lines.
    #[arg(long, global = true, value_name = "PATH")]
    notify_file: Option<PathBuf>,
    /// Disable notifications.
    #[arg(long, global = true, alias = "no-slack")]
    no_notify: bool,
    /// PID file for daemon mode [default: monitor.pid].
    #[arg(long, global = true, value_name = "PATH")]
    pid_file: Option<PathBuf>,
    /// State snapshot written by the daemon [default: next to the PID file].
    #[arg(long, global = true, value_name = "PATH")]
    state_file: Option<PathBuf>,
    /// Perform a single check and exit.
    #[arg(long, global = true, alias = "check-once")]
    once: bool,
}

impl MonitorArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            url: self.url.clone(),
            interval_secs: self.interval,
            timeout_secs: self.timeout,
            retries: self.retries,
            retry_delay_secs: self.retry_delay,
            log_file: self.log_file.clone(),
            pid_file: self.pid_file.clone(),
            state_file: self.state_file.clone(),
            webhook_url: self.webhook.clone(),
            webhook_channel: self.channel.clone(),
            notify_file: self.notify_file.clone(),
            no_notify: self.no_notify,
            run_once: self.once,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<MonitorError> for CliError {
    fn from(err: MonitorError) -> Self {
        if err.is_user_error() {
            Self::User(err.to_string())
        } else if matches!(err, MonitorError::Serialization { .. }) {
            Self::Internal(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    let action = match &cli.command {
        Some(Command::DaemonChild) => {
            return run_detached_child(io::stdin().lock()).map_err(Into::into);
        }
        Some(Command::Daemon { action }) => Some(*action),
        None => cli.daemon_action,
    };

    match action {
        None => run_foreground(cli),
        Some(DaemonAction::Start) => run_start(cli),
        Some(DaemonAction::Stop) => run_stop(cli),
        Some(DaemonAction::Status) => run_status(cli),
        Some(DaemonAction::Restart) => run_restart(cli),
    }
}

fn resolve_config(cli: &Cli) -> Result<MonitorConfig, CliError> {
    Ok(MonitorConfig::resolve(
        cli.config.as_deref(),
        &cli.monitor.overrides(),
    )?)
}

/// Configuration for `daemon start`/`restart`. A background monitor runs
/// until stopped, so `--once` is refused rather than ignored.
fn resolve_daemon_config(cli: &Cli) -> Result<MonitorConfig, CliError> {
    let config = resolve_config(cli)?;
    ensure_detachable(&config)?;
    Ok(config)
}

fn ensure_detachable(config: &MonitorConfig) -> Result<(), CliError> {
    if config.run_once {
        return Err(CliError::User(
            "--once cannot be combined with daemon start or restart; run it in the foreground"
                .to_string(),
        ));
    }
    Ok(())
}

fn resolve_control_config(cli: &Cli) -> Result<MonitorConfig, CliError> {
    Ok(MonitorConfig::resolve_unvalidated(
        cli.config.as_deref(),
        &cli.monitor.overrides(),
    )?)
}

/// Control commands record what they did in the activity log and echo it
/// unless stdout is reserved for JSON.
fn control_log(cli: &Cli, config: &MonitorConfig) -> ActivityLog {
    ActivityLog::open(ActivityLogConfig {
        path: Some(config.log_file.clone()),
        echo_console: output_mode(cli) == OutputMode::Human,
        ..ActivityLogConfig::default()
    })
}

// ──────────────────── foreground ────────────────────

fn run_foreground(cli: &Cli) -> Result<(), CliError> {
    let config = resolve_config(cli)?;
    if output_mode(cli) == OutputMode::Human {
        print_banner(&config, false);
    }

    let mut monitor = HealthMonitor::init(config, SignalHandler::new())?;
    monitor.run()?;
    Ok(())
}

fn print_banner(config: &MonitorConfig, daemon_mode: bool) {
    let notifications = if config.notifications.is_active() {
        "Enabled".green()
    } else {
        "Disabled".yellow()
    };
    println!("{}", "Service Health Monitor Starting...".bold());
    println!("Monitoring Configuration:");
    println!("  Service URL: {}", config.url);
    println!("  Check Interval: {}s", config.interval_secs);
    println!("  Timeout: {}s", config.timeout_secs);
    println!("  Retries: {}", config.retries);
    println!("  Retry Delay: {}s", config.retry_delay_secs);
    println!("  Log File: {}", config.log_file.display());
    println!("  Notifications: {notifications}");
    println!("  Daemon Mode: {daemon_mode}");
}

// ──────────────────── daemon control ────────────────────

fn run_start(cli: &Cli) -> Result<(), CliError> {
    let config = resolve_daemon_config(cli)?;
    let mode = output_mode(cli);
    if mode == OutputMode::Human {
        print_banner(&config, true);
    }

    let controller = DaemonController::from_config(&config)?;
    let pid = controller.start(&config, &mut control_log(cli, &config))?;
    if mode == OutputMode::Json {
        write_json_line(&json!({
            "command": "start",
            "pid": pid,
            "pid_file": controller.pid_file().path(),
        }))?;
    }
    Ok(())
}

fn run_stop(cli: &Cli) -> Result<(), CliError> {
    let config = resolve_control_config(cli)?;
    let controller = DaemonController::from_config(&config)?;
    let outcome = controller.stop(&mut control_log(cli, &config))?;
    if output_mode(cli) == OutputMode::Json {
        emit_stop_json(&outcome)?;
    }
    Ok(())
}

fn run_restart(cli: &Cli) -> Result<(), CliError> {
    // Validate before stopping so a bad command line never leaves the
    // service unmonitored.
    let config = resolve_daemon_config(cli)?;
    let mode = output_mode(cli);
    if mode == OutputMode::Human {
        print_banner(&config, true);
    }

    let controller = DaemonController::from_config(&config)?;
    let pid = controller.restart(&config, &mut control_log(cli, &config))?;
    if mode == OutputMode::Json {
        write_json_line(&json!({
            "command": "restart",
            "pid": pid,
            "pid_file": controller.pid_file().path(),
        }))?;
    }
    Ok(())
}

fn emit_stop_json(outcome: &StopOutcome) -> Result<(), CliError> {
    let mut payload = serde_json::to_value(outcome)?;
    if let Value::Object(map) = &mut payload {
        map.insert("command".to_string(), Value::from("stop"));
    }
    write_json_line(&payload)
}

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let config = resolve_control_config(cli)?;
    let report = DaemonController::from_config(&config)?.status()?;

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&serde_json::to_value(&report)?),
        OutputMode::Human => {
            print_status_human(&report);
            Ok(())
        }
    }
}

fn print_status_human(report: &StatusReport) {
    if report.stale_cleared {
        println!(
            "{} removed stale PID file {}",
            "warning:".yellow().bold(),
            report.pid_file.display()
        );
    }

    match (report.running, report.pid) {
        (true, Some(pid)) => println!("Monitor is {} (PID: {pid})", "running".green().bold()),
        _ => {
            println!("Monitor is {}", "not running".red().bold());
            return;
        }
    }

    let Some(snapshot) = &report.snapshot else {
        println!("  No status snapshot yet.");
        return;
    };
    let label = snapshot.status.label();
    let status = match snapshot.status {
        ServiceStatus::Up => label.green().bold(),
        ServiceStatus::Down => label.red().bold(),
        ServiceStatus::Unknown => label.yellow(),
    };
    println!("  Service URL: {}", snapshot.url);
    println!("  Service status: {status}");
    println!(
        "  Consecutive successes: {}, Consecutive failures: {}",
        snapshot.consecutive_successes, snapshot.consecutive_failures
    );
    println!("  Checks completed: {}", snapshot.cycles);
    println!("  Notifications sent: {}", snapshot.notifications_sent);
    println!("  Running since: {}", snapshot.started_at);
    println!("  Last check: {}", snapshot.last_updated);
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SVCMON_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}
