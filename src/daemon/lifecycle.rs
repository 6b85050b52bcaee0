//! Daemon lifecycle: `start`, `stop`, `status`, `restart`.
//!
//! `start` re-executes the current binary in a hidden child mode
//! ([`DAEMON_CHILD_ARG`]). The child detaches into its own session and reads
//! its complete [`MonitorConfig`] as JSON from stdin, so nothing is re-parsed
//! from argv. The parent records the child PID *before* releasing the config,
//! which guarantees the PID file exists by the time the monitor loop runs.

#![allow(missing_docs)]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::config::MonitorConfig;
use crate::core::errors::{MonitorError, Result};
use crate::daemon::loop_main::HealthMonitor;
use crate::daemon::pidfile::{DaemonLiveness, PidFile, is_process_alive};
use crate::daemon::signals::{SLEEP_SLICE, SignalHandler};
use crate::daemon::state_file::{MonitorSnapshot, read_snapshot};
use crate::logger::activity::ActivityLog;

/// Hidden argument that switches the binary into detached-child mode.
pub const DAEMON_CHILD_ARG: &str = "__daemon-child";

/// Pause between the stop and start halves of `restart`.
pub const RESTART_PAUSE: Duration = Duration::from_secs(2);

/// Minimum time `stop` waits after SIGTERM before escalating to SIGKILL.
/// See [`stop_grace`] for the effective value.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Slack on top of an in-flight probe for the loop to log and exit.
const STOP_MARGIN: Duration = Duration::from_secs(1);

const STOP_POLL: Duration = Duration::from_millis(100);
const KILL_WAIT: Duration = Duration::from_secs(1);

/// Time the parent watches a fresh child for an immediate exit.
const STARTUP_SETTLE: Duration = Duration::from_millis(200);

// ──────────────────── reports ────────────────────

/// Result of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// A live daemon was terminated. `forced` when SIGKILL was needed.
    Stopped { pid: u32, forced: bool },
    /// The PID file named no live process and was removed.
    Stale { pid: Option<u32> },
    /// There was no PID file.
    NotRunning,
}

/// Result of a `status` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state: DaemonLiveness,
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
    /// A stale PID file was found and removed during this request.
    pub stale_cleared: bool,
    /// Last snapshot written by the running daemon.
    pub snapshot: Option<MonitorSnapshot>,
}

// ──────────────────── controller ────────────────────

/// Grace period for a daemon probing with `probe_timeout`.
///
/// A probe in flight cannot be interrupted, so SIGTERM is only observed once
/// the request returns. The grace covers that plus one signal poll slice.
#[must_use]
pub fn stop_grace(probe_timeout: Duration) -> Duration {
    STOP_GRACE.max(probe_timeout + SLEEP_SLICE + STOP_MARGIN)
}

/// Operator-side handle over one daemon instance (identified by its PID file).
#[derive(Debug, Clone)]
pub struct DaemonController {
    pid_file: PidFile,
    state_path: PathBuf,
    executable: PathBuf,
    /// Fallback when the running daemon has not recorded its own timeout.
    probe_timeout: Duration,
}

impl DaemonController {
    /// Controller for the daemon described by `config`, spawning the current executable.
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let executable = std::env::current_exe().map_err(|e| MonitorError::Runtime {
            details: format!("cannot locate current executable: {e}"),
        })?;
        Ok(Self::with_executable(config, executable))
    }

    #[must_use]
    pub fn with_executable(config: &MonitorConfig, executable: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: PidFile::new(config.pid_file.clone()),
            state_path: config.state_path(),
            executable: executable.into(),
            probe_timeout: config.timeout(),
        }
    }

    #[must_use]
    pub const fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Spawn the detached monitor. Returns the daemon PID.
    pub fn start(&self, config: &MonitorConfig, log: &mut ActivityLog) -> Result<u32> {
        let handle = self.pid_file.inspect()?;
        match handle.liveness {
            DaemonLiveness::Running => {
                return Err(MonitorError::AlreadyRunning {
                    pid: handle.pid.unwrap_or_default(),
                });
            }
            DaemonLiveness::Stale => {
                log.warning(format!(
                    "Removing stale PID file {}",
                    describe_pid(self.pid_file.path(), handle.pid)
                ));
                self.pid_file.remove()?;
            }
            DaemonLiveness::NotRunning => {}
        }

        let mut child_config = config.clone();
        child_config.run_once = false;
        child_config.echo_console = false;
        let payload = serde_json::to_vec(&child_config)?;

        let mut child = Command::new(&self.executable)
            .arg(DAEMON_CHILD_ARG)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MonitorError::Runtime {
                details: format!(
                    "failed to spawn daemon from {}: {e}",
                    self.executable.display()
                ),
            })?;
        let pid = child.id();

        if let Err(e) = self.pid_file.write(pid) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        // Closing stdin releases the child.
        let delivered = child
            .stdin
            .take()
            .map_or(Ok(()), |mut stdin| stdin.write_all(&payload));
        if let Err(e) = delivered {
            let _ = child.kill();
            let _ = child.wait();
            let _ = self.pid_file.remove();
            return Err(MonitorError::ProcessControl {
                pid,
                details: format!("failed to hand configuration to daemon: {e}"),
            });
        }

        thread::sleep(STARTUP_SETTLE);
        if let Ok(Some(status)) = child.try_wait() {
            let _ = self.pid_file.remove();
            return Err(MonitorError::Runtime {
                details: format!(
                    "daemon exited during startup ({status}); see {}",
                    config.log_file.display()
                ),
            });
        }

        log.success(format!("Monitor started in background (PID: {pid})"));
        log.info(format!("Log file: {}", config.log_file.display()));
        log.info(format!("PID file: {}", self.pid_file.path().display()));
        Ok(pid)
    }

    /// Terminate the daemon: SIGTERM, then SIGKILL once the grace period
    /// from [`DaemonController::grace_for`] runs out.
    pub fn stop(&self, log: &mut ActivityLog) -> Result<StopOutcome> {
        let handle = self.pid_file.inspect()?;
        let pid = match (handle.liveness, handle.pid) {
            (DaemonLiveness::NotRunning, _) => {
                log.info("Monitor is not running");
                return Ok(StopOutcome::NotRunning);
            }
            (DaemonLiveness::Running, Some(pid)) => pid,
            (_, pid) => {
                log.warning(format!(
                    "Stale PID file {}; process is not running",
                    describe_pid(self.pid_file.path(), pid)
                ));
                self.pid_file.remove()?;
                return Ok(StopOutcome::Stale { pid });
            }
        };

        log.info(format!("Stopping monitor (PID: {pid})..."));
        let grace = self.grace_for(pid);
        send_signal(pid, Termination::Graceful)?;
        let mut forced = false;
        if !wait_for_exit(pid, grace) {
            log.warning(format!(
                "Monitor did not exit within {}s, sending SIGKILL",
                grace.as_secs()
            ));
            send_signal(pid, Termination::Kill)?;
            forced = true;
            if !wait_for_exit(pid, KILL_WAIT) {
                return Err(MonitorError::ProcessControl {
                    pid,
                    details: "process survived SIGKILL".to_string(),
                });
            }
        }

        // The daemon normally removes its own file; this covers SIGKILL.
        self.pid_file.remove()?;
        log.success(format!("Monitor stopped (PID: {pid})"));
        Ok(StopOutcome::Stopped { pid, forced })
    }

    /// Stop grace for daemon `pid`, preferring the timeout it recorded in its
    /// snapshot over this controller's configuration.
    #[must_use]
    pub fn grace_for(&self, pid: u32) -> Duration {
        let timeout = read_snapshot(&self.state_path)
            .ok()
            .flatten()
            .filter(|s| s.pid == pid && s.timeout_secs > 0)
            .map_or(self.probe_timeout, |s| Duration::from_secs(s.timeout_secs));
        stop_grace(timeout)
    }

    /// Report liveness, clearing a stale PID file.
    pub fn status(&self) -> Result<StatusReport> {
        let handle = self.pid_file.inspect()?;
        let stale_cleared = handle.liveness == DaemonLiveness::Stale && self.pid_file.remove()?;
        let running = handle.liveness == DaemonLiveness::Running;
        let snapshot = if running {
            read_snapshot(&self.state_path).ok().flatten()
        } else {
            None
        };

        Ok(StatusReport {
            state: handle.liveness,
            running,
            pid: handle.pid,
            pid_file: self.pid_file.path().to_path_buf(),
            stale_cleared,
            snapshot,
        })
    }

    /// `stop`, pause for [`RESTART_PAUSE`], then `start`.
    pub fn restart(&self, config: &MonitorConfig, log: &mut ActivityLog) -> Result<u32> {
        self.stop(log)?;
        thread::sleep(RESTART_PAUSE);
        self.start(config, log)
    }
}

fn describe_pid(path: &Path, pid: Option<u32>) -> String {
    pid.map_or_else(
        || path.display().to_string(),
        |pid| format!("{} (PID: {pid})", path.display()),
    )
}

fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if !is_process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(STOP_POLL);
    }
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Graceful,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, termination: Termination) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| MonitorError::ProcessControl {
        pid,
        details: "pid out of range".to_string(),
    })?;
    let signal = match termination {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Kill => Signal::SIGKILL,
    };
    match kill(Pid::from_raw(raw), signal) {
        // Exited between the liveness check and the signal.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(MonitorError::ProcessControl {
            pid,
            details: format!("failed to send {signal}: {e}"),
        }),
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, _termination: Termination) -> Result<()> {
    Err(MonitorError::ProcessControl {
        pid,
        details: "signals are not supported on this platform".to_string(),
    })
}

// ──────────────────── child side ────────────────────

/// Entry point of the detached child: read the config from `input`, run the
/// monitor until signalled, then release the PID file.
pub fn run_detached_child<R: Read>(mut input: R) -> Result<()> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .map_err(|e| MonitorError::Runtime {
            details: format!("failed to read daemon configuration: {e}"),
        })?;
    let mut config: MonitorConfig = serde_json::from_str(&raw)?;
    config.echo_console = false;
    config.run_once = false;
    config.validate()?;

    #[cfg(unix)]
    if let Err(e) = nix::unistd::setsid() {
        eprintln!("[SVCMON-DAEMON] setsid failed: {e}");
    }

    let pid_file = PidFile::new(config.pid_file.clone());
    let result =
        HealthMonitor::init(config, SignalHandler::new()).and_then(|mut monitor| monitor.run());
    pid_file.remove_if_owned(std::process::id());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::daemon::state_file::write_snapshot;
    use crate::logger::activity::ActivityLogConfig;
    use crate::monitor::status::ServiceStatus;

    fn config_in(dir: &tempfile::TempDir) -> MonitorConfig {
        MonitorConfig {
            url: "http://127.0.0.1:9/health".to_string(),
            log_file: dir.path().join("monitor.log"),
            pid_file: dir.path().join("monitor.pid"),
            echo_console: false,
            ..MonitorConfig::default()
        }
    }

    fn quiet_log() -> ActivityLog {
        ActivityLog::open(ActivityLogConfig {
            path: None,
            echo_console: false,
            ..ActivityLogConfig::default()
        })
    }

    fn dead_pid() -> u32 {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn start_refuses_when_live_instance_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let own = std::process::id();
        fs::write(&config.pid_file, format!("{own}\n")).unwrap();

        let controller = DaemonController::with_executable(&config, "/nonexistent/svcmon");
        let err = controller
            .start(&config, &mut quiet_log())
            .expect_err("already running");

        assert!(matches!(err, MonitorError::AlreadyRunning { pid } if pid == own));
        assert!(err.is_user_error());
        assert_eq!(
            fs::read_to_string(&config.pid_file).unwrap(),
            format!("{own}\n")
        );
    }

    #[test]
    fn start_clears_stale_file_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        fs::write(&config.pid_file, format!("{}\n", dead_pid())).unwrap();

        let controller = DaemonController::with_executable(&config, "/nonexistent/svcmon");
        let err = controller
            .start(&config, &mut quiet_log())
            .expect_err("spawn fails");

        assert!(matches!(err, MonitorError::Runtime { .. }));
        assert!(!config.pid_file.exists());
    }

    #[test]
    fn start_detects_child_that_exits_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        // `false` ignores its argument and exits 1 straight away.
        let controller = DaemonController::with_executable(&config, "false");

        let err = controller
            .start(&config, &mut quiet_log())
            .expect_err("child exits");

        // Depending on timing the child is gone before or after it reads stdin.
        assert!(matches!(
            err,
            MonitorError::Runtime { .. } | MonitorError::ProcessControl { .. }
        ));
        assert!(!config.pid_file.exists());
    }

    #[test]
    fn stop_without_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let controller = DaemonController::with_executable(&config_in(&dir), "svcmon");
        assert_eq!(
            controller.stop(&mut quiet_log()).unwrap(),
            StopOutcome::NotRunning
        );
    }

    #[test]
    fn stop_with_dead_pid_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let pid = dead_pid();
        fs::write(&config.pid_file, format!("{pid}\n")).unwrap();

        let mut log = ActivityLog::open(ActivityLogConfig {
            path: Some(config.log_file.clone()),
            echo_console: false,
            ..ActivityLogConfig::default()
        });
        let controller = DaemonController::with_executable(&config, "svcmon");
        let outcome = controller.stop(&mut log).unwrap();

        assert_eq!(outcome, StopOutcome::Stale { pid: Some(pid) });
        assert!(!config.pid_file.exists());
        let logged = fs::read_to_string(&config.log_file).unwrap();
        assert!(logged.contains("[WARNING] Stale PID file"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stop_terminates_live_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let mut sleeper = Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(&config.pid_file, format!("{}\n", sleeper.id())).unwrap();

        let controller = DaemonController::with_executable(&config, "svcmon");
        let outcome = controller.stop(&mut quiet_log()).unwrap();
        let _ = sleeper.wait();

        assert_eq!(
            outcome,
            StopOutcome::Stopped {
                pid: sleeper.id(),
                forced: false
            }
        );
        assert!(!config.pid_file.exists());
    }

    #[test]
    fn stop_grace_outlasts_probe_timeout() {
        assert_eq!(stop_grace(Duration::from_secs(1)), STOP_GRACE);
        let grace = stop_grace(Duration::from_secs(10));
        assert!(grace > Duration::from_secs(10) + SLEEP_SLICE);
        assert!(grace > STOP_GRACE);
    }

    #[test]
    fn grace_follows_running_daemon_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.timeout_secs = 3;
        let controller = DaemonController::with_executable(&config, "svcmon");
        assert_eq!(controller.grace_for(4242), stop_grace(Duration::from_secs(3)));

        let snapshot = MonitorSnapshot {
            pid: 4242,
            timeout_secs: 30,
            ..MonitorSnapshot::default()
        };
        write_snapshot(&config.state_path(), &snapshot).unwrap();
        assert_eq!(controller.grace_for(4242), stop_grace(Duration::from_secs(30)));
        // A snapshot left by another process is ignored.
        assert_eq!(controller.grace_for(4243), stop_grace(Duration::from_secs(3)));
    }

    #[test]
    fn status_clears_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        fs::write(&config.pid_file, format!("{}\n", dead_pid())).unwrap();

        let report = DaemonController::with_executable(&config, "svcmon")
            .status()
            .unwrap();

        assert_eq!(report.state, DaemonLiveness::Stale);
        assert!(!report.running);
        assert!(report.stale_cleared);
        assert!(!config.pid_file.exists());
    }

    #[test]
    fn status_of_running_daemon_includes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        fs::write(&config.pid_file, format!("{}\n", std::process::id())).unwrap();
        let snapshot = MonitorSnapshot {
            status: ServiceStatus::Up,
            consecutive_successes: 7,
            ..MonitorSnapshot::default()
        };
        write_snapshot(&config.state_path(), &snapshot).unwrap();

        let report = DaemonController::with_executable(&config, "svcmon")
            .status()
            .unwrap();

        assert!(report.running);
        assert!(!report.stale_cleared);
        assert_eq!(report.snapshot, Some(snapshot));
    }

    #[test]
    fn child_rejects_invalid_configuration() {
        let err = run_detached_child(r#"{"url":""}"#.as_bytes()).expect_err("blank url");
        assert!(matches!(err, MonitorError::InvalidConfig { .. }));
    }

    #[test]
    fn child_rejects_malformed_payload() {
        let err = run_detached_child("not json".as_bytes()).expect_err("bad json");
        assert_eq!(err.code(), "SVCMON-2101");
    }
}
