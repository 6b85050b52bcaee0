//! Main monitoring loop: poll → track → notify → log → sleep.
//!
//! Single logical thread of control. The loop exclusively owns
//! [`MonitorState`], so status and streaks are updated exactly once per
//! completed cycle and never concurrently. Shutdown is cooperative: the
//! signal handler raises a flag that the loop checks between steps and
//! inside every wait.

#![allow(missing_docs)]

use std::path::PathBuf;

use crate::core::config::MonitorConfig;
use crate::core::errors::Result;
use crate::daemon::notifications::{DispatchReport, NotificationEvent, NotificationManager};
use crate::daemon::signals::SignalHandler;
use crate::daemon::state_file::{MonitorSnapshot, write_snapshot};
use crate::logger::activity::{ActivityLog, ActivityLogConfig, timestamp_now};
use crate::monitor::poller::{CycleReport, PollExecutor};
use crate::monitor::probe::{HealthProbe, HttpProbe};
use crate::monitor::status::{Observation, ServiceStatus, StatusTracker};

/// Everything the loop mutates. Owned by [`HealthMonitor`], never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub tracker: StatusTracker,
    pub cycles: u64,
    pub notifications_sent: u64,
    pub last_check: Option<String>,
}

/// What one completed cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub report: CycleReport,
    pub observation: Observation,
    pub dispatch: Option<DispatchReport>,
}

/// The monitor orchestrator.
pub struct HealthMonitor {
    config: MonitorConfig,
    probe: Box<dyn HealthProbe>,
    poller: PollExecutor,
    notifier: NotificationManager,
    log: ActivityLog,
    signals: SignalHandler,
    state: MonitorState,
    state_path: Option<PathBuf>,
    started_at: String,
}

impl HealthMonitor {
    /// Build the monitor from validated configuration.
    pub fn init(config: MonitorConfig, signals: SignalHandler) -> Result<Self> {
        let log = ActivityLog::open(ActivityLogConfig {
            path: Some(config.log_file.clone()),
            echo_console: config.echo_console,
            ..ActivityLogConfig::default()
        });
        let probe = HttpProbe::new(config.url.clone(), config.timeout())?;
        let notifier = NotificationManager::from_config(&config.notifications)?;
        let state_path = Some(config.state_path());

        let mut monitor = Self::with_parts(config, Box::new(probe), notifier, log, signals);
        monitor.state_path = state_path;
        Ok(monitor)
    }

    /// Assemble a monitor from explicit collaborators. No state file is written.
    pub fn with_parts(
        config: MonitorConfig,
        probe: Box<dyn HealthProbe>,
        notifier: NotificationManager,
        log: ActivityLog,
        signals: SignalHandler,
    ) -> Self {
        let poller = PollExecutor::new(config.poll_policy());
        Self {
            config,
            probe,
            poller,
            notifier,
            log,
            signals,
            state: MonitorState::default(),
            state_path: None,
            started_at: timestamp_now(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &MonitorState {
        &self.state
    }

    #[must_use]
    pub const fn status(&self) -> ServiceStatus {
        self.state.tracker.status()
    }

    /// Run until shutdown is requested, or for one cycle when `run_once` is set.
    pub fn run(&mut self) -> Result<()> {
        self.log
            .info(format!("Starting monitoring of {}", self.probe.target()));
        let policy = self.poller.policy();
        self.log.info(format!(
            "Check interval: {}s, Timeout: {}s, Retries: {}, Retry delay: {}s",
            self.config.interval_secs,
            self.config.timeout_secs,
            policy.retries,
            policy.retry_delay.as_secs()
        ));
        if self.notifier.is_active() {
            self.log.info(format!(
                "Notifications: {}",
                self.notifier.sink_names().join(", ")
            ));
        } else {
            self.log.info("Notifications: disabled");
        }
        self.persist_snapshot();

        loop {
            if self.signals.should_shutdown() {
                break;
            }
            self.run_cycle();
            if self.config.run_once {
                break;
            }
            if !self.signals.sleep(self.config.interval()) {
                break;
            }
        }

        if self.signals.should_shutdown() {
            self.log.info("Received shutdown signal, shutting down gracefully...");
        }
        self.log.info("Monitoring stopped");
        Ok(())
    }

    /// Execute one cycle. Returns `None` when shutdown interrupted the cycle,
    /// in which case the status is left untouched.
    pub fn run_cycle(&mut self) -> Option<CycleSummary> {
        let report = self
            .poller
            .run_cycle(self.probe.as_ref(), &self.signals, &mut self.log);
        if report.interrupted {
            return None;
        }

        if report.healthy {
            self.log.success("Service is responding normally");
        } else {
            self.log.error("Service is not responding");
        }

        let observation = self.state.tracker.observe(report.healthy);
        self.state.cycles += 1;
        self.state.last_check = Some(timestamp_now());

        if observation.changed() {
            match observation.current {
                ServiceStatus::Up if observation.previous == ServiceStatus::Down => {
                    self.log.success("Service is now UP - recovered from failure");
                }
                ServiceStatus::Up => self.log.info("Service is now UP"),
                ServiceStatus::Down => self.log.error("Service is now DOWN - not responding"),
                ServiceStatus::Unknown => {}
            }
        }

        let dispatch = observation.notify.map(|transition| {
            let event = NotificationEvent::from_transition(transition, self.probe.target());
            let dispatch = self.notifier.notify(&event, &mut self.log);
            if dispatch.delivered > 0 {
                self.state.notifications_sent += 1;
            }
            dispatch
        });

        let streak = self.state.tracker.streak();
        self.log.info(format!(
            "Status: {}, Consecutive successes: {}, Consecutive failures: {}",
            observation.current, streak.consecutive_successes, streak.consecutive_failures
        ));

        self.persist_snapshot();

        Some(CycleSummary {
            report,
            observation,
            dispatch,
        })
    }

    fn persist_snapshot(&mut self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let streak = self.state.tracker.streak();
        let snapshot = MonitorSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            url: self.config.url.clone(),
            started_at: self.started_at.clone(),
            last_updated: self.state.last_check.clone().unwrap_or_default(),
            status: self.state.tracker.status(),
            timeout_secs: self.config.timeout_secs,
            consecutive_successes: streak.consecutive_successes,
            consecutive_failures: streak.consecutive_failures,
            cycles: self.state.cycles,
            notifications_sent: self.state.notifications_sent,
        };
        if let Err(e) = write_snapshot(path, &snapshot) {
            self.log
                .warning(format!("Failed to write state snapshot: {e}"));
        }
    }
}
