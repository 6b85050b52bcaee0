//! Poll executor: one health-check cycle of up to `retries` probes.
//!
//! Every failure mode (timeout, connection error, non-2xx) counts as one
//! failed attempt. Between failed attempts the executor waits a fixed retry
//! delay that is independent of the probe timeout, so the worst-case cycle
//! duration is `retries × (timeout + retry_delay)`.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use crate::daemon::signals::SignalHandler;
use crate::logger::activity::ActivityLog;
use crate::monitor::probe::{HealthProbe, ProbeOutcome};

/// Default wait between failed attempts within one cycle.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retry budget for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum probes per cycle (at least one is always made).
    pub retries: u32,
    /// Wait between failed attempts; never applied after the last attempt.
    pub retry_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Verdict of one cycle plus bookkeeping for logs and the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub healthy: bool,
    pub attempts: u32,
    pub last_outcome: Option<ProbeOutcome>,
    /// Shutdown was requested mid-cycle. The verdict is incomplete and the
    /// caller discards it.
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// Runs cycles against a probe under a fixed [`PollPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PollExecutor {
    policy: PollPolicy,
}

impl PollExecutor {
    #[must_use]
    pub const fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Perform one cycle. Succeeds as soon as any attempt is healthy.
    pub fn run_cycle(
        &self,
        probe: &dyn HealthProbe,
        signals: &SignalHandler,
        log: &mut ActivityLog,
    ) -> CycleReport {
        let started = Instant::now();
        let retries = self.policy.retries.max(1);
        let mut last_outcome = None;
        let mut attempts = 0;

        for attempt in 1..=retries {
            if signals.should_shutdown() {
                return Self::report(false, attempts, last_outcome, true, started);
            }

            log.info(format!(
                "Health check attempt {attempt}/{retries} for {}",
                probe.target()
            ));
            attempts = attempt;
            let outcome = probe.probe();

            if outcome.is_healthy() {
                return Self::report(true, attempts, Some(outcome), false, started);
            }
            log.warning(capitalize(&outcome.to_string()));
            last_outcome = Some(outcome);

            if attempt < retries {
                log.warning(format!(
                    "Retrying in {} seconds...",
                    self.policy.retry_delay.as_secs()
                ));
                if !signals.sleep(self.policy.retry_delay) {
                    return Self::report(false, attempts, last_outcome, true, started);
                }
            }
        }

        Self::report(false, attempts, last_outcome, false, started)
    }

    fn report(
        healthy: bool,
        attempts: u32,
        last_outcome: Option<ProbeOutcome>,
        interrupted: bool,
        started: Instant,
    ) -> CycleReport {
        CycleReport {
            healthy,
            attempts,
            last_outcome,
            interrupted,
            elapsed: started.elapsed(),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
