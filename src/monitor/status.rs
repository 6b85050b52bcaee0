//! Service status state machine: UNKNOWN → {UP, DOWN}, UP ↔ DOWN.
//!
//! The tracker is fed one boolean verdict per poll cycle and answers with the
//! transition that should be announced, if any. Streak counters follow
//! reset-on-flip semantics and are bumped on every cycle.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

// ──────────────────── status ────────────────────

/// Binary service status with an initial "never observed" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl ServiceStatus {
    /// Status implied by a cycle verdict.
    #[must_use]
    pub const fn from_verdict(healthy: bool) -> Self {
        if healthy { Self::Up } else { Self::Down }
    }

    /// Upper-case label used in alerts and `daemon status` output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

// ──────────────────── streaks ────────────────────

/// Consecutive-cycle counters. Exactly one of the two is non-zero once the
/// first verdict has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakCounters {
    pub consecutive_successes: u64,
    pub consecutive_failures: u64,
}

impl StreakCounters {
    /// Count one verdict, zeroing the opposite counter.
    pub fn record(&mut self, healthy: bool) {
        if healthy {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
        }
    }
}

// ──────────────────── transitions ────────────────────

/// A status change that must be announced to the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// DOWN → UP.
    Recovered,
    /// UP → DOWN or UNKNOWN → DOWN.
    WentDown,
}

/// Result of feeding one verdict to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub previous: ServiceStatus,
    pub current: ServiceStatus,
    /// Transition to announce. `None` for repeated verdicts and for the
    /// silent first-ever UP.
    pub notify: Option<Transition>,
}

impl Observation {
    /// Whether the status value changed this cycle (announced or not).
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

// ──────────────────── tracker ────────────────────

/// Owns the current status and streaks. Only the monitor loop mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTracker {
    status: ServiceStatus,
    streak: StreakCounters,
}

impl StatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn status(&self) -> ServiceStatus {
        self.status
    }

    #[must_use]
    pub const fn streak(&self) -> StreakCounters {
        self.streak
    }

    /// Apply one cycle verdict.
    ///
    /// UNKNOWN → UP is silent while UNKNOWN → DOWN announces an outage: only a
    /// known DOWN can "recover", but any non-DOWN state can "go down".
    pub fn observe(&mut self, healthy: bool) -> Observation {
        let previous = self.status;
        let current = ServiceStatus::from_verdict(healthy);

        let notify = match (previous, current) {
            (ServiceStatus::Down, ServiceStatus::Up) => Some(Transition::Recovered),
            (ServiceStatus::Up | ServiceStatus::Unknown, ServiceStatus::Down) => {
                Some(Transition::WentDown)
            }
            _ => None,
        };

        self.status = current;
        self.streak.record(healthy);

        Observation {
            previous,
            current,
            notify,
        }
    }
}

// ──────────────────── tests ────────────────────
