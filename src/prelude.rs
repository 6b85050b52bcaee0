//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use service_health_monitor::prelude::*;
//! ```

// Core
pub use crate::core::config::{ConfigOverrides, MonitorConfig};
pub use crate::core::errors::{MonitorError, Result};

// Monitor
pub use crate::monitor::poller::{CycleReport, PollExecutor, PollPolicy};
pub use crate::monitor::probe::{HealthProbe, HttpProbe, ProbeOutcome};
pub use crate::monitor::status::{Observation, ServiceStatus, StatusTracker, Transition};

// Daemon
pub use crate::daemon::lifecycle::{DaemonController, StatusReport, StopOutcome};
pub use crate::daemon::loop_main::{HealthMonitor, MonitorState};
pub use crate::daemon::notifications::{NotificationEvent, NotificationManager, NotificationSink};
pub use crate::daemon::pidfile::{DaemonHandle, DaemonLiveness, PidFile};
pub use crate::daemon::signals::SignalHandler;

// Logging
pub use crate::logger::activity::{ActivityLog, ActivityLogConfig, LogLevel};
