#![forbid(unsafe_code)]

//! Service Health Monitor (svcmon) — polls an HTTP health endpoint, tracks
//! whether the service is up or down, and alerts only when that changes.
//!
//! Each poll cycle makes up to `retries` attempts; one healthy response makes
//! the cycle healthy. The status machine (`Unknown` → `Up`/`Down`) keeps
//! consecutive-success and consecutive-failure streaks and emits exactly one
//! notification per transition edge. The monitor can run in the foreground or
//! as a detached daemon guarded by a PID file.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use service_health_monitor::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use service_health_monitor::core::config::MonitorConfig;
//! use service_health_monitor::monitor::status::{ServiceStatus, StatusTracker};
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
