//! Daemon subsystem: the monitoring loop, detached lifecycle control,
//! PID file handling, signal handling, and notifications.

pub mod lifecycle;
pub mod loop_main;
pub mod notifications;
pub mod pidfile;
pub mod signals;
pub mod state_file;
