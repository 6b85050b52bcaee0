//! SVCMON-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Top-level error type for the service health monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("[SVCMON-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SVCMON-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SVCMON-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SVCMON-2001] probe of {url} failed: {details}")]
    Probe { url: String, details: String },

    #[error("[SVCMON-2002] notification via {channel} failed: {details}")]
    Notification {
        channel: &'static str,
        details: String,
    },

    #[error("[SVCMON-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SVCMON-3001] monitor is already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("[SVCMON-3002] invalid PID file {path}: {details}")]
    PidFile { path: PathBuf, details: String },

    #[error("[SVCMON-3003] process control failure for PID {pid}: {details}")]
    ProcessControl { pid: u32, details: String },

    #[error("[SVCMON-3004] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SVCMON-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MonitorError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SVCMON-1001",
            Self::MissingConfig { .. } => "SVCMON-1002",
            Self::ConfigParse { .. } => "SVCMON-1003",
            Self::Probe { .. } => "SVCMON-2001",
            Self::Notification { .. } => "SVCMON-2002",
            Self::Serialization { .. } => "SVCMON-2101",
            Self::AlreadyRunning { .. } => "SVCMON-3001",
            Self::PidFile { .. } => "SVCMON-3002",
            Self::ProcessControl { .. } => "SVCMON-3003",
            Self::Io { .. } => "SVCMON-3004",
            Self::Runtime { .. } => "SVCMON-3900",
        }
    }

    /// Whether the operator supplied something unusable (as opposed to an
    /// environment failure).
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::AlreadyRunning { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
