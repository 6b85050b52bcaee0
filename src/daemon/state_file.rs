//! Monitor state snapshot for `svcmon daemon status`.
//!
//! The monitor loop rewrites the snapshot after every cycle, atomically
//! (write to `.tmp`, then `rename()`), so a reader always sees a complete
//! document. All fields default so that an older or newer snapshot still
//! deserializes.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MonitorError, Result};
use crate::monitor::status::ServiceStatus;

/// Snapshot of the monitor's view of the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSnapshot {
    pub version: String,
    pub pid: u32,
    pub url: String,
    pub started_at: String,
    pub last_updated: String,
    pub status: ServiceStatus,
    /// Probe timeout the daemon runs with; `stop` sizes its grace period from it.
    pub timeout_secs: u64,
    pub consecutive_successes: u64,
    pub consecutive_failures: u64,
    pub cycles: u64,
    pub notifications_sent: u64,
}

/// Write the snapshot atomically.
pub fn write_snapshot(path: &Path, snapshot: &MonitorSnapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp_path = path.with_extension("json.tmp");

    let result = (|| {
        {
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o644);
            }
            let mut file = opts.open(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(MonitorError::io(path, e));
    }
    Ok(())
}

/// Read a snapshot. `Ok(None)` when the file does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<MonitorSnapshot>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MonitorError::io(path, e)),
    }
}
