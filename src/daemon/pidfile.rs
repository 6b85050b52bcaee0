//! PID file handling and process liveness for single-instance enforcement.
//!
//! The PID file holds one decimal process id followed by a newline. A file
//! whose process is gone (or whose content does not parse) is *stale* and is
//! cleared by whichever command notices it first. The check-then-write window
//! between two concurrent `start` invocations is accepted: this is an
//! operator-driven tool, not a concurrent service.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MonitorError, Result};

/// What the PID file says about the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonLiveness {
    /// No PID file.
    NotRunning,
    /// PID file names a live process.
    Running,
    /// PID file exists but names no live process.
    Stale,
}

/// PID file contents plus the liveness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonHandle {
    /// `None` when the file is absent or unparsable.
    pub pid: Option<u32>,
    pub liveness: DaemonLiveness,
}

/// A PID file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded PID. `Ok(None)` when the file does not exist.
    pub fn read(&self) -> Result<Option<u32>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MonitorError::io(&self.path, e)),
        };
        parse_pid(&raw)
            .map(Some)
            .ok_or_else(|| MonitorError::PidFile {
                path: self.path.clone(),
                details: format!("expected a process id, found {:?}", raw.trim()),
            })
    }

    /// Record `pid`, replacing any previous content atomically (tmp + rename).
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let result = (|| {
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o644);
            }
            let mut file = opts.open(&tmp)?;
            writeln!(file, "{pid}")?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(MonitorError::io(&self.path, e));
        }
        Ok(())
    }

    /// Delete the file. Returns `false` if it was already gone.
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MonitorError::io(&self.path, e)),
        }
    }

    /// Delete the file only if it still records `pid`.
    ///
    /// A daemon uses this on exit so it never removes a file that a newer
    /// instance has already claimed.
    pub fn remove_if_owned(&self, pid: u32) -> bool {
        match self.read() {
            Ok(Some(recorded)) if recorded == pid => self.remove().unwrap_or(false),
            _ => false,
        }
    }

    /// Classify the file without modifying it.
    pub fn inspect(&self) -> Result<DaemonHandle> {
        match self.read() {
            Ok(None) => Ok(DaemonHandle {
                pid: None,
                liveness: DaemonLiveness::NotRunning,
            }),
            Ok(Some(pid)) => Ok(DaemonHandle {
                pid: Some(pid),
                liveness: if is_process_alive(pid) {
                    DaemonLiveness::Running
                } else {
                    DaemonLiveness::Stale
                },
            }),
            Err(MonitorError::PidFile { .. }) => Ok(DaemonHandle {
                pid: None,
                liveness: DaemonLiveness::Stale,
            }),
            Err(e) => Err(e),
        }
    }
}

/// Parse PID file content. PIDs 0 and 1 are never ours and are rejected,
/// since signalling them would hit a process group or init.
fn parse_pid(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|pid| *pid > 1)
}

/// Whether `pid` names a live (non-zombie) process.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 1 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        // EPERM: exists but owned by someone else.
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// A zombie has exited but not been reaped; treat it as dead.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // Format: "pid (comm) S ...". comm may contain spaces and parens.
    stat.rfind(')')
        .and_then(|idx| stat[idx + 1..].split_whitespace().next())
        .is_some_and(|state| state == "Z")
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}
