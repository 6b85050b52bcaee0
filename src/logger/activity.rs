//! Activity log: append-only, timestamped, level-tagged text lines.
//!
//! Every line has the shape `YYYY-MM-DD HH:MM:SS [LEVEL] message` and is
//! assembled in memory, then written with a single `write_all` so a `tail -f`
//! on the file never sees a partial line.
//!
//! Three-level fallback chain:
//! 1. Log file
//! 2. stderr with `[SVCMON-LOG]` prefix
//! 3. Silent discard (the monitor must never crash for logging failures)
//!
//! Foreground runs additionally echo each line to stdout.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MonitorError, Result};

/// Tag written in front of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Success => write!(f, "SUCCESS"),
        }
    }
}

/// Degradation state of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    File,
    Stderr,
    Discard,
}

/// Configuration for the activity log.
#[derive(Debug, Clone)]
pub struct ActivityLogConfig {
    /// Log file path. `None` logs to the console only.
    pub path: Option<PathBuf>,
    /// Maximum file size before rotation (bytes). Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep. Default: 3.
    pub max_rotated_files: u32,
    /// Mirror every line to stdout.
    pub echo_console: bool,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("monitor.log")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            echo_console: false,
        }
    }
}

/// Append-only activity log writer with rotation and fallback.
pub struct ActivityLog {
    config: ActivityLogConfig,
    file: Option<File>,
    state: WriterState,
    bytes_written: u64,
}

impl ActivityLog {
    /// Open the log. Falls through the degradation chain on failure.
    pub fn open(config: ActivityLogConfig) -> Self {
        let mut log = Self {
            config,
            file: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        log.try_open();
        log
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub fn warning(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    pub fn success(&mut self, message: impl AsRef<str>) {
        self.log(LogLevel::Success, message.as_ref());
    }

    /// Write one line at the given level.
    pub fn log(&mut self, level: LogLevel, message: &str) {
        let line = format_line(&timestamp_now(), level, message);
        if self.config.echo_console {
            echo(level, &line);
        }
        self.write_line(&line);
    }

    /// Current degradation state.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::File => "file",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    // ──────────────────────── internals ────────────────────────

    fn try_open(&mut self) {
        let Some(path) = self.config.path.clone() else {
            // Console-only logs never fall back to stderr; stdout already has it.
            self.state = if self.config.echo_console {
                WriterState::Discard
            } else {
                WriterState::Stderr
            };
            return;
        };

        match open_append(&path) {
            Ok((file, size)) => {
                self.file = Some(file);
                self.state = WriterState::File;
                self.bytes_written = size;
            }
            Err(e) => {
                eprintln!("[SVCMON-LOG] cannot open log file, using stderr: {e}");
                self.state = WriterState::Stderr;
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::File
            && self.bytes_written + line.len() as u64 > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::File => {
                let Some(file) = self.file.as_mut() else {
                    self.degrade();
                    self.write_line(line);
                    return;
                };
                if file.write_all(line.as_bytes()).is_err() {
                    self.degrade();
                    self.write_line(line);
                    return;
                }
                self.bytes_written += line.len() as u64;
            }
            WriterState::Stderr => {
                if self.config.echo_console {
                    return;
                }
                if write!(io::stderr(), "[SVCMON-LOG] {line}").is_err() {
                    self.state = WriterState::Discard;
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.file = None;
        self.state = match self.state {
            WriterState::File => {
                eprintln!("[SVCMON-LOG] log file write failed, using stderr");
                WriterState::Stderr
            }
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    fn rotate(&mut self) {
        self.file = None;
        let Some(base) = self.config.path.clone() else {
            return;
        };

        // Shift existing rotations: .2→.3, .1→.2, current→.1
        let oldest = rotated_name(&base, self.config.max_rotated_files);
        let _ = fs::remove_file(&oldest);
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        if self.config.max_rotated_files > 0 {
            let _ = rename(&base, rotated_name(&base, 1));
        } else {
            let _ = fs::remove_file(&base);
        }

        match open_append(&base) {
            Ok((file, _)) => {
                self.file = Some(file);
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Render a single log line, newline included.
pub fn format_line(timestamp: &str, level: LogLevel, message: &str) -> String {
    format!("{timestamp} [{level}] {message}\n")
}

/// Local wall-clock timestamp used by log lines and alerts.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(feature = "cli")]
fn echo(level: LogLevel, line: &str) {
    use colored::Colorize;

    let trimmed = line.trim_end();
    let painted = match level {
        LogLevel::Info => trimmed.normal(),
        LogLevel::Warning => trimmed.yellow(),
        LogLevel::Error => trimmed.red(),
        LogLevel::Success => trimmed.green(),
    };
    println!("{painted}");
}

#[cfg(not(feature = "cli"))]
fn echo(_level: LogLevel, line: &str) {
    print!("{line}");
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| MonitorError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| MonitorError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// Build a rotated filename: `monitor.log` → `monitor.log.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

// ──────────────────────── tests ────────────────────────
