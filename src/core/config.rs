//! Configuration system: optional TOML file + env var overrides + CLI overrides.
//!
//! Precedence, lowest first: built-in defaults, TOML file, `SVCMON_*`
//! environment variables, command-line flags. The resolved config is
//! validated once and then treated as immutable for the life of the run.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MonitorError, Result};
use crate::daemon::notifications::NotificationConfig;
use crate::monitor::poller::PollPolicy;

/// Full monitor configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Health endpoint to poll. Required.
    pub url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub retries: u32,
    /// Wait between failed attempts inside one cycle.
    pub retry_delay_secs: u64,
    pub log_file: PathBuf,
    pub pid_file: PathBuf,
    /// Snapshot written after every cycle. Defaults next to the PID file.
    pub state_file: Option<PathBuf>,
    /// Perform a single cycle and exit.
    pub run_once: bool,
    /// Mirror log lines to stdout.
    pub echo_console: bool,
    pub notifications: NotificationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            interval_secs: 30,
            timeout_secs: 10,
            retries: 3,
            retry_delay_secs: 5,
            log_file: PathBuf::from("monitor.log"),
            pid_file: PathBuf::from("monitor.pid"),
            state_file: None,
            run_once: false,
            echo_console: true,
            notifications: NotificationConfig::default(),
        }
    }
}

/// Command-line values that override file and environment settings.
///
/// `None` / `false` means "not given on the command line".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub webhook_url: Option<String>,
    pub webhook_channel: Option<String>,
    pub notify_file: Option<PathBuf>,
    pub no_notify: bool,
    pub run_once: bool,
}

impl MonitorConfig {
    /// Load defaults + optional TOML file + env overrides, without validating.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path).map_err(|source| MonitorError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            Some(path) => {
                return Err(MonitorError::MissingConfig {
                    path: path.to_path_buf(),
                });
            }
            None => Self::default(),
        };
        cfg.apply_env_overrides_from(env_var)?;
        Ok(cfg)
    }

    /// Full startup resolution: load, apply CLI overrides, validate.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut cfg = Self::load(path)?;
        cfg.apply_overrides(overrides);
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolution for `stop`/`status`, which only need the file locations
    /// and must work without a service URL.
    pub fn resolve_unvalidated(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut cfg = Self::load(path)?;
        cfg.apply_overrides(overrides);
        cfg.normalize();
        Ok(cfg)
    }

    /// Apply command-line overrides on top of the current values.
    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        if let Some(url) = &o.url {
            self.url.clone_from(url);
        }
        if let Some(v) = o.interval_secs {
            self.interval_secs = v;
        }
        if let Some(v) = o.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = o.retries {
            self.retries = v;
        }
        if let Some(v) = o.retry_delay_secs {
            self.retry_delay_secs = v;
        }
        if let Some(p) = &o.log_file {
            self.log_file.clone_from(p);
        }
        if let Some(p) = &o.pid_file {
            self.pid_file.clone_from(p);
        }
        if let Some(p) = &o.state_file {
            self.state_file = Some(p.clone());
        }
        if let Some(url) = &o.webhook_url {
            self.notifications.webhook.url = Some(url.clone());
        }
        if let Some(channel) = &o.webhook_channel {
            self.notifications.webhook.channel.clone_from(channel);
        }
        if let Some(p) = &o.notify_file {
            self.notifications.file.path = Some(p.clone());
        }
        if o.no_notify {
            self.notifications.enabled = false;
        }
        if o.run_once {
            self.run_once = true;
        }
    }

    /// Validate run parameters. A missing URL stops the process before any
    /// monitoring starts.
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(MonitorError::InvalidConfig {
                details: "service URL must be specified with --url".to_string(),
            });
        }

        let parsed = reqwest::Url::parse(url).map_err(|e| MonitorError::InvalidConfig {
            details: format!("service URL {url:?} is not a valid URL: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MonitorError::InvalidConfig {
                details: format!(
                    "service URL must use http or https, got {:?}",
                    parsed.scheme()
                ),
            });
        }

        for (name, value) in [
            ("interval_secs", self.interval_secs),
            ("timeout_secs", self.timeout_secs),
            ("retries", u64::from(self.retries)),
        ] {
            if value == 0 {
                return Err(MonitorError::InvalidConfig {
                    details: format!("{name} must be at least 1"),
                });
            }
        }

        if let Some(hook) = self.notifications.webhook.url.as_deref()
            && !hook.trim().is_empty()
            && reqwest::Url::parse(hook.trim()).is_err()
        {
            return Err(MonitorError::InvalidConfig {
                details: format!("notification webhook {hook:?} is not a valid URL"),
            });
        }

        if self.pid_file.as_os_str().is_empty() {
            return Err(MonitorError::InvalidConfig {
                details: "pid_file must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Resolved state snapshot path.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.pid_file.with_extension("state.json"))
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            retries: self.retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    fn normalize(&mut self) {
        self.url = self.url.trim().to_string();
        if let Some(hook) = &self.notifications.webhook.url
            && hook.trim().is_empty()
        {
            self.notifications.webhook.url = None;
        }
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SVCMON_URL") {
            self.url = raw;
        }
        if let Some(raw) = lookup("SVCMON_INTERVAL_SECS") {
            self.interval_secs = parse_env_u64("SVCMON_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("SVCMON_TIMEOUT_SECS") {
            self.timeout_secs = parse_env_u64("SVCMON_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("SVCMON_RETRIES") {
            self.retries = parse_env_u32("SVCMON_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("SVCMON_RETRY_DELAY_SECS") {
            self.retry_delay_secs = parse_env_u64("SVCMON_RETRY_DELAY_SECS", &raw)?;
        }
        if let Some(raw) = lookup("SVCMON_LOG_FILE") {
            self.log_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SVCMON_PID_FILE") {
            self.pid_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SVCMON_WEBHOOK_URL") {
            self.notifications.webhook.url = Some(raw);
        }
        if let Some(raw) = lookup("SVCMON_WEBHOOK_CHANNEL") {
            self.notifications.webhook.channel = raw;
        }
        if let Some(raw) = lookup("SVCMON_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_env_bool("SVCMON_NOTIFICATIONS_ENABLED", &raw)?;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| MonitorError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_u32(name: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|error| MonitorError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| MonitorError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use super::{ConfigOverrides, MonitorConfig, MonitorError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn with_url() -> MonitorConfig {
        MonitorConfig {
            url: "http://localhost:8080/greeting".to_string(),
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.interval_secs, 30);
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.retries, 3);
        assert_eq!(cfg.retry_delay_secs, 5);
        assert_eq!(cfg.log_file, PathBuf::from("monitor.log"));
        assert_eq!(cfg.pid_file, PathBuf::from("monitor.pid"));
        assert!(!cfg.run_once);
    }

    #[test]
    fn missing_url_is_rejected() {
        let err = MonitorConfig::default()
            .validate()
            .expect_err("url is required");
        match err {
            MonitorError::InvalidConfig { details } => assert!(details.contains("--url")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_url_is_rejected() {
        let cfg = MonitorConfig {
            url: "   ".to_string(),
            ..MonitorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_http_scheme_rejected() {
        let cfg = MonitorConfig {
            url: "ftp://example.com/health".to_string(),
            ..MonitorConfig::default()
        };
        let err = cfg.validate().expect_err("ftp not allowed");
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = with_url();
        cfg.interval_secs = 0;
        let err = cfg.validate().expect_err("zero interval");
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn zero_retries_rejected() {
        let mut cfg = with_url();
        cfg.retries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn invalid_webhook_rejected() {
        let mut cfg = with_url();
        cfg.notifications.webhook.url = Some("not a url".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        assert!(with_url().validate().is_ok());
    }

    #[test]
    fn state_path_defaults_next_to_pid_file() {
        let mut cfg = with_url();
        cfg.pid_file = PathBuf::from("/run/svcmon/monitor.pid");
        assert_eq!(
            cfg.state_path(),
            PathBuf::from("/run/svcmon/monitor.state.json")
        );
        cfg.state_file = Some(PathBuf::from("/tmp/custom.json"));
        assert_eq!(cfg.state_path(), PathBuf::from("/tmp/custom.json"));
    }

    #[test]
    fn poll_policy_keeps_retry_delay_independent_of_timeout() {
        let mut cfg = with_url();
        cfg.timeout_secs = 42;
        cfg.retry_delay_secs = 5;
        let policy = cfg.poll_policy();
        assert_eq!(policy.retry_delay, Duration::from_secs(5));
        assert_eq!(cfg.timeout(), Duration::from_secs(42));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = with_url();
        cfg.apply_overrides(&ConfigOverrides {
            url: Some("https://other.example/health".to_string()),
            interval_secs: Some(60),
            retries: Some(5),
            webhook_url: Some("https://hooks.example.com/x".to_string()),
            webhook_channel: Some("#ops".to_string()),
            run_once: true,
            ..ConfigOverrides::default()
        });
        assert_eq!(cfg.url, "https://other.example/health");
        assert_eq!(cfg.interval_secs, 60);
        assert_eq!(cfg.retries, 5);
        assert_eq!(cfg.timeout_secs, 10);
        assert!(cfg.run_once);
        assert_eq!(cfg.notifications.webhook.channel, "#ops");
        assert!(cfg.notifications.is_active());
    }

    #[test]
    fn no_notify_disables_notifications() {
        let mut cfg = with_url();
        cfg.notifications.webhook.url = Some("https://hooks.example.com/x".to_string());
        cfg.apply_overrides(&ConfigOverrides {
            no_notify: true,
            ..ConfigOverrides::default()
        });
        assert!(!cfg.notifications.enabled);
        assert!(!cfg.notifications.is_active());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = MonitorConfig::default();
        let env = vars(&[
            ("SVCMON_URL", "http://env.example/health"),
            ("SVCMON_INTERVAL_SECS", "15"),
            ("SVCMON_RETRIES", "7"),
            ("SVCMON_NOTIFICATIONS_ENABLED", "false"),
        ]);
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .expect("env overrides should parse");
        assert_eq!(cfg.url, "http://env.example/health");
        assert_eq!(cfg.interval_secs, 15);
        assert_eq!(cfg.retries, 7);
        assert!(!cfg.notifications.enabled);
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = MonitorConfig::default();
        let env = vars(&[("SVCMON_TIMEOUT_SECS", "soon")]);
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .expect_err("invalid number should fail");
        match err {
            MonitorError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("SVCMON_TIMEOUT_SECS"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = MonitorConfig::load(Some(Path::new("/nonexistent/svcmon/config.toml")))
            .expect_err("missing file");
        assert!(matches!(err, MonitorError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcmon.toml");
        std::fs::write(
            &path,
            r##"
url = "http://toml.example/health"
interval_secs = 45
retry_delay_secs = 2

[notifications.webhook]
url = "https://hooks.example.com/abc"
channel = "#toml"
"##,
        )
        .unwrap();

        let cfg = MonitorConfig::resolve(Some(&path), &ConfigOverrides::default())
            .expect("file config resolves");
        assert_eq!(cfg.interval_secs, 45);
        assert_eq!(cfg.retry_delay_secs, 2);
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.notifications.webhook.channel, "#toml");
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = with_url();
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, parsed);
    }
}
