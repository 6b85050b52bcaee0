//! Health probe capability and its blocking HTTP implementation.
//!
//! A probe is a single bounded-time attempt to reach the health endpoint. The
//! outcome carries the failure cause for logging; callers that only need a
//! verdict use [`ProbeOutcome::is_healthy`].

#![allow(missing_docs)]

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::core::errors::{MonitorError, Result};

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A 2xx response arrived within the timeout.
    Healthy { status: u16 },
    /// A response arrived but was not 2xx.
    BadStatus { status: u16 },
    /// No response within the timeout.
    Timeout,
    /// Connection refused, DNS failure, TLS failure, and the like.
    ConnectionFailed { details: String },
}

impl ProbeOutcome {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy { status } => write!(f, "healthy (HTTP {status})"),
            Self::BadStatus { status } => write!(f, "service returned status code: {status}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionFailed { details } => write!(f, "request failed: {details}"),
        }
    }
}

/// Anything that can answer "is the service reachable and healthy right now?".
pub trait HealthProbe: Send {
    /// Identity of the probed target, used in log lines and alerts.
    fn target(&self) -> &str;

    /// Perform one bounded-time attempt.
    fn probe(&self) -> ProbeOutcome;
}

/// GET-based probe using a blocking `reqwest` client with a per-request timeout.
pub struct HttpProbe {
    url: String,
    client: Client,
}

impl HttpProbe {
    /// Build a probe for `url` whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("svcmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MonitorError::Probe {
                url: url.clone(),
                details: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { url, client })
    }
}

impl HealthProbe for HttpProbe {
    fn target(&self) -> &str {
        &self.url
    }

    fn probe(&self) -> ProbeOutcome {
        match self.client.get(&self.url).send() {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    ProbeOutcome::Healthy {
                        status: status.as_u16(),
                    }
                } else {
                    ProbeOutcome::BadStatus {
                        status: status.as_u16(),
                    }
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::Timeout,
            Err(e) => ProbeOutcome::ConnectionFailed {
                details: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve `count` connections with a fixed status line, then exit.
    fn serve(status_line: &'static str, count: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming().take(count) {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0_u8; 2048];
                let _ = stream.read(&mut buf);
                let response =
                    format!("{status_line}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok");
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/health")
    }

    fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/health")
    }

    #[test]
    fn ok_response_is_healthy() {
        let url = serve("HTTP/1.1 200 OK", 1);
        let probe = HttpProbe::new(&url, Duration::from_secs(5)).unwrap();
        assert_eq!(probe.target(), url);
        assert_eq!(probe.probe(), ProbeOutcome::Healthy { status: 200 });
    }

    #[test]
    fn any_2xx_is_healthy() {
        let url = serve("HTTP/1.1 204 No Content", 1);
        let probe = HttpProbe::new(url, Duration::from_secs(5)).unwrap();
        assert!(probe.probe().is_healthy());
    }

    #[test]
    fn server_error_is_bad_status() {
        let url = serve("HTTP/1.1 503 Service Unavailable", 1);
        let probe = HttpProbe::new(url, Duration::from_secs(5)).unwrap();
        assert_eq!(probe.probe(), ProbeOutcome::BadStatus { status: 503 });
    }

    #[test]
    fn refused_connection_is_failure() {
        let probe = HttpProbe::new(closed_port_url(), Duration::from_secs(2)).unwrap();
        let outcome = probe.probe();
        assert!(!outcome.is_healthy());
        assert!(matches!(
            outcome,
            ProbeOutcome::ConnectionFailed { .. } | ProbeOutcome::Timeout
        ));
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept but never answer.
        let handle = thread::spawn(move || {
            let conn = listener.accept();
            thread::sleep(Duration::from_secs(2));
            drop(conn);
        });

        let probe =
            HttpProbe::new(format!("http://{addr}/"), Duration::from_millis(300)).unwrap();
        assert_eq!(probe.probe(), ProbeOutcome::Timeout);
        let _ = handle.join();
    }

    #[test]
    fn outcome_display_mentions_cause() {
        assert!(
            ProbeOutcome::BadStatus { status: 500 }
                .to_string()
                .contains("500")
        );
        assert_eq!(ProbeOutcome::Timeout.to_string(), "request timed out");
    }
}
