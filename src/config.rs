use std::time::Duration;

use tracing::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11300;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl ConnectionParameters {
    /// A missing or zero timeout falls back to [`DEFAULT_TIMEOUT`].
    pub fn new(host: impl Into<String>, port: u16, timeout: Option<Duration>) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: timeout
                .filter(|timeout: &Duration| !timeout.is_zero())
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, None)
    }
}

/// Reads a timeout given in (possibly fractional) seconds.
pub fn parse_timeout(value: &str) -> Duration {
    let parsed: Option<Duration> = value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs: f64| Duration::try_from_secs_f64(secs).ok())
        .filter(|timeout: &Duration| !timeout.is_zero());
    match parsed {
        Some(timeout) => timeout,
        None => {
            warn!(value, default = ?DEFAULT_TIMEOUT, "ignoring invalid timeout");
            DEFAULT_TIMEOUT
        }
    }
}
