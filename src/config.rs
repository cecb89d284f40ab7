//! Configuration management for Subgate.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SubgateError};

/// Main configuration for the Subgate service, as written in YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream the gate forwards to
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Token path configuration
    #[serde(default)]
    pub path: PathConfig,

    /// Update quota configuration
    #[serde(default)]
    pub limit: LimitConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port` for all interfaces
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    ":8080".to_string()
}

/// Upstream configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the subscription backend
    #[serde(default)]
    pub url: String,
}

/// Token path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Prefix the subscription token follows, e.g. `/s/`
    #[serde(default = "default_short_prefix")]
    pub short_prefix: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            short_prefix: default_short_prefix(),
        }
    }
}

fn default_short_prefix() -> String {
    "/s/".to_string()
}

/// Update quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Updates allowed per token per window; zero or less means the default
    #[serde(default = "default_max")]
    pub max: i64,

    /// Window length as a duration string such as `24h` or `1h30m`
    #[serde(default = "default_window")]
    pub window: String,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max: default_max(),
            window: default_window(),
        }
    }
}

fn default_max() -> i64 {
    10
}

fn default_window() -> String {
    "24h".to_string()
}

/// Validated settings the gate runs with. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Address to bind, with an explicit host
    pub listen: String,
    /// Upstream base URL
    pub upstream: Url,
    /// Slash-terminated token prefix
    pub prefix: String,
    /// Updates allowed per window, at least 1
    pub max: u64,
    /// Window length, never zero
    pub window: Duration,
}

impl SubgateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SubgateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Apply defaults and validate, producing the settings the gate runs with.
    pub fn resolve(&self) -> Result<GateSettings> {
        let listen = match self.server.listen.trim() {
            "" => normalize_listen(&default_listen()),
            listen => normalize_listen(listen),
        };

        let upstream = parse_upstream(&self.upstream.url)?;

        let mut prefix = match self.path.short_prefix.trim() {
            "" => default_short_prefix(),
            prefix => prefix.to_string(),
        };
        if !prefix.ends_with('/') {
            prefix.push('/');
        }

        let max = if self.limit.max <= 0 {
            default_max() as u64
        } else {
            self.limit.max as u64
        };

        let window = match self.limit.window.trim() {
            "" => parse_duration(&default_window())?,
            window => parse_duration(window)?,
        };

        Ok(GateSettings {
            listen,
            upstream,
            prefix,
            max,
            window,
        })
    }
}

/// Give `:port` addresses an explicit wildcard host.
fn normalize_listen(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_string()
    }
}

fn parse_upstream(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SubgateError::InvalidUpstream("upstream.url is required".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| SubgateError::InvalidUpstream(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubgateError::InvalidUpstream(format!(
            "{}: scheme must be http or https",
            raw
        )));
    }
    if url.host_str().is_none() {
        return Err(SubgateError::InvalidUpstream(format!("{}: missing host", raw)));
    }
    Ok(url)
}

/// Parse a duration string such as `24h`, `1h30m`, `1.5h` or `300ms`.
///
/// Accepts a sequence of decimal numbers, each followed by one of the units
/// `ns`, `us` (`µs`), `ms`, `s`, `m` or `h`. The result must be positive.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |reason: &str| SubgateError::InvalidWindow(format!("{:?}: {}", input, reason));

    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid("empty duration"));
    }
    if let Some(unsigned) = rest.strip_prefix('+') {
        rest = unsigned;
    } else if rest.starts_with('-') {
        return Err(invalid("duration must be positive"));
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid("expected a number"));
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_len);
        let unit_nanos = unit_nanos(unit).ok_or_else(|| {
            if unit.is_empty() {
                invalid("missing unit")
            } else {
                invalid("unknown unit")
            }
        })?;

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid("number out of range"))?
        };
        // Digits past nanosecond precision cannot change the result
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        let fraction: u128 = if frac_digits.is_empty() {
            0
        } else {
            frac_digits.parse().map_err(|_| invalid("number out of range"))?
        };
        let scale = 10u128.pow(frac_digits.len() as u32);

        total_nanos = whole
            .checked_mul(unit_nanos)
            .and_then(|n| n.checked_add(fraction * unit_nanos / scale))
            .and_then(|n| n.checked_add(total_nanos))
            .ok_or_else(|| invalid("duration out of range"))?;

        rest = remainder;
    }

    if total_nanos == 0 {
        return Err(invalid("duration must be positive"));
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| invalid("duration out of range"))?;
    let nanos = (total_nanos % 1_000_000_000) as u32;
    Ok(Duration::new(secs, nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3600 * 1_000_000_000),
        _ => None,
    }
}
