//! Configuration for the pingsweep scanner.
//!
//! Settings are layered (lowest priority first):
//! 1. Defaults
//! 2. Config file (`pingsweep.toml`, `[scan]` section)
//! 3. Environment variables (`PINGSWEEP__SCAN__` prefix)
//! 4. Command-line flags
//!
//! Raw settings are validated into an immutable [`ScanConfig`] before any
//! target is enumerated or probed.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Raw `[scan]` settings as read from file and environment.
///
/// Concurrency and timeout are kept signed/floating here so out-of-range
/// values reach [`ScanConfig`] validation instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanSettings {
    /// Maximum number of probes in flight (default: 20).
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,

    /// Per-probe timeout in seconds (default: 5).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Path to the ping binary (default: "ping").
    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    /// How outcomes are written to stdout.
    #[serde(default)]
    pub format: OutputFormat,

    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<String>,
}

/// Output format for per-host results.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One aligned line per host.
    #[default]
    Text,
    /// One JSON object per host.
    Json,
}

impl FromStr for OutputFormat {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(DiscoverError::InvalidConfig(format!(
                "unknown output format '{s}', choose: text, json"
            ))),
        }
    }
}

fn default_concurrency() -> i64 {
    DEFAULT_CONCURRENCY.get() as i64
}

fn default_timeout_secs() -> f64 {
    5.0
}

fn default_ping_path() -> String {
    "ping".to_string()
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            ping_path: default_ping_path(),
            format: OutputFormat::default(),
            log_file: None,
        }
    }
}

/// Load `[scan]` settings from `<file_prefix>.toml` and `PINGSWEEP__SCAN__*`.
///
/// A missing file or section yields the defaults. A section that is present
/// but malformed is a configuration error.
pub fn load_settings(file_prefix: &str) -> Result<ScanSettings> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("PINGSWEEP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<ScanSettings>("scan") {
        Ok(settings) => Ok(settings),
        Err(config::ConfigError::NotFound(_)) => Ok(ScanSettings::default()),
        Err(e) => Err(DiscoverError::InvalidConfig(e.to_string())),
    }
}

/// Validated, immutable parameters of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    concurrency: NonZeroUsize,
    timeout: Duration,
}

impl ScanConfig {
    pub fn new(concurrency: i64, timeout_secs: f64) -> Result<Self> {
        Ok(Self {
            concurrency: validate_concurrency(concurrency)?,
            timeout: validate_timeout(timeout_secs)?,
        })
    }

    /// Build from unparsed user input, e.g. command-line values.
    pub fn from_raw(concurrency: &str, timeout: &str) -> Result<Self> {
        Ok(Self {
            concurrency: parse_concurrency(concurrency)?,
            timeout: parse_timeout(timeout)?,
        })
    }

    pub fn from_settings(settings: &ScanSettings) -> Result<Self> {
        Self::new(settings.concurrency, settings.timeout_secs)
    }

    /// Validate `settings`, letting raw overrides take precedence.
    pub fn resolve(
        settings: &ScanSettings,
        concurrency: Option<&str>,
        timeout: Option<&str>,
    ) -> Result<Self> {
        let concurrency = match concurrency {
            Some(raw) => parse_concurrency(raw)?,
            None => validate_concurrency(settings.concurrency)?,
        };
        let timeout = match timeout {
            Some(raw) => parse_timeout(raw)?,
            None => validate_timeout(settings.timeout_secs)?,
        };
        Ok(Self {
            concurrency,
            timeout,
        })
    }

    /// Maximum number of probes outstanding at once.
    pub fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
    }

    /// Hard deadline for each probe.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

const DEFAULT_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(n) => n,
    None => panic!("default concurrency must be non-zero"),
};

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Parse a concurrency level; must be a positive integer.
pub fn parse_concurrency(raw: &str) -> Result<NonZeroUsize> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        DiscoverError::InvalidConfig(format!(
            "concurrency must be a positive integer, got '{raw}'"
        ))
    })?;
    validate_concurrency(value)
}

/// Parse a timeout in seconds; must be a positive, finite number.
pub fn parse_timeout(raw: &str) -> Result<Duration> {
    let value: f64 = raw.trim().parse().map_err(|_| {
        DiscoverError::InvalidConfig(format!(
            "timeout must be a positive number of seconds, got '{raw}'"
        ))
    })?;
    validate_timeout(value)
}

fn validate_concurrency(value: i64) -> Result<NonZeroUsize> {
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            DiscoverError::InvalidConfig(format!(
                "concurrency must be a positive integer, got {value}"
            ))
        })
}

fn validate_timeout(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(DiscoverError::InvalidConfig(format!(
            "timeout must be a positive number of seconds, got {secs}"
        )));
    }
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|e| DiscoverError::InvalidConfig(format!("timeout of {secs}s is unusable: {e}")))?;
    if timeout.is_zero() {
        return Err(DiscoverError::InvalidConfig(format!(
            "timeout of {secs}s is shorter than a nanosecond"
        )));
    }
    Ok(timeout)
}
