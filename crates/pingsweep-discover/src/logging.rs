//! Tracing subscriber setup.
//!
//! Logs go to stderr by default so stdout stays reserved for results. With a
//! log file configured they are appended to that file instead.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{DiscoverError, Result};

/// Formatter used for log lines.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(DiscoverError::InvalidConfig(format!(
                "unknown log format '{s}', choose: text, json"
            ))),
        }
    }
}

/// Open `path` for appending, creating it if needed.
pub fn log_writer(path: &Path) -> Result<Mutex<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DiscoverError::LogFile {
            path: path.display().to_string(),
            source,
        })?;
    Ok(Mutex::new(file))
}

/// Install the global subscriber. `RUST_LOG` filters, defaulting to `info`.
pub fn init_tracing(format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let builder = builder.with_ansi(false).with_writer(log_writer(path)?);
            match format {
                LogFormat::Text => builder.init(),
                LogFormat::Json => builder.json().init(),
            }
        }
        None => {
            let builder = builder.with_writer(std::io::stderr);
            match format {
                LogFormat::Text => builder.init(),
                LogFormat::Json => builder.json().init(),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!(matches!(
            "yaml".parse::<LogFormat>(),
            Err(DiscoverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pingsweep.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let subscriber = fmt()
            .with_ansi(false)
            .with_writer(log_writer(&path).unwrap())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target_count = 254, "Started ping scanning");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier run\n"));
        assert!(contents.contains("Started ping scanning"));
        assert!(contents.contains("target_count=254"));
    }

    #[test]
    fn test_log_file_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("pingsweep.log");
        let err = log_writer(&path).unwrap_err();
        assert!(matches!(err, DiscoverError::LogFile { .. }), "{err}");
    }
}
