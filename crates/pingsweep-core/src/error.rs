use thiserror::Error;

/// Failure of a single probe.
///
/// Probe errors never abort a scan; the orchestrator folds them into the
/// target's [`ProbeStatus`](crate::types::ProbeStatus).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("No reply before the probe timeout")]
    Timeout,

    #[error("Probe failed: {0}")]
    Other(String),
}
