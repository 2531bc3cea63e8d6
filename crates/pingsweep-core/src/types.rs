//! Core domain types for a ping sweep.
//!
//! A scan expands a subnet into [`Target`]s, probes each one exactly once
//! and records a [`ProbeOutcome`] per target. Completed scans are summarised
//! in a [`ScanReport`].

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProbeError;

// ── Scan identity ─────────────────────────────────────────────────

/// Correlates every log line and outcome of one scan session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScanId(pub Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Targets ───────────────────────────────────────────────────────

/// A single IPv4 host address to probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Target(pub Ipv4Addr);

impl Target {
    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for Target {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Outcomes ──────────────────────────────────────────────────────

/// Terminal result of probing one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The host answered the echo request.
    Responded {
        #[serde(rename = "latency_ms", with = "duration_ms")]
        latency: Duration,
    },
    /// No answer arrived within the probe timeout.
    TimedOut,
    /// The probe could not be completed (unreachable, permission denied, ...).
    Failed { reason: String },
}

impl ProbeStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Responded { .. })
    }
}

impl From<Result<Duration, ProbeError>> for ProbeStatus {
    fn from(result: Result<Duration, ProbeError>) -> Self {
        match result {
            Ok(latency) => Self::Responded { latency },
            Err(ProbeError::Timeout) => Self::TimedOut,
            Err(ProbeError::Other(reason)) => Self::Failed { reason },
        }
    }
}

/// The outcome recorded for a target. Produced exactly once per target per scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeOutcome {
    pub target: Target,
    #[serde(flatten)]
    pub status: ProbeStatus,
    pub completed_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn new(target: Target, status: ProbeStatus) -> Self {
        Self {
            target,
            status,
            completed_at: Utc::now(),
        }
    }

    pub fn responded(target: Target, latency: Duration) -> Self {
        Self::new(target, ProbeStatus::Responded { latency })
    }

    pub fn timed_out(target: Target) -> Self {
        Self::new(target, ProbeStatus::TimedOut)
    }

    pub fn failed(target: Target, reason: impl Into<String>) -> Self {
        Self::new(
            target,
            ProbeStatus::Failed {
                reason: reason.into(),
            },
        )
    }
}

// ── Reports ───────────────────────────────────────────────────────

/// Everything a completed scan produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: ScanId,
    /// The subnet in CIDR notation.
    pub subnet: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    /// Set when the scan was cancelled before every target was probed.
    pub cancelled: bool,
    /// Targets never dispatched because the scan was cancelled.
    pub skipped: u64,
    /// One outcome per dispatched target, ordered by address.
    pub outcomes: Vec<ProbeOutcome>,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn responded(&self) -> usize {
        self.count(|s| matches!(s, ProbeStatus::Responded { .. }))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|s| matches!(s, ProbeStatus::TimedOut))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ProbeStatus::Failed { .. }))
    }

    /// Hosts that answered, in address order.
    pub fn hosts_up(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_up())
    }

    pub fn outcome_for(&self, addr: Ipv4Addr) -> Option<&ProbeOutcome> {
        self.outcomes
            .binary_search_by_key(&addr, |o| o.target.addr())
            .ok()
            .map(|idx| &self.outcomes[idx])
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            scan_id: self.scan_id,
            subnet: self.subnet.clone(),
            total: self.total(),
            responded: self.responded(),
            timed_out: self.timed_out(),
            failed: self.failed(),
            skipped: self.skipped,
            cancelled: self.cancelled,
            duration: self.duration,
        }
    }

    fn count(&self, pred: impl Fn(&ProbeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Counts-only view of a [`ScanReport`], emitted when a scan finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSummary {
    pub scan_id: ScanId,
    pub subnet: String,
    pub total: usize,
    pub responded: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub skipped: u64,
    pub cancelled: bool,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

/// Durations on the wire are fractional milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Duration::try_from_secs_f64(ms / 1000.0).map_err(serde::de::Error::custom)
    }
}
