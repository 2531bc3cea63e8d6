//! pingsweep-core: Shared types for the pingsweep host-discovery scanner.
//!
//! This crate provides the vocabulary shared by the probing engine and its
//! callers:
//! - Scan targets and per-host probe outcomes
//! - The aggregated report produced by a completed scan
//! - Per-probe error types reported by transports

pub mod error;
pub mod types;

pub use error::ProbeError;
pub use types::{ProbeOutcome, ProbeStatus, ScanId, ScanReport, ScanSummary, Target};
