//! pingsweep-discover: Bounded-concurrency host discovery for IPv4 subnets.
//!
//! Expands a subnet into its usable host addresses, probes every host with an
//! ICMP echo through a pluggable transport, and caps the number of probes in
//! flight with an admission gate. Outcomes stream to a result sink as they
//! arrive and are aggregated into a report once every host has been probed.

pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod orchestrator;
pub mod ping;
pub mod sink;
pub mod targets;
pub mod transport;

pub use error::DiscoverError;
pub use gate::{AdmissionGate, GatePermit};
pub use orchestrator::{run_single_scan, ScanOrchestrator};
pub use targets::Subnet;
pub use transport::ProbeTransport;
