//! The probe transport seam.
//!
//! The orchestrator only needs "send one echo to this host and tell me how
//! long the reply took". Implementations may use raw sockets, the OS ping
//! utility or a test double.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pingsweep_core::{ProbeError, Target};

#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Send a single echo request to `target` and wait up to `timeout`.
    ///
    /// Returns the round-trip latency, [`ProbeError::Timeout`] when no reply
    /// arrived in time, or [`ProbeError::Other`] for any other failure.
    async fn probe(&self, target: Target, timeout: Duration) -> Result<Duration, ProbeError>;
}

#[async_trait]
impl<T: ProbeTransport + ?Sized> ProbeTransport for Arc<T> {
    async fn probe(&self, target: Target, timeout: Duration) -> Result<Duration, ProbeError> {
        (**self).probe(target, timeout).await
    }
}
