//! Admission gate bounding the number of probes in flight.
//!
//! A counting semaphore with instrumentation. Slots are handed out as
//! [`GatePermit`]s; dropping a permit releases its slot, so release happens on
//! every exit path of the unit holding it (success, error, panic, abort).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting limiter shared by every probing unit of a scan.
///
/// Waiters are served in FIFO order, so no acquirer starves while the target
/// set is finite.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateState>,
}

#[derive(Debug)]
struct GateState {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionGate {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(GateState {
                semaphore: Arc::new(Semaphore::new(limit.get())),
                limit: limit.get(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot and occupy it.
    ///
    /// The semaphore is never closed, so the error case is unreachable in
    /// practice; callers treat it as end of scheduling.
    pub async fn acquire(&self) -> Result<GatePermit, AcquireError> {
        let permit = self.inner.semaphore.clone().acquire_owned().await?;
        let now = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak.fetch_max(now, Ordering::AcqRel);
        Ok(GatePermit {
            _permit: permit,
            state: self.inner.clone(),
        })
    }

    /// Configured maximum number of outstanding permits.
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of permits ever held at once.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }
}

/// An occupied gate slot. Released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    state: Arc<GateState>,
}

impl GatePermit {
    /// Release the slot explicitly. Equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so in_flight never exceeds limit.
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn gate(n: usize) -> AdmissionGate {
        AdmissionGate::new(NonZeroUsize::new(n).unwrap())
    }

    #[tokio::test]
    async fn test_acquire_and_release_track_occupancy() {
        let gate = gate(2);
        assert_eq!(gate.limit(), 2);

        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 2);
        assert_eq!(gate.available(), 0);

        a.release();
        assert_eq!(gate.in_flight(), 1);
        assert_eq!(gate.available(), 1);

        drop(b);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.peak(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_when_full() {
        let gate = gate(1);
        let held = gate.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_secs(1), gate.acquire()).await;
        assert!(blocked.is_err(), "second acquire should wait while the slot is held");

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_secs(1), gate.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_release_wakes_one_waiter() {
        let gate = gate(1);
        let held = gate.acquire().await.unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move {
                    let _permit = gate.acquire().await.unwrap();
                    tokio::task::yield_now().await;
                })
            })
            .collect();

        tokio::task::yield_now().await;
        drop(held);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.peak(), 1);
    }

    #[tokio::test]
    async fn test_panicking_holder_releases_slot() {
        let gate = gate(1);
        let holder = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                panic!("probe blew up");
            })
        };
        assert!(holder.await.is_err());
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.available(), 1);
    }
}
