//! Scan orchestration.
//!
//! The dispatcher walks the target sequence, takes an admission slot for each
//! target and only then spawns the probing unit that will hold it, so at most
//! `concurrency` units are alive at once. Each unit enforces the probe timeout,
//! logs and records its outcome, and returns it through the join set. The scan
//! finishes once every dispatched unit has been joined.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pingsweep_core::{ProbeOutcome, ProbeStatus, ScanId, ScanReport, Target};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::gate::{AdmissionGate, GatePermit};
use crate::sink::ResultSink;
use crate::targets::Subnet;
use crate::transport::ProbeTransport;

const CANCELLED_REASON: &str = "scan cancelled";
const PANICKED_REASON: &str = "probe unit panicked";

/// Runs ping sweeps with a fixed concurrency and per-probe timeout.
pub struct ScanOrchestrator {
    config: ScanConfig,
    transport: Arc<dyn ProbeTransport>,
    gate: AdmissionGate,
}

impl ScanOrchestrator {
    pub fn new(config: ScanConfig, transport: Arc<dyn ProbeTransport>) -> Self {
        Self {
            gate: AdmissionGate::new(config.concurrency()),
            config,
            transport,
        }
    }

    /// The gate shared by every unit this orchestrator spawns.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Probe every host of `subnet` once and wait for all outcomes.
    pub async fn run(&self, subnet: &Subnet, sink: Arc<dyn ResultSink>) -> ScanReport {
        self.run_with_cancel(subnet, sink, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early once `cancel` fires.
    ///
    /// Units already in flight record a failed outcome and release their
    /// slot; targets not yet dispatched are counted as skipped.
    pub async fn run_with_cancel(
        &self,
        subnet: &Subnet,
        sink: Arc<dyn ResultSink>,
        cancel: CancellationToken,
    ) -> ScanReport {
        let scan_id = ScanId::new();
        let started_at = Utc::now();
        let clock = Instant::now();
        let timeout = self.config.timeout();

        tracing::info!(
            scan_id = %scan_id,
            subnet = %subnet,
            targets = subnet.len(),
            concurrency = self.config.concurrency().get(),
            timeout_ms = timeout.as_millis(),
            "Started ping scanning"
        );

        let mut units: JoinSet<ProbeOutcome> = JoinSet::new();
        let mut unit_targets: HashMap<Id, Target> = HashMap::new();
        let mut outcomes: Vec<ProbeOutcome> = Vec::new();
        let mut dispatched: u64 = 0;
        let mut cancelled = false;
        let mut targets = subnet.targets().peekable();

        while targets.peek().is_some() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                Some(joined) = units.join_next_with_id() => {
                    collect(scan_id, joined, &mut unit_targets, sink.as_ref(), &mut outcomes);
                }
                permit = self.gate.acquire() => {
                    let Ok(permit) = permit else {
                        tracing::error!(scan_id = %scan_id, "Admission gate closed, stopping dispatch");
                        break;
                    };
                    let Some(target) = targets.next() else {
                        break;
                    };

                    dispatched += 1;
                    let handle = units.spawn(probe_unit(ProbeUnit {
                        scan_id,
                        target,
                        timeout,
                        transport: self.transport.clone(),
                        sink: sink.clone(),
                        cancel: cancel.clone(),
                        permit,
                    }));
                    unit_targets.insert(handle.id(), target);
                }
            }
        }

        while let Some(joined) = units.join_next_with_id().await {
            collect(scan_id, joined, &mut unit_targets, sink.as_ref(), &mut outcomes);
        }

        outcomes.sort_unstable_by_key(|o| o.target);

        let report = ScanReport {
            scan_id,
            subnet: subnet.to_string(),
            started_at,
            duration: clock.elapsed(),
            cancelled,
            skipped: subnet.len().saturating_sub(dispatched),
            outcomes,
        };

        tracing::info!(
            scan_id = %scan_id,
            subnet = %subnet,
            total = report.total(),
            responded = report.responded(),
            timed_out = report.timed_out(),
            failed = report.failed(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            peak_in_flight = self.gate.peak(),
            duration_ms = report.duration.as_millis(),
            "Ping scanning completed"
        );

        report
    }
}

/// Parse `subnet` and run a single scan over it.
///
/// The subnet is validated before any probe is sent.
pub async fn run_single_scan(
    transport: Arc<dyn ProbeTransport>,
    subnet: &str,
    config: ScanConfig,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
) -> Result<ScanReport> {
    let subnet = Subnet::parse(subnet)?;
    let orchestrator = ScanOrchestrator::new(config, transport);
    Ok(orchestrator.run_with_cancel(&subnet, sink, cancel).await)
}

struct ProbeUnit {
    scan_id: ScanId,
    target: Target,
    timeout: std::time::Duration,
    transport: Arc<dyn ProbeTransport>,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
    permit: GatePermit,
}

async fn probe_unit(unit: ProbeUnit) -> ProbeOutcome {
    let ProbeUnit {
        scan_id,
        target,
        timeout,
        transport,
        sink,
        cancel,
        permit,
    } = unit;

    let status = tokio::select! {
        biased;

        _ = cancel.cancelled() => ProbeStatus::Failed {
            reason: CANCELLED_REASON.to_string(),
        },
        result = tokio::time::timeout(timeout, transport.probe(target, timeout)) => match result {
            Ok(result) => ProbeStatus::from(result),
            Err(_elapsed) => ProbeStatus::TimedOut,
        },
    };

    let outcome = ProbeOutcome::new(target, status);
    log_outcome(scan_id, &outcome);
    sink.record(&outcome);

    // The slot is held until the outcome has been recorded.
    permit.release();
    outcome
}

fn log_outcome(scan_id: ScanId, outcome: &ProbeOutcome) {
    let target = outcome.target;
    match &outcome.status {
        ProbeStatus::Responded { latency } => {
            let latency_ms = latency.as_secs_f64() * 1000.0;
            tracing::debug!(
                scan_id = %scan_id,
                target = %target,
                latency_ms,
                "{target} ping response in {latency_ms:.4}ms"
            );
        }
        ProbeStatus::TimedOut => {
            tracing::error!(scan_id = %scan_id, target = %target, "{target} timed out");
        }
        ProbeStatus::Failed { reason } if reason == CANCELLED_REASON => {
            tracing::debug!(scan_id = %scan_id, target = %target, "{target} probe cancelled");
        }
        ProbeStatus::Failed { reason } => {
            tracing::warn!(scan_id = %scan_id, target = %target, reason = %reason, "{target} probe failed");
        }
    }
}

/// Merge a joined unit. A unit that panicked never produced its outcome, so
/// one is recorded on its behalf.
fn collect(
    scan_id: ScanId,
    joined: std::result::Result<(Id, ProbeOutcome), JoinError>,
    unit_targets: &mut HashMap<Id, Target>,
    sink: &dyn ResultSink,
    outcomes: &mut Vec<ProbeOutcome>,
) {
    match joined {
        Ok((id, outcome)) => {
            unit_targets.remove(&id);
            outcomes.push(outcome);
        }
        Err(e) => {
            let Some(target) = unit_targets.remove(&e.id()) else {
                tracing::error!(scan_id = %scan_id, error = %e, "Unknown probe unit failed");
                return;
            };
            tracing::error!(scan_id = %scan_id, target = %target, error = %e, "Probe unit panicked");
            let outcome = ProbeOutcome::failed(target, PANICKED_REASON);
            sink.record(&outcome);
            outcomes.push(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pingsweep_core::ProbeError;

    use super::*;
    use crate::sink::NullSink;

    /// Answers from a fixed table; unknown addresses never answer.
    struct TableTransport {
        replies: HashMap<Ipv4Addr, std::result::Result<Duration, ProbeError>>,
        calls: AtomicUsize,
    }

    impl TableTransport {
        fn new(replies: Vec<(Ipv4Addr, std::result::Result<Duration, ProbeError>)>) -> Self {
            Self {
                replies: replies.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProbeTransport for TableTransport {
        async fn probe(
            &self,
            target: Target,
            _timeout: Duration,
        ) -> std::result::Result<Duration, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(&target.addr()) {
                Some(Ok(latency)) => {
                    tokio::time::sleep(*latency).await;
                    Ok(*latency)
                }
                Some(Err(e)) => Err(e.clone()),
                None => std::future::pending().await,
            }
        }
    }

    /// Panics for `.2`; every other host answers, or hangs when `hang` is set.
    struct PanickingTransport {
        hang: bool,
    }

    #[async_trait]
    impl ProbeTransport for PanickingTransport {
        async fn probe(
            &self,
            target: Target,
            _timeout: Duration,
        ) -> std::result::Result<Duration, ProbeError> {
            if target.addr().octets()[3] == 2 {
                panic!("transport bug");
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(Duration::from_millis(1))
        }
    }

    fn config(concurrency: i64, timeout_secs: f64) -> ScanConfig {
        ScanConfig::new(concurrency, timeout_secs).unwrap()
    }

    fn subnet(s: &str) -> Subnet {
        Subnet::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_transport_times_out() {
        let transport = Arc::new(TableTransport::new(vec![]));
        let orchestrator = ScanOrchestrator::new(config(4, 1.0), transport.clone());

        let report = orchestrator
            .run(&subnet("10.0.0.0/29"), Arc::new(NullSink))
            .await;

        assert_eq!(report.total(), 6);
        assert_eq!(report.timed_out(), 6);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
        // Two waves of four and two, one second each.
        assert!(report.duration >= Duration::from_secs(2));
        assert!(report.duration < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_are_recorded() {
        let transport = Arc::new(TableTransport::new(vec![
            (Ipv4Addr::new(10, 0, 0, 1), Ok(Duration::from_millis(3))),
            (
                Ipv4Addr::new(10, 0, 0, 2),
                Err(ProbeError::Other("permission denied".into())),
            ),
        ]));
        let orchestrator = ScanOrchestrator::new(config(2, 1.0), transport);

        let report = orchestrator
            .run(&subnet("10.0.0.0/30"), Arc::new(NullSink))
            .await;

        assert_eq!(report.total(), 2);
        assert_eq!(
            report.outcome_for(Ipv4Addr::new(10, 0, 0, 1)).unwrap().status,
            ProbeStatus::Responded {
                latency: Duration::from_millis(3)
            }
        );
        assert_eq!(
            report.outcome_for(Ipv4Addr::new(10, 0, 0, 2)).unwrap().status,
            ProbeStatus::Failed {
                reason: "permission denied".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_timeout_error_maps_to_timed_out() {
        let transport = Arc::new(TableTransport::new(vec![(
            Ipv4Addr::new(10, 0, 0, 1),
            Err(ProbeError::Timeout),
        )]));
        let orchestrator = ScanOrchestrator::new(config(1, 5.0), transport);

        let report = orchestrator
            .run(&subnet("10.0.0.1/32"), Arc::new(NullSink))
            .await;
        assert_eq!(report.outcomes[0].status, ProbeStatus::TimedOut);
        // Returned immediately, not after the orchestrator deadline.
        assert!(report.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_panicking_unit_still_yields_one_outcome() {
        let orchestrator = ScanOrchestrator::new(config(2, 1.0), Arc::new(PanickingTransport { hang: false }));

        let report = orchestrator
            .run(&subnet("10.0.0.0/29"), Arc::new(NullSink))
            .await;

        assert_eq!(report.total(), 6);
        assert_eq!(report.responded(), 5);
        assert_eq!(
            report.outcome_for(Ipv4Addr::new(10, 0, 0, 2)).unwrap().status,
            ProbeStatus::Failed {
                reason: PANICKED_REASON.into()
            }
        );
        assert_eq!(orchestrator.gate().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_unit_outcome_recorded_before_scan_ends() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = Arc::new(crate::sink::ChannelSink::new(tx));

        let scan = tokio::spawn(async move {
            let orchestrator =
                ScanOrchestrator::new(config(8, 5.0), Arc::new(PanickingTransport { hang: true }));
            let net = subnet("10.0.0.0/29");
            orchestrator.run(&net, sink).await
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.target, Target(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(
            first.status,
            ProbeStatus::Failed {
                reason: PANICKED_REASON.into()
            }
        );
        assert!(!scan.is_finished());

        let report = scan.await.unwrap();
        assert_eq!(report.total(), 6);
        assert_eq!(report.timed_out(), 5);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_sorted_and_gate_drained() {
        let replies = (1..=14)
            .map(|i| (Ipv4Addr::new(10, 0, 0, i), Ok(Duration::from_millis(20 - u64::from(i)))))
            .collect();
        let orchestrator =
            ScanOrchestrator::new(config(5, 1.0), Arc::new(TableTransport::new(replies)));

        let report = orchestrator
            .run(&subnet("10.0.0.0/28"), Arc::new(NullSink))
            .await;

        assert_eq!(report.responded(), 14);
        assert!(report.outcomes.windows(2).all(|w| w[0].target < w[1].target));
        assert!(!report.cancelled);
        assert_eq!(report.skipped, 0);
        assert_eq!(orchestrator.gate().in_flight(), 0);
        assert_eq!(orchestrator.gate().peak(), 5);
        assert_eq!(orchestrator.gate().available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_cancelled_scan_dispatches_nothing() {
        let transport = Arc::new(TableTransport::new(vec![]));
        let orchestrator = ScanOrchestrator::new(config(4, 1.0), transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator
            .run_with_cancel(&subnet("10.0.0.0/24"), Arc::new(NullSink), cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.total(), 0);
        assert_eq!(report.skipped, 254);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_single_scan_rejects_bad_subnet() {
        let transport = Arc::new(TableTransport::new(vec![]));
        let err = run_single_scan(
            transport.clone(),
            "not-a-subnet",
            ScanConfig::default(),
            Arc::new(NullSink),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, crate::DiscoverError::InvalidSubnet { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
