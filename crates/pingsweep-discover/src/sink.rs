//! Result sinks: where per-host outcomes go as soon as they are known.
//!
//! Sinks are called concurrently from probing units, so implementations must
//! be `Send + Sync` and keep `record` cheap. Writer-backed sinks block, so
//! the binary runs them behind [`spawn_writer`]. Write failures are logged and
//! never interrupt the scan.

use std::io::Write;
use std::sync::{Arc, Mutex};

use pingsweep_core::{ProbeOutcome, ProbeStatus};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

pub trait ResultSink: Send + Sync {
    /// Receive the outcome of one target.
    fn record(&self, outcome: &ProbeOutcome);
}

impl<S: ResultSink + ?Sized> ResultSink for Arc<S> {
    fn record(&self, outcome: &ProbeOutcome) {
        (**self).record(outcome)
    }
}

/// Writes one JSON object per outcome, one per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn record(&self, outcome: &ProbeOutcome) {
        let line = match serde_json::to_string(outcome) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(target = %outcome.target, error = %e, "Failed to serialize outcome");
                return;
            }
        };
        write_line(&self.writer, &line);
    }
}

/// Writes one human-readable line per outcome.
pub struct TextSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> ResultSink for TextSink<W> {
    fn record(&self, outcome: &ProbeOutcome) {
        write_line(&self.writer, &format_text(outcome));
    }
}

/// Render an outcome as `<address>  <state>  <detail>`.
pub fn format_text(outcome: &ProbeOutcome) -> String {
    let addr = outcome.target.to_string();
    match &outcome.status {
        ProbeStatus::Responded { latency } => format!(
            "{addr:<15}  up       {:.3} ms",
            latency.as_secs_f64() * 1000.0
        ),
        ProbeStatus::TimedOut => format!("{addr:<15}  timeout"),
        ProbeStatus::Failed { reason } => format!("{addr:<15}  failed   {reason}"),
    }
}

fn write_line<W: Write>(writer: &Mutex<W>, line: &str) {
    let mut guard = match writer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(e) = writeln!(guard, "{line}").and_then(|_| guard.flush()) {
        tracing::warn!(error = %e, "Failed to write outcome");
    }
}

/// Forwards outcomes into an unbounded channel for async consumers.
pub struct ChannelSink {
    tx: UnboundedSender<ProbeOutcome>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ProbeOutcome>) -> Self {
        Self { tx }
    }
}

impl ResultSink for ChannelSink {
    fn record(&self, outcome: &ProbeOutcome) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(outcome.clone());
    }
}

/// Move blocking writes off the runtime workers.
///
/// Outcomes recorded into the returned [`ChannelSink`] are handed to `sink` on
/// a blocking thread. The handle resolves to `sink` once every clone of the
/// channel sink is dropped and the backlog has been written.
pub fn spawn_writer<S>(sink: S) -> (ChannelSink, JoinHandle<S>)
where
    S: ResultSink + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ProbeOutcome>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(outcome) = rx.blocking_recv() {
            sink.record(&outcome);
        }
        sink
    });
    (ChannelSink::new(tx), handle)
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn record(&self, _outcome: &ProbeOutcome) {}
}
