//! Probe transport backed by the operating system `ping` utility.
//!
//! Each probe runs one `ping` child process via `tokio::process::Command`
//! asking for a single echo. Using the system binary avoids needing raw
//! socket privileges in this process: `ping` is typically setuid or holds
//! `CAP_NET_RAW` already.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pingsweep_core::{ProbeError, Target};
use tokio::process::Command;

use crate::error::{DiscoverError, Result};
use crate::transport::ProbeTransport;

/// Exit code ping uses when the echo went out but no reply arrived.
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const EXIT_NO_REPLY: i32 = 2;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
const EXIT_NO_REPLY: i32 = 1;

/// Wrapper around the ping binary.
#[derive(Debug, Clone)]
pub struct SystemPing {
    ping_path: String,
}

impl SystemPing {
    pub fn new(ping_path: &str) -> Self {
        Self {
            ping_path: ping_path.to_string(),
        }
    }

    pub fn ping_path(&self) -> &str {
        &self.ping_path
    }

    /// Verify the ping binary can be spawned. Returns its self-reported version line.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.ping_path)
            .arg(VERSION_FLAG)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|_| DiscoverError::PingNotFound {
                path: self.ping_path.clone(),
            })?;

        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr)
        } else {
            String::from_utf8_lossy(&output.stdout)
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    fn command(&self, target: Target, timeout: Duration) -> Command {
        let mut cmd = Command::new(&self.ping_path);
        cmd.args(ping_args(target, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ProbeTransport for SystemPing {
    async fn probe(
        &self,
        target: Target,
        timeout: Duration,
    ) -> std::result::Result<Duration, ProbeError> {
        let start = Instant::now();
        let output = self
            .command(target, timeout)
            .output()
            .await
            .map_err(|e| ProbeError::Other(format!("failed to run {}: {e}", self.ping_path)))?;
        let elapsed = start.elapsed();

        tracing::trace!(
            target = %target,
            code = ?output.status.code(),
            elapsed_ms = elapsed.as_millis(),
            "ping exited"
        );

        classify(
            output.status.success(),
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
            elapsed,
        )
    }
}

#[cfg(windows)]
const VERSION_FLAG: &str = "/?";
#[cfg(not(windows))]
const VERSION_FLAG: &str = "-V";

/// Arguments for a single echo with a reply deadline of `timeout`.
#[cfg(windows)]
fn ping_args(target: Target, timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "1".into(),
        "-w".into(),
        timeout_millis(timeout).to_string(),
        target.to_string(),
    ]
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn ping_args(target: Target, timeout: Duration) -> Vec<String> {
    vec![
        "-c".into(),
        "1".into(),
        "-W".into(),
        timeout_millis(timeout).to_string(),
        target.to_string(),
    ]
}

// iputils and busybox take -W in whole seconds.
#[cfg(not(any(windows, target_os = "macos", target_os = "ios", target_os = "freebsd")))]
fn ping_args(target: Target, timeout: Duration) -> Vec<String> {
    let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
    vec![
        "-c".into(),
        "1".into(),
        "-W".into(),
        wait_secs.to_string(),
        target.to_string(),
    ]
}

#[cfg_attr(
    not(any(windows, target_os = "macos", target_os = "ios", target_os = "freebsd")),
    allow(dead_code)
)]
fn timeout_millis(timeout: Duration) -> u128 {
    timeout.as_millis().max(1)
}

/// Map a finished ping run onto the transport contract.
fn classify(
    success: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
    elapsed: Duration,
) -> std::result::Result<Duration, ProbeError> {
    if is_unreachable(stdout) {
        return Err(ProbeError::Other("destination host unreachable".to_string()));
    }

    if success {
        return Ok(parse_round_trip(stdout).unwrap_or(elapsed));
    }

    if is_total_loss(stdout) {
        return Err(ProbeError::Timeout);
    }

    match code {
        Some(EXIT_NO_REPLY) => Err(ProbeError::Timeout),
        Some(code) => Err(ProbeError::Other(failure_reason(code, stderr))),
        None => Err(ProbeError::Other("ping terminated by signal".to_string())),
    }
}

fn is_unreachable(stdout: &str) -> bool {
    stdout.to_ascii_lowercase().contains("unreachable")
}

// iputils: "100% packet loss", BSD: "100.0% packet loss", Windows: "(100% loss)".
fn is_total_loss(stdout: &str) -> bool {
    ["100% packet loss", "100.0% packet loss", "(100% loss)"]
        .iter()
        .any(|marker| stdout.contains(marker))
}

fn failure_reason(code: i32, stderr: &str) -> String {
    match stderr.trim() {
        "" => format!("ping exited with code {code}"),
        msg => format!("ping exited with code {code}: {msg}"),
    }
}

/// Extract the reply round-trip time (`time=5.12 ms`, `time<1ms`).
fn parse_round_trip(stdout: &str) -> Option<Duration> {
    let start = stdout
        .find("time=")
        .or_else(|| stdout.find("time<"))
        .map(|idx| idx + "time=".len())?;
    let rest = &stdout[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let millis: f64 = rest[..end].parse().ok()?;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
}
