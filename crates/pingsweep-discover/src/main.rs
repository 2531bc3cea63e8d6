//! CLI entry point for the pingsweep host discovery scanner.

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use pingsweep_core::ScanReport;
use pingsweep_discover::config::{load_settings, OutputFormat, ScanConfig};
use pingsweep_discover::logging::{init_tracing, LogFormat};
use pingsweep_discover::ping::SystemPing;
use pingsweep_discover::sink::{spawn_writer, JsonLinesSink, ResultSink, TextSink};
use pingsweep_discover::{ScanOrchestrator, Subnet};

#[derive(Parser)]
#[command(name = "pingsweep")]
#[command(about = "Discover live hosts on an IPv4 subnet with ICMP echo")]
struct Cli {
    /// Subnet to scan (CIDR or netmask notation, e.g., 192.168.0.0/24).
    #[arg(short, long)]
    subnet: String,

    /// Maximum number of probes in flight (default: 20).
    #[arg(short = 'c', long)]
    concurrent: Option<String>,

    /// Per-probe timeout in seconds, fractions allowed (default: 5).
    #[arg(short, long)]
    timeout: Option<String>,

    /// Result format on stdout: text, json.
    #[arg(long)]
    format: Option<String>,

    /// Log format: text, json.
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<String>,

    /// Config file prefix (default: pingsweep).
    #[arg(long, default_value = "pingsweep")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;

    let log_format: LogFormat = cli.log_format.parse()?;
    let log_file = cli.log_file.as_deref().or(settings.log_file.as_deref());
    init_tracing(log_format, log_file.map(Path::new))?;

    // Everything is validated before the first probe goes out.
    let config = ScanConfig::resolve(
        &settings,
        cli.concurrent.as_deref(),
        cli.timeout.as_deref(),
    )?;
    let subnet = Subnet::parse(&cli.subnet)?;
    let format = match cli.format.as_deref() {
        Some(raw) => raw.parse::<OutputFormat>()?,
        None => settings.format,
    };

    let ping = SystemPing::new(&settings.ping_path);
    let version = ping.verify_installation().await?;
    tracing::info!(ping_path = %ping.ping_path(), ping_version = %version, "Ping verified");

    let stdout_sink: Arc<dyn ResultSink> = match format {
        OutputFormat::Text => Arc::new(TextSink::new(io::stdout())),
        OutputFormat::Json => Arc::new(JsonLinesSink::new(io::stdout())),
    };
    let (sink, writer) = spawn_writer(stdout_sink);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling scan");
                cancel.cancel();
            }
        }
    });

    let orchestrator = ScanOrchestrator::new(config, Arc::new(ping));
    let report = orchestrator
        .run_with_cancel(&subnet, Arc::new(sink), cancel)
        .await;

    // The writer finishes once the last sink handle is gone.
    writer.await?;
    print_summary(&report, format)?;
    Ok(())
}

fn print_summary(report: &ScanReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&report.summary())?);
        }
        OutputFormat::Text => {
            let summary = report.summary();
            println!();
            println!(
                "{}: {} of {} hosts up ({} timed out, {} failed) in {:.2}s",
                summary.subnet,
                summary.responded,
                summary.total,
                summary.timed_out,
                summary.failed,
                summary.duration.as_secs_f64(),
            );
            if summary.cancelled {
                println!("scan cancelled, {} hosts not probed", summary.skipped);
            }
        }
    }
    Ok(())
}
