//! `link-metrics` — operator CLI for the metrics control channel.
//!
//! Parses and validates operator input, builds the structured request, and
//! prints the structured response or a single human-readable failure line
//! with the error taxonomy's exit code. The round trip to a running
//! router's `<own-router>/link-cost/metrics` endpoint goes through
//! [`transport::MetricsTransport`], whose real implementation is the host
//! daemon's wire codec — out of scope here.

mod transport;

use clap::{Parser, Subcommand};
use nlsr_link_cost_common::NeighborId;
use nlsr_link_cost_control::channel::SetRequest;
use std::process::ExitCode;
use transport::{DemoTransport, MetricsTransport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "link-metrics", about = "Inspect and update NLSR link cost metrics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report externally observed link metrics for a neighbor.
    Set {
        neighbor: String,
        #[arg(long)]
        bandwidth: Option<f64>,
        #[arg(long = "bandwidth-util")]
        bandwidth_util: Option<f64>,
        #[arg(long = "packet-loss")]
        packet_loss: Option<f64>,
        #[arg(long)]
        spectrum: Option<f64>,
    },
    /// Show a neighbor's current cost state and preview cost.
    Show { neighbor: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    // No live daemon to resolve an adjacency list from in this standalone
    // binary; the demo transport only knows the neighbor this invocation
    // names, which is enough to exercise validation and formatting.
    let neighbor = NeighborId::from(neighbor_arg(&cli.command));
    let mut transport = DemoTransport::new([(neighbor.clone(), 10)]);

    let result = match cli.command {
        Command::Set {
            bandwidth,
            bandwidth_util,
            packet_loss,
            spectrum,
            ..
        } => {
            let request = SetRequest {
                bandwidth_mbps: bandwidth,
                utilization: bandwidth_util,
                packet_loss,
                spectrum_dbm: spectrum,
            };
            transport.set(&neighbor, request).map(|ack| format!("{ack:?}"))
        }
        Command::Show { .. } => transport.get(&neighbor).map(|snapshot| format!("{snapshot:?}")),
    };

    match result {
        Ok(line) => {
            println!("{line}");
            ExitCode::from(0)
        }
        Err(err) => {
            eprintln!("link-metrics: {err}");
            ExitCode::from(err.cli_exit_code() as u8)
        }
    }
}

fn neighbor_arg(command: &Command) -> &str {
    match command {
        Command::Set { neighbor, .. } | Command::Show { neighbor } => neighbor,
    }
}
