//! streamview probe: one-shot connectivity check.
//!
//! Opens the configured source, pulls a single frame, and prints a JSON
//! report. Exit code 0 when the source is reachable, 2 when it is not;
//! unreachable is an answer, not an error.

use anyhow::Result;
use clap::Parser;
use log::error;

use streamview::{probe, RtspConnector, Transport, ViewerConfig};

/// Check whether a stream source is reachable and yielding frames.
#[derive(Parser, Debug)]
#[command(name = "probe", version, about = "One-shot stream connectivity probe")]
struct Args {
    /// Stream URL (rtsp://... or stub://...); defaults to the configured one
    url: Option<String>,

    /// Use UDP transport instead of the default RTSP-over-TCP
    #[arg(long)]
    udp: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(reachable) => std::process::exit(if reachable { 0 } else { 2 }),
        Err(err) => {
            error!("{err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool> {
    let args = Args::parse();
    let mut config = ViewerConfig::load()?;
    if let Some(url) = args.url {
        config.source.url = url;
    }
    if args.udp {
        config.source.transport = Transport::Udp;
    }

    let report = probe::check(&RtspConnector::new(), &config.stream_source());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.reachable)
}
