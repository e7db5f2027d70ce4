//! Camera discovery tool
//!
//! Opens each index in turn, reads one frame and closes the device again.
//!
//! # Usage
//!
//! ```bash
//! # Indices 0 through 4 on the configured backend
//! camera-probe --max-index 4 --backend v4l2
//!
//! # Machine-readable output
//! camera-probe --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use homecam_core::capture::{opener_for, probe_devices, ProbeResult};
use homecam_core::config::CaptureBackend;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "camera-probe")]
#[command(author, version)]
#[command(about = "Find camera indices that open and deliver frames")]
struct Args {
    /// Highest index to try
    #[arg(long, default_value_t = 4)]
    max_index: u32,

    /// Capture backend (synthetic or v4l2)
    #[arg(short, long, default_value = "synthetic")]
    backend: CaptureBackend,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let opener = opener_for(args.backend).context("backend unavailable")?;
    tracing::info!(backend = opener.name(), max_index = args.max_index, "Probing cameras");

    let results = probe_devices(opener.as_ref(), 0..=args.max_index);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_table(&results);
    }

    if !results.iter().any(ProbeResult::is_working) {
        anyhow::bail!("no working camera found in indices 0..={}", args.max_index);
    }
    Ok(())
}

fn print_table(results: &[ProbeResult]) {
    println!("{:<6} {:<8} {:<10} {:<12} NOTE", "INDEX", "OPENED", "READABLE", "RESOLUTION");
    for r in results {
        let resolution = match (r.width, r.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            _ => "-".to_string(),
        };
        println!(
            "{:<6} {:<8} {:<10} {:<12} {}",
            r.index,
            yes_no(r.opened),
            yes_no(r.readable),
            resolution,
            r.error.as_deref().unwrap_or("")
        );
    }

    let working: Vec<String> = results
        .iter()
        .filter(|r| r.is_working())
        .map(|r| r.index.to_string())
        .collect();
    if !working.is_empty() {
        println!("\nWorking indices: {}", working.join(", "));
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
