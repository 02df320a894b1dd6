//! One-shot connection check: read the pressure once and print it.
//!
//! Accepts the exporter's flags plus `--json`.

use graphix_core::codec::format_scientific;
use graphix_core::{Clock, Command, DecodeError, FrameCodec, SystemClock, Transport, TransportError};
use graphix_exporter::runtime::{init_tracing, open_link, AppError, RuntimeConfig};
use serde::Serialize;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
enum ProbeError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("exchange failed: {0}")]
    Transport(#[from] TransportError),

    #[error("bad answer from gauge: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    pressure_pa: f64,
    unix_us: u64,
    link: String,
}

fn main() -> ExitCode {
    let mut json = false;
    let args: Vec<String> = std::env::args()
        .filter(|arg| {
            if arg == "--json" {
                json = true;
                false
            } else {
                true
            }
        })
        .collect();

    let mut config = match RuntimeConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        println!("graphix-probe [--json] [EXPORTER OPTIONS]\n");
        println!("Reads the pressure once over the configured link and prints it.\n");
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    config.logging.stderr = true;
    let _log_guard = match init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match probe(&config) {
        Ok(report) if json => match serde_json::to_string(&report) {
            Ok(line) => {
                println!("{line}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", ProbeError::from(e));
                ExitCode::FAILURE
            }
        },
        Ok(report) => {
            println!(
                "{}: {} Pa ({})",
                report.link,
                format_scientific(report.pressure_pa),
                report.pressure_pa
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn probe(config: &RuntimeConfig) -> Result<ProbeReport, ProbeError> {
    let mut link = open_link(config)?;
    let codec = FrameCodec::new(config.frame);

    let request = codec.encode_request(&Command::ReadPressure)?;
    tracing::debug!(request = ?request, "Sending pressure request");
    let response = link.exchange(&request, config.timeout)?;
    tracing::debug!(response = ?response, "Gauge answered");

    let reading = codec.decode_response(&response, SystemClock.unix_us())?;
    Ok(ProbeReport {
        pressure_pa: reading.value_pa(),
        unix_us: reading.acquired_unix_us(),
        link: link.describe(),
    })
}
