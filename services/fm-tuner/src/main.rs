//! FM Tuner - demo host
//!
//! Runs the receive chain on the simulated runtime, sweeps the band once
//! and prints the scan report as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fm_tuner::runtime::sim::{SimBand, SimulatedRuntime};
use fm_tuner::{AudioSinkKind, ScanSettings, TunerConfig, TunerContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   FM Tuner - simulated RTL-SDR host");
    info!("===========================================");

    // Load configuration
    let config = TunerConfig::from_env();
    let scan = ScanSettings::from_env();
    let band = SimBand::parse(&std::env::var("FM_SIM_STATIONS").unwrap_or_default())
        .context("Invalid FM_SIM_STATIONS")?;

    info!("Configuration:");
    info!("  Device args: {}", config.device_args);
    info!("  Sample rate: {} Hz", config.sample_rate);
    info!("  Quadrature rate: {} Hz", config.quadrature_rate);
    info!("  Audio decimation: {}", config.audio_decimation);
    info!("  Gain: {} dB", config.gain_db);
    info!("  Simulated stations: {}", band.stations.len());
    info!(
        "  Scan: settle {:?}, measure {:?}, threshold {}",
        scan.settle, scan.measure, scan.threshold
    );

    let runtime = SimulatedRuntime::new(band);
    let tuner = Arc::new(
        TunerContext::create(&runtime, &config, scan, AudioSinkKind::Discard)
            .context("Failed to create tuner")?,
    );

    // The flow graph blocks its thread until stopped
    let pipeline = {
        let tuner = tuner.clone();
        tokio::task::spawn_blocking(move || tuner.start())
    };

    let scanner = {
        let tuner = tuner.clone();
        tokio::task::spawn_blocking(move || tuner.scan())
    };

    tokio::select! {
        result = scanner => {
            let report = result.context("Scan task panicked")??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.truncated {
                warn!("Station list truncated at {} entries", report.stations.len());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            // An in-progress sweep cannot be cancelled; it finishes on its blocking thread
            info!("Interrupted, shutting down");
        }
    }

    tuner.stop();
    match pipeline.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Flow graph error: {}", e),
        Err(e) => error!("Flow graph task failed: {}", e),
    }

    info!(
        "Shutdown complete. Sweeps: {}, frequencies measured: {}",
        tuner.stats().get_sweeps(),
        tuner.stats().get_candidates()
    );
    Ok(())
}
