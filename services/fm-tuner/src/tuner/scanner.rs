//! Band sweep: locate stations by measuring post-filter power

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::TunerContext;
use crate::config::MAX_STATIONS;
use crate::error::TunerError;
use crate::runtime::PowerProbe;

/// Outcome of one completed sweep
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Station frequencies in MHz, ascending
    pub stations: Vec<f64>,
    /// More stations were above threshold than `MAX_STATIONS` allows
    pub truncated: bool,
    /// Frequencies measured during the sweep
    pub candidates: usize,
    pub completed_at: DateTime<Utc>,
}

/// Held for the duration of a sweep; clears the scanning flag on every exit path
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ScanGuard(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Average probe readings over a wall-clock window
///
/// Returns the mean level and the number of readings, or `None` if the
/// window closed before a single reading was taken.
fn measure_power(probe: &dyn PowerProbe, window: Duration) -> Option<(f64, u64)> {
    let start = Instant::now();
    let mut sum = 0.0;
    let mut samples = 0u64;
    while start.elapsed() < window {
        sum += probe.level();
        samples += 1;
    }
    (samples > 0).then(|| (sum / samples as f64, samples))
}

impl TunerContext {
    /// Sweep the band and replace the station list with what was found
    ///
    /// Blocks for roughly `candidates * (settle + measure)`. Only one sweep
    /// may run at a time; a second caller gets [`TunerError::ScanInProgress`].
    pub fn scan(&self) -> Result<ScanReport, TunerError> {
        let _guard = ScanGuard::acquire(&self.scanning).ok_or(TunerError::ScanInProgress)?;
        let settings = &self.scan_settings;

        info!(
            "Starting scan {:.1}-{:.1} MHz (step {:.1} MHz)",
            settings.start_mhz, settings.stop_mhz, settings.step_mhz
        );

        let mut found = Vec::with_capacity(MAX_STATIONS);
        let mut truncated = false;
        let mut candidates = 0usize;

        for freq in settings.candidates() {
            candidates += 1;
            self.set_frequency(freq);
            thread::sleep(settings.settle);

            let Some((level, samples)) = measure_power(self.probe.as_ref(), settings.measure) else {
                self.stats.record_candidate(0);
                continue;
            };
            self.stats.record_candidate(samples);
            debug!("{:.1} MHz: power {:.6} over {} samples", freq, level, samples);

            if level > settings.threshold {
                if found.len() < MAX_STATIONS {
                    info!("Found station: {:.1} MHz, strength: {:.6}", freq, level);
                    found.push(freq);
                } else {
                    truncated = true;
                    warn!("Station list full, dropping {:.1} MHz", freq);
                }
            }
        }

        self.stations.replace(found.clone());
        self.stats.record_sweep();
        info!("Finished scan: {} stations", found.len());

        Ok(ScanReport {
            stations: found,
            truncated,
            candidates,
            completed_at: Utc::now(),
        })
    }

    /// Run a fresh sweep and return the stations it found
    pub fn get_stations(&self) -> Result<Vec<f64>, TunerError> {
        // TODO: serve the cached list once scanning can run on a second antenna alongside reception
        self.scan()?;
        Ok(self.stations.snapshot())
    }

    /// Run a fresh sweep and copy the result into `out`, returning the count written
    pub fn get_stations_into(&self, out: &mut [f64]) -> Result<usize, TunerError> {
        self.scan()?;
        Ok(self.stations.copy_into(out))
    }

    /// Stations from the last completed sweep, without rescanning
    pub fn last_stations(&self) -> Vec<f64> {
        self.stations.snapshot()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}
