//! Shared scan state: the guarded station list and scan counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::config::MAX_STATIONS;

/// Statistics for station scanning
#[derive(Debug, Default)]
pub struct ScanStats {
    pub sweeps_completed: AtomicU64,
    pub candidates_measured: AtomicU64,
    pub probe_samples: AtomicU64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sweep(&self) {
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate(&self, samples: u64) {
        self.candidates_measured.fetch_add(1, Ordering::Relaxed);
        self.probe_samples.fetch_add(samples, Ordering::Relaxed);
    }

    pub fn get_sweeps(&self) -> u64 {
        self.sweeps_completed.load(Ordering::Relaxed)
    }

    pub fn get_candidates(&self) -> u64 {
        self.candidates_measured.load(Ordering::Relaxed)
    }

    pub fn get_probe_samples(&self) -> u64 {
        self.probe_samples.load(Ordering::Relaxed)
    }
}

/// Station frequencies (MHz) found by the last completed sweep
///
/// The list is only ever replaced as a whole, so readers see either the
/// previous sweep or the new one.
#[derive(Debug, Default)]
pub struct StationList {
    stations: Mutex<Vec<f64>>,
}

impl StationList {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<f64>> {
        self.stations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap in a new sweep result, truncated to `MAX_STATIONS`
    pub fn replace(&self, mut stations: Vec<f64>) {
        stations.truncate(MAX_STATIONS);
        *self.guard() = stations;
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.guard().clone()
    }

    /// Copy into `out`, returning how many entries were written
    pub fn copy_into(&self, out: &mut [f64]) -> usize {
        let stations = self.guard();
        let n = stations.len().min(out.len());
        out[..n].copy_from_slice(&stations[..n]);
        n
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
