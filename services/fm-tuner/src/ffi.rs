//! C-linkage control surface for host integration
//!
//! Every function tolerates a null handle: it logs and does nothing. No
//! error crosses this boundary; construction failures come back as null.
//!
//! The host registers the runtime and settings once with [`install`] before
//! calling [`fm_create_tuner`].

use std::sync::{Arc, RwLock};

use tracing::{error, info};

use crate::config::{ScanSettings, TunerConfig};
use crate::runtime::{AudioSinkKind, DspRuntime};
use crate::tuner::TunerContext;

/// Opaque tuner handle handed to C callers
pub struct FmTuner {
    ctx: Arc<TunerContext>,
}

struct HostSetup {
    runtime: Arc<dyn DspRuntime>,
    config: TunerConfig,
    scan: ScanSettings,
}

static HOST: RwLock<Option<HostSetup>> = RwLock::new(None);

/// Register the runtime and settings used by subsequent `fm_create_tuner` calls
pub fn install(runtime: Arc<dyn DspRuntime>, config: TunerConfig, scan: ScanSettings) {
    let mut host = HOST.write().unwrap_or_else(|e| e.into_inner());
    *host = Some(HostSetup { runtime, config, scan });
}

/// Resolve a handle, logging when it is null
///
/// # Safety
/// `tuner` must be null or a live pointer returned by `fm_create_tuner`.
unsafe fn handle<'a>(tuner: *const FmTuner, op: &str) -> Option<&'a FmTuner> {
    // SAFETY: caller guarantees the pointer is null or live
    let handle = unsafe { tuner.as_ref() };
    if handle.is_none() {
        error!("{}: null tuner handle", op);
    }
    handle
}

/// Create a tuner and wire its flow graph; returns null on failure
#[no_mangle]
pub extern "C" fn fm_create_tuner(sink: u32) -> *mut FmTuner {
    let sink = match AudioSinkKind::try_from(sink) {
        Ok(kind) => kind,
        Err(e) => {
            error!("fm_create_tuner: {}", e);
            return std::ptr::null_mut();
        }
    };

    let host = HOST.read().unwrap_or_else(|e| e.into_inner());
    let Some(setup) = host.as_ref() else {
        error!("fm_create_tuner: no runtime installed");
        return std::ptr::null_mut();
    };

    match TunerContext::create(setup.runtime.as_ref(), &setup.config, setup.scan.clone(), sink) {
        Ok(ctx) => Box::into_raw(Box::new(FmTuner { ctx: Arc::new(ctx) })),
        Err(e) => {
            error!("fm_create_tuner: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Stop the flow graph and release the handle
///
/// # Safety
/// `tuner` must be null or a pointer from `fm_create_tuner` not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn fm_destroy_tuner(tuner: *mut FmTuner) {
    if tuner.is_null() {
        error!("fm_destroy_tuner: null tuner handle");
        return;
    }
    // SAFETY: non-null and owned by the caller per the contract above
    let tuner = unsafe { Box::from_raw(tuner) };
    tuner.ctx.stop();
    info!("fm_destroy_tuner: released");
    // A blocked fm_start holds its own reference until the graph halts
}

/// Run the flow graph; blocks until `fm_stop` or `fm_destroy_tuner`
///
/// # Safety
/// `tuner` must be null or a live pointer from `fm_create_tuner`.
#[no_mangle]
pub unsafe extern "C" fn fm_start(tuner: *const FmTuner) {
    let Some(tuner) = (unsafe { handle(tuner, "fm_start") }) else {
        return;
    };
    let ctx = tuner.ctx.clone();
    if let Err(e) = ctx.start() {
        error!("fm_start: {}", e);
    }
}

/// # Safety
/// `tuner` must be null or a live pointer from `fm_create_tuner`.
#[no_mangle]
pub unsafe extern "C" fn fm_stop(tuner: *const FmTuner) {
    if let Some(tuner) = unsafe { handle(tuner, "fm_stop") } {
        tuner.ctx.stop();
    }
}

/// # Safety
/// `tuner` must be null or a live pointer from `fm_create_tuner`.
#[no_mangle]
pub unsafe extern "C" fn fm_set_frequency(tuner: *const FmTuner, freq_mhz: f64) {
    if let Some(tuner) = unsafe { handle(tuner, "fm_set_frequency") } {
        tuner.ctx.set_frequency(freq_mhz);
    }
}

/// Current frequency in MHz, or 0.0 for a null handle
///
/// # Safety
/// `tuner` must be null or a live pointer from `fm_create_tuner`.
#[no_mangle]
pub unsafe extern "C" fn fm_get_frequency(tuner: *const FmTuner) -> f64 {
    match unsafe { handle(tuner, "fm_get_frequency") } {
        Some(tuner) => tuner.ctx.get_frequency(),
        None => 0.0,
    }
}

/// Sweep the band and copy found stations into `out`
///
/// Returns the number of frequencies written, at most `capacity`; pass a
/// buffer of `MAX_STATIONS` entries to never lose a station.
///
/// # Safety
/// `tuner` must be null or a live pointer from `fm_create_tuner`; `out`
/// must be null or valid for `capacity` writes.
#[no_mangle]
pub unsafe extern "C" fn fm_get_stations(tuner: *const FmTuner, out: *mut f64, capacity: usize) -> u32 {
    let Some(tuner) = (unsafe { handle(tuner, "fm_get_stations") }) else {
        return 0;
    };
    if out.is_null() {
        error!("fm_get_stations: null output buffer");
        return 0;
    }
    // SAFETY: caller guarantees `out` is valid for `capacity` elements
    let out = unsafe { std::slice::from_raw_parts_mut(out, capacity) };
    match tuner.ctx.get_stations_into(out) {
        Ok(count) => count as u32,
        Err(e) => {
            error!("fm_get_stations: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::config::MAX_STATIONS;
    use crate::runtime::sim::{SimBand, SimulatedRuntime};

    #[test]
    fn test_null_handles_are_no_ops() {
        let mut out = [0.0; MAX_STATIONS];
        unsafe {
            fm_destroy_tuner(std::ptr::null_mut());
            fm_start(std::ptr::null());
            fm_stop(std::ptr::null());
            fm_set_frequency(std::ptr::null(), 101.1);
            assert_eq!(fm_get_frequency(std::ptr::null()), 0.0);
            assert_eq!(fm_get_stations(std::ptr::null(), out.as_mut_ptr(), out.len()), 0);
        }
    }

    #[test]
    fn test_unknown_sink_returns_null() {
        assert!(fm_create_tuner(42).is_null());
    }

    #[test]
    fn test_lifecycle_through_c_surface() {
        let runtime = Arc::new(SimulatedRuntime::new(
            SimBand::default().with_station(101.1, 0.0005),
        ));
        let scan = ScanSettings {
            settle: Duration::ZERO,
            measure: Duration::from_millis(1),
            ..ScanSettings::default()
        };
        install(runtime.clone(), TunerConfig::default(), scan);

        let tuner = fm_create_tuner(AudioSinkKind::Discard as u32);
        assert!(!tuner.is_null());

        // Raw pointers are not Send; hand the address to the pipeline thread
        let addr = tuner as usize;
        let runner = thread::spawn(move || unsafe { fm_start(addr as *const FmTuner) });
        thread::sleep(Duration::from_millis(20));

        unsafe {
            fm_set_frequency(tuner, 98.5);
            assert!((fm_get_frequency(tuner) - 98.5).abs() < 1e-9);

            let mut out = [0.0; MAX_STATIONS];
            assert_eq!(fm_get_stations(tuner, out.as_mut_ptr(), out.len()), 1);
            assert_eq!(out[0], 101.1);
            assert_eq!(fm_get_stations(tuner, std::ptr::null_mut(), 0), 0);

            fm_destroy_tuner(tuner);
        }
        runner.join().unwrap();
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 0);
    }
}
