//! Tuner context - owns the flow graph and coordinates tuning and scanning
//!
//! A [`TunerContext`] is built once, shared (usually behind an `Arc`) between
//! a thread that runs the flow graph via [`TunerContext::start`] and a control
//! thread that retunes and scans, and torn down with [`TunerContext::destroy`].

mod scanner;
mod state;
mod topology;

pub use scanner::ScanReport;
pub use state::{ScanStats, StationList};
pub use topology::Topology;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ScanSettings, TunerConfig};
use crate::error::TunerError;
use crate::runtime::{AudioSinkKind, DspRuntime, FlowGraph, PowerProbe, SignalSource};

/// A live FM receiver: flow graph, source and probe handles, and scan results
pub struct TunerContext {
    pipeline: Box<dyn FlowGraph>,
    source: Arc<dyn SignalSource>,
    probe: Arc<dyn PowerProbe>,
    topology: Topology,
    scan_settings: ScanSettings,
    stations: StationList,
    scanning: AtomicBool,
    stats: ScanStats,
}

impl TunerContext {
    /// Build and wire the flow graph for `config`
    ///
    /// Parameter derivation runs before the hardware is opened, so a bad
    /// rate combination fails without leaving a graph behind.
    pub fn create(
        runtime: &dyn DspRuntime,
        config: &TunerConfig,
        scan_settings: ScanSettings,
        sink: AudioSinkKind,
    ) -> Result<Self, TunerError> {
        scan_settings.validate()?;
        let assembly = topology::assemble(runtime, config, sink)?;

        info!(
            "Tuner created on '{}' at {:.1} MHz",
            config.device_args, config.initial_freq_mhz
        );

        Ok(Self {
            pipeline: assembly.pipeline,
            source: assembly.source,
            probe: assembly.probe,
            topology: assembly.topology,
            scan_settings,
            stations: StationList::new(),
            scanning: AtomicBool::new(false),
            stats: ScanStats::new(),
        })
    }

    /// Stop the flow graph and release every handle
    pub fn destroy(self) {
        info!("Destroying tuner");
        drop(self);
    }

    /// Run the flow graph until [`stop`](Self::stop) is called
    ///
    /// Blocks the calling thread for the graph's whole lifetime; run it on a
    /// dedicated thread.
    pub fn start(&self) -> Result<(), TunerError> {
        info!("Starting FM flow graph");
        self.pipeline.start()?;
        self.pipeline.wait();
        info!("FM flow graph halted");
        Ok(())
    }

    /// Request flow graph shutdown, releasing a blocked [`start`](Self::start)
    pub fn stop(&self) {
        info!("Stopping FM flow graph");
        self.pipeline.stop();
    }

    /// Tune to `freq_mhz`
    ///
    /// Range errors are left to the hardware driver. Not serialised against
    /// a running scan: retuning mid-sweep corrupts that step's measurement.
    pub fn set_frequency(&self, freq_mhz: f64) {
        let tuned = self.source.set_center_freq(freq_mhz * 1e6);
        debug!("Tuned to {:.3} MHz (requested {:.3} MHz)", tuned / 1e6, freq_mhz);
    }

    /// Current center frequency in MHz
    pub fn get_frequency(&self) -> f64 {
        self.source.center_freq() / 1e6
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn scan_settings(&self) -> &ScanSettings {
        &self.scan_settings
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }
}

impl Drop for TunerContext {
    fn drop(&mut self) {
        self.pipeline.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::RuntimeError;
    use crate::runtime::sim::{SimBand, SimulatedRuntime};

    fn quick_scan() -> ScanSettings {
        ScanSettings {
            settle: Duration::ZERO,
            measure: Duration::from_millis(1),
            ..ScanSettings::default()
        }
    }

    #[test]
    fn test_frequency_round_trip() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let tuner = TunerContext::create(
            &runtime,
            &TunerConfig::default(),
            quick_scan(),
            AudioSinkKind::Discard,
        )
        .unwrap();

        for freq in [87.9, 95.5, 101.1, 104.3, 107.9] {
            tuner.set_frequency(freq);
            assert!((tuner.get_frequency() - freq).abs() < 1e-9);
        }
    }

    #[test]
    fn test_out_of_range_frequency_left_to_driver() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let tuner = TunerContext::create(
            &runtime,
            &TunerConfig::default(),
            quick_scan(),
            AudioSinkKind::Discard,
        )
        .unwrap();

        tuner.set_frequency(98.7);
        tuner.set_frequency(2.0);
        assert!((tuner.get_frequency() - 98.7).abs() < 1e-9);
    }

    #[test]
    fn test_create_without_device_fails_fast() {
        let runtime = SimulatedRuntime::without_device();
        let result = TunerContext::create(
            &runtime,
            &TunerConfig::default(),
            quick_scan(),
            AudioSinkKind::System,
        );

        assert!(matches!(
            result,
            Err(TunerError::Runtime(RuntimeError::DeviceUnavailable(_)))
        ));
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_create_rejects_invalid_scan_settings() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let settings = ScanSettings {
            step_mhz: -0.2,
            ..quick_scan()
        };
        let result = TunerContext::create(
            &runtime,
            &TunerConfig::default(),
            settings,
            AudioSinkKind::System,
        );
        assert!(matches!(result, Err(TunerError::InvalidConfig(_))));
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_blocks_until_stop() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let tuner = Arc::new(
            TunerContext::create(
                &runtime,
                &TunerConfig::default(),
                quick_scan(),
                AudioSinkKind::Discard,
            )
            .unwrap(),
        );

        let runner = {
            let tuner = tuner.clone();
            thread::spawn(move || tuner.start())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!runner.is_finished());
        assert!(runtime.stats().work_cycles.load(Ordering::Relaxed) > 0);

        tuner.stop();
        runner.join().unwrap().unwrap();

        let tuner = Arc::try_unwrap(tuner).ok().unwrap();
        tuner.destroy();
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_destroy_stopped_context_releases_graph() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let tuner = TunerContext::create(
            &runtime,
            &TunerConfig::default(),
            quick_scan(),
            AudioSinkKind::Discard,
        )
        .unwrap();
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 1);

        tuner.stop();
        tuner.destroy();
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 0);
    }
}
