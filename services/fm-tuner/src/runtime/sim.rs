//! In-process simulated runtime
//!
//! Stands in for the streaming runtime and an RTL-SDR front-end when no
//! hardware is attached. The simulated band reports a fixed power for
//! every configured station and a noise floor everywhere else; the flow
//! graph runs a scheduler thread that only counts work cycles.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use super::{Block, BlockId, DspRuntime, FlowGraph, PowerProbe, SignalSource};
use crate::error::RuntimeError;

/// RTL2832U + R820T tuning range
const MIN_TUNABLE_HZ: f64 = 24e6;
const MAX_TUNABLE_HZ: f64 = 1_766e6;

/// Distance from a station's carrier still reported at full power
const CHANNEL_HALF_WIDTH_MHZ: f64 = 0.05;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A transmitter on the simulated band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimStation {
    pub freq_mhz: f64,
    pub power: f64,
}

/// Simulated RF environment
#[derive(Debug, Clone, PartialEq)]
pub struct SimBand {
    pub stations: Vec<SimStation>,
    pub noise_floor: f64,
}

impl Default for SimBand {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            noise_floor: 1e-5,
        }
    }
}

impl SimBand {
    pub fn with_station(mut self, freq_mhz: f64, power: f64) -> Self {
        self.stations.push(SimStation { freq_mhz, power });
        self
    }

    /// Parse a station list of the form `101.1:0.0005,95.5:0.001`
    pub fn parse(list: &str) -> Result<Self, RuntimeError> {
        let mut band = Self::default();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (freq, power) = entry
                .split_once(':')
                .ok_or_else(|| RuntimeError::Other(format!("bad station entry '{}'", entry)))?;
            let freq_mhz = freq
                .trim()
                .parse()
                .map_err(|_| RuntimeError::Other(format!("bad station frequency '{}'", freq)))?;
            let power = power
                .trim()
                .parse()
                .map_err(|_| RuntimeError::Other(format!("bad station power '{}'", power)))?;
            band = band.with_station(freq_mhz, power);
        }
        Ok(band)
    }

    /// Power seen by the probe when tuned to `freq_mhz`
    pub fn power_at(&self, freq_mhz: f64) -> f64 {
        self.stations
            .iter()
            .filter(|s| (s.freq_mhz - freq_mhz).abs() < CHANNEL_HALF_WIDTH_MHZ)
            .map(|s| s.power)
            .fold(self.noise_floor, f64::max)
    }
}

/// Front-end settings last applied through the source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontEndSettings {
    pub sample_rate: f64,
    pub freq_corr_ppm: f64,
    pub dc_offset_mode: u32,
    pub iq_balance_mode: u32,
    pub automatic_gain: bool,
    pub gain_db: f64,
    pub if_gain_db: f64,
    pub bb_gain_db: f64,
    pub antenna: String,
    pub bandwidth: f64,
}

/// Counters observable by tests and the demo binary (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct SimStats {
    pub live_graphs: AtomicUsize,
    pub tune_requests: AtomicU64,
    pub probe_reads: AtomicU64,
    pub work_cycles: AtomicU64,
    pub graph_starts: AtomicU64,
    pub graph_stops: AtomicU64,
    blocks: Mutex<Vec<String>>,
    edges: Mutex<Vec<(&'static str, &'static str)>>,
}

impl SimStats {
    /// Debug descriptions of every block added, in insertion order
    pub fn blocks(&self) -> Vec<String> {
        lock(&self.blocks).clone()
    }

    /// Every connection made, as (upstream kind, downstream kind)
    pub fn edges(&self) -> Vec<(&'static str, &'static str)> {
        lock(&self.edges).clone()
    }
}

#[derive(Debug)]
struct Tuning {
    center_hz: AtomicU64,
}

impl Tuning {
    fn get(&self) -> f64 {
        f64::from_bits(self.center_hz.load(Ordering::SeqCst))
    }

    fn set(&self, hz: f64) {
        self.center_hz.store(hz.to_bits(), Ordering::SeqCst);
    }
}

/// Simulated runtime and hardware
pub struct SimulatedRuntime {
    band: Arc<Mutex<SimBand>>,
    tuning: Arc<Tuning>,
    front_end: Arc<Mutex<FrontEndSettings>>,
    stats: Arc<SimStats>,
    device_present: bool,
}

impl SimulatedRuntime {
    pub fn new(band: SimBand) -> Self {
        Self {
            band: Arc::new(Mutex::new(band)),
            tuning: Arc::new(Tuning { center_hz: AtomicU64::new(0f64.to_bits()) }),
            front_end: Arc::new(Mutex::new(FrontEndSettings::default())),
            stats: Arc::new(SimStats::default()),
            device_present: true,
        }
    }

    /// Runtime whose hardware source cannot be opened
    pub fn without_device() -> Self {
        Self {
            device_present: false,
            ..Self::new(SimBand::default())
        }
    }

    pub fn stats(&self) -> &Arc<SimStats> {
        &self.stats
    }

    pub fn front_end(&self) -> FrontEndSettings {
        lock(&self.front_end).clone()
    }

    /// Replace the simulated RF environment while the graph runs
    pub fn set_band(&self, band: SimBand) {
        *lock(&self.band) = band;
    }
}

impl DspRuntime for SimulatedRuntime {
    fn open_source(&self, args: &str) -> Result<Arc<dyn SignalSource>, RuntimeError> {
        if !self.device_present {
            return Err(RuntimeError::DeviceUnavailable(format!("no device matches '{}'", args)));
        }
        info!("Opened simulated source ({})", args);
        Ok(Arc::new(SimSource {
            tuning: self.tuning.clone(),
            front_end: self.front_end.clone(),
            stats: self.stats.clone(),
        }))
    }

    fn power_probe(&self, _threshold_db: f64, _alpha: f64) -> Arc<dyn PowerProbe> {
        Arc::new(SimProbe {
            band: self.band.clone(),
            tuning: self.tuning.clone(),
            stats: self.stats.clone(),
        })
    }

    fn top_block(&self, name: &str) -> Box<dyn FlowGraph> {
        Box::new(SimGraph::new(name, self.stats.clone()))
    }
}

struct SimSource {
    tuning: Arc<Tuning>,
    front_end: Arc<Mutex<FrontEndSettings>>,
    stats: Arc<SimStats>,
}

impl SignalSource for SimSource {
    fn set_center_freq(&self, hz: f64) -> f64 {
        self.stats.tune_requests.fetch_add(1, Ordering::Relaxed);
        if !(MIN_TUNABLE_HZ..=MAX_TUNABLE_HZ).contains(&hz) {
            warn!("Frequency {} Hz outside tuner range, keeping {} Hz", hz, self.tuning.get());
            return self.tuning.get();
        }
        self.tuning.set(hz);
        hz
    }

    fn center_freq(&self) -> f64 {
        self.tuning.get()
    }

    fn set_sample_rate(&self, hz: f64) -> f64 {
        lock(&self.front_end).sample_rate = hz;
        hz
    }

    fn set_freq_corr(&self, ppm: f64) {
        lock(&self.front_end).freq_corr_ppm = ppm;
    }

    fn set_dc_offset_mode(&self, mode: u32) {
        lock(&self.front_end).dc_offset_mode = mode;
    }

    fn set_iq_balance_mode(&self, mode: u32) {
        lock(&self.front_end).iq_balance_mode = mode;
    }

    fn set_gain_mode(&self, automatic: bool) {
        lock(&self.front_end).automatic_gain = automatic;
    }

    fn set_gain(&self, db: f64) {
        lock(&self.front_end).gain_db = db;
    }

    fn set_if_gain(&self, db: f64) {
        lock(&self.front_end).if_gain_db = db;
    }

    fn set_bb_gain(&self, db: f64) {
        lock(&self.front_end).bb_gain_db = db;
    }

    fn set_antenna(&self, name: &str) {
        lock(&self.front_end).antenna = name.to_string();
    }

    fn set_bandwidth(&self, hz: f64) {
        lock(&self.front_end).bandwidth = hz;
    }
}

struct SimProbe {
    band: Arc<Mutex<SimBand>>,
    tuning: Arc<Tuning>,
    stats: Arc<SimStats>,
}

impl PowerProbe for SimProbe {
    fn level(&self) -> f64 {
        self.stats.probe_reads.fetch_add(1, Ordering::Relaxed);
        lock(&self.band).power_at(self.tuning.get() / 1e6)
    }
}

struct SimGraph {
    name: String,
    blocks: Mutex<Vec<Block>>,
    running: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<SimStats>,
}

impl SimGraph {
    fn new(name: &str, stats: Arc<SimStats>) -> Self {
        stats.live_graphs.fetch_add(1, Ordering::SeqCst);
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            name: name.to_string(),
            blocks: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            stop_tx,
            stop_rx,
            worker: Mutex::new(None),
            stats,
        }
    }

    fn join_worker(&self) {
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}

impl FlowGraph for SimGraph {
    fn add_block(&self, block: Block) -> Result<BlockId, RuntimeError> {
        let mut blocks = lock(&self.blocks);
        debug!("[{}] add {:?}", self.name, block);
        lock(&self.stats.blocks).push(format!("{:?}", block));
        blocks.push(block);
        Ok(BlockId(blocks.len() - 1))
    }

    fn connect(&self, src: BlockId, dst: BlockId) -> Result<(), RuntimeError> {
        let blocks = lock(&self.blocks);
        let (upstream, downstream) = match (blocks.get(src.0), blocks.get(dst.0)) {
            (Some(u), Some(d)) => (u, d),
            _ => {
                return Err(RuntimeError::InvalidConnection(format!(
                    "unknown block in {:?} -> {:?}",
                    src, dst
                )))
            }
        };
        if src == dst || !upstream.has_output() || !downstream.has_input() {
            return Err(RuntimeError::InvalidConnection(format!(
                "{} cannot feed {}",
                upstream.kind(),
                downstream.kind()
            )));
        }
        lock(&self.stats.edges).push((upstream.kind(), downstream.kind()));
        Ok(())
    }

    fn start(&self) -> Result<(), RuntimeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        // Drop a stop request left over from before this run
        while self.stop_rx.try_recv().is_ok() {}

        self.stats.graph_starts.fetch_add(1, Ordering::Relaxed);
        let running = self.running.clone();
        let stats = self.stats.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-sched", self.name))
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    stats.work_cycles.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_millis(5));
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                RuntimeError::Other(format!("failed to spawn scheduler thread: {}", e))
            })?;
        *lock(&self.worker) = Some(handle);
        info!("[{}] flow graph started", self.name);
        Ok(())
    }

    fn wait(&self) {
        while self.running.load(Ordering::SeqCst) {
            match self.stop_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.join_worker();
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.stats.graph_stops.fetch_add(1, Ordering::Relaxed);
            let _ = self.stop_tx.try_send(());
            info!("[{}] flow graph stopped", self.name);
        }
    }
}

impl Drop for SimGraph {
    fn drop(&mut self) {
        self.stop();
        self.join_worker();
        self.stats.live_graphs.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::AudioSinkKind;

    #[test]
    fn test_band_power() {
        let band = SimBand::default().with_station(101.1, 5e-4);
        assert_eq!(band.power_at(101.1), 5e-4);
        assert_eq!(band.power_at(101.3), band.noise_floor);
    }

    #[test]
    fn test_parse_band() {
        let band = SimBand::parse("101.1:0.0005, 95.5:0.001").unwrap();
        assert_eq!(band.stations.len(), 2);
        assert_eq!(band.stations[1], SimStation { freq_mhz: 95.5, power: 0.001 });

        assert!(SimBand::parse("").unwrap().stations.is_empty());
        assert!(SimBand::parse("101.1").is_err());
        assert!(SimBand::parse("abc:0.1").is_err());
    }

    #[test]
    fn test_source_rejects_out_of_range() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let source = runtime.open_source("rtl=0").unwrap();
        assert_eq!(source.set_center_freq(100e6), 100e6);
        assert_eq!(source.set_center_freq(5e6), 100e6);
        assert_eq!(source.center_freq(), 100e6);
    }

    #[test]
    fn test_missing_device() {
        let runtime = SimulatedRuntime::without_device();
        assert!(matches!(
            runtime.open_source("rtl=0"),
            Err(RuntimeError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_graph_rejects_bad_connections() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let graph = runtime.top_block("test");
        let sink = graph
            .add_block(Block::AudioSink { kind: AudioSinkKind::Discard, sample_rate: 48_000 })
            .unwrap();
        let fir = graph.add_block(Block::ComplexFir { decimation: 1, taps: vec![1.0] }).unwrap();

        assert!(graph.connect(sink, fir).is_err());
        assert!(graph.connect(fir, fir).is_err());
        assert!(graph.connect(fir, BlockId(9)).is_err());
        assert!(graph.connect(fir, sink).is_ok());
    }

    #[test]
    fn test_graph_start_wait_stop() {
        let runtime = SimulatedRuntime::new(SimBand::default());
        let graph: Arc<dyn FlowGraph> = Arc::from(runtime.top_block("test"));
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 1);

        graph.start().unwrap();
        assert_eq!(graph.start(), Err(RuntimeError::AlreadyRunning));

        let waiter = {
            let graph = graph.clone();
            thread::spawn(move || graph.wait())
        };
        thread::sleep(Duration::from_millis(20));
        graph.stop();
        waiter.join().unwrap();

        // Restartable after a stop
        graph.start().unwrap();
        graph.stop();
        graph.wait();

        drop(graph);
        assert_eq!(runtime.stats().live_graphs.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.stats().graph_stops.load(Ordering::Relaxed), 2);
    }
}
