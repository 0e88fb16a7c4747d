//! Flow graph topology: parameter derivation and stage wiring
//!
//! source -> quadrature resampler -> channel filter -+-> WFM receiver -> audio resampler -> sink
//!                                                   +-> power probe

use std::f64::consts::PI;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::TunerConfig;
use crate::dsp::{low_pass, ResamplerDesign, Window};
use crate::error::TunerError;
use crate::runtime::{AudioSinkKind, Block, DspRuntime, FlowGraph, PowerProbe, SignalSource};

/// Common divisor applied to the quadrature resampler factors
const QUADRATURE_DIVISOR: u32 = 1;

/// Common divisor applied to the audio resampler factors
const AUDIO_DIVISOR: u32 = 2;

/// Audio resampler factors are expressed in kHz
const AUDIO_FACTOR_UNIT_HZ: f64 = 1e3;

const PROBE_THRESHOLD_DB: f64 = 0.0;
const PROBE_ALPHA: f64 = 1e-4;

/// Front-end modes applied when the source is opened
const DC_OFFSET_AUTOMATIC: u32 = 2;
const IQ_BALANCE_MANUAL: u32 = 1;
const AUTOMATIC_BANDWIDTH: f64 = 0.0;

/// Every parameter derived for the chain, computed before any stage exists
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    pub quadrature: ResamplerDesign,
    pub channel_taps: Vec<f32>,
    pub demod_gain: f64,
    pub demod_rate: f64,
    pub audio: ResamplerDesign,
    pub audio_output_rate: f64,
    pub sink_rate: u32,
}

impl Topology {
    /// Derive resampler and filter parameters from `config`
    pub fn derive(config: &TunerConfig) -> Result<Self, TunerError> {
        for (name, value) in [
            ("sample rate", config.sample_rate),
            ("quadrature rate", config.quadrature_rate),
            ("max deviation", config.max_deviation),
            ("audio output rate", config.audio_output_rate),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(TunerError::config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if config.audio_decimation == 0 {
            return Err(TunerError::config("audio decimation must be at least 1"));
        }
        if config.quadrature_rate > config.sample_rate {
            return Err(TunerError::config(format!(
                "quadrature rate {} Hz exceeds sample rate {} Hz",
                config.quadrature_rate, config.sample_rate
            )));
        }
        if config.audio_output_rate > config.quadrature_rate {
            return Err(TunerError::config(format!(
                "audio rate {} Hz exceeds quadrature rate {} Hz",
                config.audio_output_rate, config.quadrature_rate
            )));
        }
        if config.audio_sink_rate == 0 {
            return Err(TunerError::config("audio sink rate must be positive"));
        }

        let quad_decimation = (config.sample_rate / config.quadrature_rate).floor() as u32;
        let quadrature = ResamplerDesign::derive(1, quad_decimation, QUADRATURE_DIVISOR)?;
        debug!(
            "Quadrature resampler: 1/{} ({} taps, mid {:.4}, tw {:.4})",
            quad_decimation,
            quadrature.taps.len(),
            quadrature.mid_transition_band,
            quadrature.transition_width
        );

        let demod_rate = config.demod_rate();
        let audio_interpolation = (config.audio_output_rate / AUDIO_FACTOR_UNIT_HZ).floor() as u32;
        let audio_decimation = (demod_rate / AUDIO_FACTOR_UNIT_HZ).floor() as u32;
        let audio = ResamplerDesign::derive(audio_interpolation, audio_decimation, AUDIO_DIVISOR)?;
        debug!(
            "Audio resampler: {}/{} ({} taps, mid {:.4}, tw {:.4})",
            audio_interpolation,
            audio_decimation,
            audio.taps.len(),
            audio.mid_transition_band,
            audio.transition_width
        );

        // Sized from the hardware rate, not the quadrature rate it runs at
        let channel_taps = low_pass(
            1.0,
            config.sample_rate,
            config.channel_cutoff,
            config.channel_transition,
            Window::Hamming,
        )?;
        if channel_taps.is_empty() {
            return Err(TunerError::config("channel filter design produced no taps"));
        }

        let demod_gain = config.quadrature_rate / (2.0 * PI * config.max_deviation);

        Ok(Self {
            quadrature,
            channel_taps,
            demod_gain,
            demod_rate,
            audio,
            audio_output_rate: config.audio_output_rate,
            sink_rate: config.audio_sink_rate,
        })
    }
}

/// A wired flow graph with the handles the tuner keeps
pub(crate) struct Assembly {
    pub pipeline: Box<dyn FlowGraph>,
    pub source: Arc<dyn SignalSource>,
    pub probe: Arc<dyn PowerProbe>,
    pub topology: Topology,
}

/// Apply the front-end settings the receiver runs with
fn configure_source(source: &dyn SignalSource, config: &TunerConfig) {
    let rate = source.set_sample_rate(config.sample_rate);
    if rate != config.sample_rate {
        debug!("Source sample rate {} Hz (requested {} Hz)", rate, config.sample_rate);
    }
    source.set_center_freq(config.initial_freq_mhz * 1e6);
    source.set_freq_corr(config.ppm_error);
    source.set_dc_offset_mode(DC_OFFSET_AUTOMATIC);
    source.set_iq_balance_mode(IQ_BALANCE_MANUAL);
    source.set_gain_mode(false);
    source.set_gain(config.gain_db);
    source.set_if_gain(config.gain_db);
    source.set_bb_gain(config.gain_db);
    source.set_antenna("");
    source.set_bandwidth(AUTOMATIC_BANDWIDTH);
}

/// Derive the chain parameters, open the hardware source and wire every stage
pub(crate) fn assemble(
    runtime: &dyn DspRuntime,
    config: &TunerConfig,
    sink: AudioSinkKind,
) -> Result<Assembly, TunerError> {
    let topology = Topology::derive(config)?;

    let source = runtime.open_source(&config.device_args)?;
    configure_source(source.as_ref(), config);
    let probe = runtime.power_probe(PROBE_THRESHOLD_DB, PROBE_ALPHA);

    let pipeline = runtime.top_block("fm_tuner");
    let src = pipeline.add_block(Block::Source(source.clone()))?;
    let quad_resampler = pipeline.add_block(Block::ComplexResampler {
        interpolation: topology.quadrature.interpolation,
        decimation: topology.quadrature.decimation,
        taps: topology.quadrature.complex_taps(),
    })?;
    let channel_filter = pipeline.add_block(Block::ComplexFir {
        decimation: 1,
        taps: topology.channel_taps.clone(),
    })?;
    let wfm = pipeline.add_block(Block::WfmReceiver {
        quadrature_rate: config.quadrature_rate,
        audio_decimation: config.audio_decimation,
        demod_gain: topology.demod_gain,
    })?;
    let audio_resampler = pipeline.add_block(Block::RealResampler {
        interpolation: topology.audio.interpolation,
        decimation: topology.audio.decimation,
        taps: topology.audio.taps.clone(),
    })?;
    let power = pipeline.add_block(Block::PowerProbe(probe.clone()))?;
    let audio_sink = pipeline.add_block(Block::AudioSink {
        kind: sink,
        sample_rate: topology.sink_rate,
    })?;

    pipeline.connect(src, quad_resampler)?;
    pipeline.connect(quad_resampler, channel_filter)?;
    pipeline.connect(channel_filter, wfm)?;
    pipeline.connect(channel_filter, power)?;
    pipeline.connect(wfm, audio_resampler)?;
    pipeline.connect(audio_resampler, audio_sink)?;

    info!(
        "Flow graph wired: {:.0} Hz -> {:.0} Hz quadrature -> {:.0} Hz audio ({:?} sink)",
        config.sample_rate, config.quadrature_rate, config.audio_output_rate, sink
    );

    Ok(Assembly {
        pipeline,
        source,
        probe,
        topology,
    })
}
