//! Boundary to the streaming DSP runtime and the hardware front-end
//!
//! The tuner core never moves samples itself. It asks a [`DspRuntime`] for
//! a hardware source, a power probe and an empty [`FlowGraph`], configures
//! the remaining stages through [`Block`] descriptions and wires them up.

pub mod sim;

use std::fmt;
use std::sync::Arc;

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Audio output device selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum AudioSinkKind {
    /// The platform's default audio device
    System = 0,
    /// Samples are consumed and dropped
    Discard = 1,
}

impl TryFrom<u32> for AudioSinkKind {
    type Error = RuntimeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AudioSinkKind::System),
            1 => Ok(AudioSinkKind::Discard),
            other => Err(RuntimeError::Other(format!("unknown audio sink kind {}", other))),
        }
    }
}

/// Hardware-facing input stage
///
/// Implementations synchronise internally; every method may be called
/// while the flow graph is running.
pub trait SignalSource: Send + Sync {
    /// Request a new center frequency, returning the frequency actually tuned
    fn set_center_freq(&self, hz: f64) -> f64;
    fn center_freq(&self) -> f64;

    fn set_sample_rate(&self, hz: f64) -> f64;
    fn set_freq_corr(&self, ppm: f64);
    /// 0 = off, 1 = manual, 2 = automatic
    fn set_dc_offset_mode(&self, mode: u32);
    /// 0 = off, 1 = manual, 2 = automatic
    fn set_iq_balance_mode(&self, mode: u32);
    fn set_gain_mode(&self, automatic: bool);
    fn set_gain(&self, db: f64);
    fn set_if_gain(&self, db: f64);
    fn set_bb_gain(&self, db: f64);
    fn set_antenna(&self, name: &str);
    /// 0 selects the driver's automatic bandwidth
    fn set_bandwidth(&self, hz: f64);
}

/// Running average-magnitude-squared measurement of a complex stream
pub trait PowerProbe: Send + Sync {
    fn level(&self) -> f64;
}

/// Handle to a block inside one flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// Stage configurations the tuner asks the runtime to instantiate
pub enum Block {
    Source(Arc<dyn SignalSource>),
    ComplexResampler {
        interpolation: u32,
        decimation: u32,
        taps: Vec<Complex32>,
    },
    ComplexFir {
        decimation: u32,
        taps: Vec<f32>,
    },
    WfmReceiver {
        quadrature_rate: f64,
        audio_decimation: u32,
        demod_gain: f64,
    },
    RealResampler {
        interpolation: u32,
        decimation: u32,
        taps: Vec<f32>,
    },
    PowerProbe(Arc<dyn PowerProbe>),
    AudioSink {
        kind: AudioSinkKind,
        sample_rate: u32,
    },
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Source(_) => "source",
            Block::ComplexResampler { .. } => "complex_resampler",
            Block::ComplexFir { .. } => "complex_fir",
            Block::WfmReceiver { .. } => "wfm_receiver",
            Block::RealResampler { .. } => "real_resampler",
            Block::PowerProbe(_) => "power_probe",
            Block::AudioSink { .. } => "audio_sink",
        }
    }

    /// Whether the block produces an output stream
    pub fn has_output(&self) -> bool {
        !matches!(self, Block::PowerProbe(_) | Block::AudioSink { .. })
    }

    /// Whether the block consumes an input stream
    pub fn has_input(&self) -> bool {
        !matches!(self, Block::Source(_))
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::ComplexResampler { interpolation, decimation, taps } => write!(
                f,
                "{}({}/{}, {} taps)",
                self.kind(),
                interpolation,
                decimation,
                taps.len()
            ),
            Block::RealResampler { interpolation, decimation, taps } => write!(
                f,
                "{}({}/{}, {} taps)",
                self.kind(),
                interpolation,
                decimation,
                taps.len()
            ),
            Block::ComplexFir { decimation, taps } => {
                write!(f, "{}(decim {}, {} taps)", self.kind(), decimation, taps.len())
            }
            Block::WfmReceiver { quadrature_rate, audio_decimation, demod_gain } => write!(
                f,
                "{}({} Hz / {}, gain {:.4})",
                self.kind(),
                quadrature_rate,
                audio_decimation,
                demod_gain
            ),
            Block::AudioSink { kind, sample_rate } => {
                write!(f, "{}({:?}, {} Hz)", self.kind(), kind, sample_rate)
            }
            Block::Source(_) | Block::PowerProbe(_) => f.write_str(self.kind()),
        }
    }
}

/// Top-level flow graph owned by a tuner context
///
/// `start` launches the runtime's scheduler threads and returns; `wait`
/// blocks until the graph halts. `stop` may be called from any thread and
/// releases a pending `wait`.
pub trait FlowGraph: Send + Sync {
    fn add_block(&self, block: Block) -> Result<BlockId, RuntimeError>;
    /// Connect output port 0 of `src` to input port 0 of `dst`
    fn connect(&self, src: BlockId, dst: BlockId) -> Result<(), RuntimeError>;
    fn start(&self) -> Result<(), RuntimeError>;
    fn wait(&self);
    fn stop(&self);
}

/// Factory for the stages that the tuner keeps handles to
pub trait DspRuntime: Send + Sync {
    /// Open the hardware source described by `args`
    fn open_source(&self, args: &str) -> Result<Arc<dyn SignalSource>, RuntimeError>;
    fn power_probe(&self, threshold_db: f64, alpha: f64) -> Arc<dyn PowerProbe>;
    fn top_block(&self, name: &str) -> Box<dyn FlowGraph>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_kind_from_u32() {
        assert_eq!(AudioSinkKind::try_from(0).unwrap(), AudioSinkKind::System);
        assert_eq!(AudioSinkKind::try_from(1).unwrap(), AudioSinkKind::Discard);
        assert!(AudioSinkKind::try_from(7).is_err());
    }

    #[test]
    fn test_block_ports() {
        let sink = Block::AudioSink { kind: AudioSinkKind::Discard, sample_rate: 44_100 };
        assert!(sink.has_input());
        assert!(!sink.has_output());

        let fir = Block::ComplexFir { decimation: 1, taps: vec![1.0] };
        assert!(fir.has_input() && fir.has_output());
        assert_eq!(format!("{:?}", fir), "complex_fir(decim 1, 1 taps)");
    }
}
