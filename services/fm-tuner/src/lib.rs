//! FM Tuner - control layer for an RTL-SDR broadcast FM receiver
//!
//! Derives the resampling and filtering parameters of the receive chain,
//! wires it up on an external streaming DSP runtime, tunes the front-end
//! and sweeps the FM band for active stations.

pub mod config;
pub mod dsp;
pub mod error;
pub mod ffi;
pub mod runtime;
pub mod tuner;

pub use config::{ScanSettings, TunerConfig, MAX_STATIONS};
pub use error::{RuntimeError, TunerError};
pub use runtime::{AudioSinkKind, DspRuntime};
pub use tuner::{ScanReport, TunerContext};
