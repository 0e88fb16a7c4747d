//! Rational resampler parameter derivation

use num_complex::Complex32;
use serde::Serialize;

use super::firdes::{self, Window, KAISER_BETA};
use crate::error::TunerError;

/// Passband edge as a fraction of the output Nyquist band
pub const FRACTIONAL_BW: f64 = 0.4;

const HALFBAND: f64 = 0.5;

/// Derived parameters for one rational resampler stage
#[derive(Debug, Clone, Serialize)]
pub struct ResamplerDesign {
    /// Interpolation handed to the resampler (before reduction)
    pub interpolation: u32,
    /// Decimation handed to the resampler (before reduction)
    pub decimation: u32,
    pub reduced_interpolation: u32,
    pub reduced_decimation: u32,
    pub transition_width: f64,
    pub mid_transition_band: f64,
    pub taps: Vec<f32>,
}

impl ResamplerDesign {
    /// Derive the anti-aliasing filter for an `interpolation / decimation`
    /// resampler. Both factors are reduced by `divisor` (floored) to keep
    /// the tap count tractable before the filter is designed.
    pub fn derive(interpolation: u32, decimation: u32, divisor: u32) -> Result<Self, TunerError> {
        if interpolation == 0 || decimation == 0 {
            return Err(TunerError::config(format!(
                "resampler factors must be positive (interpolation {}, decimation {})",
                interpolation, decimation
            )));
        }
        if divisor == 0 {
            return Err(TunerError::config("resampler divisor must be positive"));
        }

        let reduced_interpolation = interpolation / divisor;
        let reduced_decimation = decimation / divisor;
        if reduced_interpolation == 0 || reduced_decimation == 0 {
            return Err(TunerError::config(format!(
                "divisor {} reduces {}/{} to zero",
                divisor, interpolation, decimation
            )));
        }

        let rate = 1.0 / reduced_decimation as f64;
        let (transition_width, mid_transition_band) = if rate >= 1.0 {
            let tw = HALFBAND - FRACTIONAL_BW;
            (tw, HALFBAND - tw / 2.0)
        } else {
            let tw = rate * (HALFBAND - FRACTIONAL_BW);
            (tw, rate * HALFBAND - tw / 2.0)
        };

        let gain = reduced_interpolation as f64;
        let taps = firdes::low_pass(
            gain,
            gain,
            mid_transition_band,
            transition_width,
            Window::Kaiser { beta: KAISER_BETA },
        )?;
        if taps.is_empty() {
            return Err(TunerError::config("resampler filter design produced no taps"));
        }

        Ok(Self {
            interpolation,
            decimation,
            reduced_interpolation,
            reduced_decimation,
            transition_width,
            mid_transition_band,
            taps,
        })
    }

    /// Taps promoted to complex values for quadrature resamplers
    pub fn complex_taps(&self) -> Vec<Complex32> {
        self.taps.iter().map(|&t| Complex32::new(t, 0.0)).collect()
    }
}
