//! Windowed-sinc FIR tap design
//!
//! Only the tap design lives here; filtering itself runs inside the DSP
//! runtime. Filters are sized from the window's stopband attenuation `A`:
//!
//! ntaps = A * fs / (22 * transition_width), forced odd

use std::f64::consts::PI;

use crate::error::TunerError;

/// Kaiser shape parameter used by the resampler designs
pub const KAISER_BETA: f64 = 7.0;

/// Window applied to the ideal sinc response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    Hamming,
    Kaiser { beta: f64 },
}

impl Window {
    /// Stopband attenuation in dB
    pub fn max_attenuation(&self) -> f64 {
        match self {
            Window::Hamming => 53.0,
            Window::Kaiser { beta } => beta / 0.1102 + 8.7,
        }
    }

    pub fn build(&self, ntaps: usize) -> Vec<f64> {
        match *self {
            Window::Hamming => hamming(ntaps),
            Window::Kaiser { beta } => kaiser(ntaps, beta),
        }
    }
}

/// Number of taps needed for the requested transition width (always odd)
pub fn compute_ntaps(sampling_freq: f64, transition_width: f64, window: Window) -> usize {
    let a = window.max_attenuation();
    let ntaps = (a * sampling_freq / (22.0 * transition_width)) as usize;
    ntaps | 1
}

/// Zeroth-order modified Bessel function of the first kind
fn bessel_i0(x: f64) -> f64 {
    let half_x = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut n = 1.0;
    loop {
        let t = half_x / n;
        term *= t * t;
        sum += term;
        n += 1.0;
        if term < 1e-21 * sum {
            break;
        }
    }
    sum
}

/// Hamming window of `ntaps` points
pub fn hamming(ntaps: usize) -> Vec<f64> {
    if ntaps <= 1 {
        return vec![1.0; ntaps];
    }
    let m = (ntaps - 1) as f64;
    (0..ntaps)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / m).cos())
        .collect()
}

/// Kaiser window of `ntaps` points
pub fn kaiser(ntaps: usize, beta: f64) -> Vec<f64> {
    if ntaps <= 1 {
        return vec![1.0; ntaps];
    }
    let inv_i0_beta = 1.0 / bessel_i0(beta);
    let inv_nm1 = 1.0 / (ntaps - 1) as f64;
    (0..ntaps)
        .map(|i| {
            let t = 2.0 * i as f64 * inv_nm1 - 1.0;
            bessel_i0(beta * (1.0 - t * t).max(0.0).sqrt()) * inv_i0_beta
        })
        .collect()
}

/// Design a windowed low-pass filter
///
/// Taps are normalised so the DC response equals `gain`.
pub fn low_pass(
    gain: f64,
    sampling_freq: f64,
    cutoff_freq: f64,
    transition_width: f64,
    window: Window,
) -> Result<Vec<f32>, TunerError> {
    if !(sampling_freq > 0.0) {
        return Err(TunerError::config(format!(
            "sampling frequency must be positive, got {}",
            sampling_freq
        )));
    }
    if !(cutoff_freq > 0.0) || cutoff_freq > sampling_freq / 2.0 {
        return Err(TunerError::config(format!(
            "cutoff {} outside (0, {}]",
            cutoff_freq,
            sampling_freq / 2.0
        )));
    }
    if !(transition_width > 0.0) {
        return Err(TunerError::config(format!(
            "transition width must be positive, got {}",
            transition_width
        )));
    }
    if let Window::Kaiser { beta } = window {
        if beta < 0.0 {
            return Err(TunerError::config(format!("negative Kaiser beta {}", beta)));
        }
    }

    let ntaps = compute_ntaps(sampling_freq, transition_width, window);
    let window = window.build(ntaps);
    let m = (ntaps / 2) as i64;
    let fw_t0 = 2.0 * PI * cutoff_freq / sampling_freq;

    let mut taps: Vec<f64> = (-m..=m)
        .zip(window.iter())
        .map(|(n, w)| {
            if n == 0 {
                fw_t0 / PI * w
            } else {
                let n = n as f64;
                (n * fw_t0).sin() / (n * PI) * w
            }
        })
        .collect();

    let dc: f64 = taps.iter().sum();
    if dc == 0.0 || !dc.is_finite() {
        return Err(TunerError::config("low-pass design has no DC response"));
    }
    let scale = gain / dc;
    for tap in &mut taps {
        *tap *= scale;
    }

    Ok(taps.into_iter().map(|t| t as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KAISER: Window = Window::Kaiser { beta: KAISER_BETA };

    #[test]
    fn test_ntaps_is_odd() {
        assert_eq!(compute_ntaps(2e6, 1e6, KAISER), 7);
        assert_eq!(compute_ntaps(2e6, 1e6, Window::Hamming), 5);
        assert_eq!(compute_ntaps(1.0, 0.025, KAISER), 131);
        for tw in [0.01, 0.02, 0.05, 0.1] {
            assert_eq!(compute_ntaps(1.0, tw, KAISER) % 2, 1);
        }
    }

    #[test]
    fn test_kaiser_window_shape() {
        let w = kaiser(9, KAISER_BETA);
        assert!((w[4] - 1.0).abs() < 1e-12, "Center should be unity");
        assert!((w[0] - w[8]).abs() < 1e-12, "Window should be symmetric");
        assert!(w[0] < w[2] && w[2] < w[4]);

        let h = hamming(5);
        assert!((h[0] - 0.08).abs() < 1e-12);
        assert!((h[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_low_pass_unity_dc_gain() {
        let taps = low_pass(1.0, 2e6, 100e3, 1e6, KAISER).unwrap();
        assert_eq!(taps.len(), 7);
        let dc: f32 = taps.iter().sum();
        assert!((dc - 1.0).abs() < 1e-5);
        // Linear phase
        assert!((taps[0] - taps[6]).abs() < 1e-7);
    }

    #[test]
    fn test_low_pass_scaled_gain() {
        let taps = low_pass(24.0, 24.0, 0.018, 0.004, KAISER).unwrap();
        let dc: f64 = taps.iter().map(|&t| t as f64).sum();
        assert!((dc - 24.0).abs() < 1e-2);
        assert_eq!(taps.len() % 2, 1);
    }

    #[test]
    fn test_low_pass_rejects_bad_parameters() {
        assert!(low_pass(1.0, 1.0, 0.0, 0.1, KAISER).is_err());
        assert!(low_pass(1.0, 1.0, 0.6, 0.1, KAISER).is_err());
        assert!(low_pass(1.0, 1.0, 0.2, 0.0, KAISER).is_err());
        assert!(low_pass(1.0, 0.0, 0.2, 0.1, KAISER).is_err());
        assert!(low_pass(1.0, 1.0, 0.2, 0.1, Window::Kaiser { beta: -1.0 }).is_err());
        assert!(low_pass(1.0, 1.0, 0.2, 0.1, Window::Hamming).is_ok());
    }
}
