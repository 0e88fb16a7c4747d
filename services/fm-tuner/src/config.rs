//! Configuration loaded from environment variables

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TunerError;

/// Maximum number of stations a single sweep can record
pub const MAX_STATIONS: usize = 100;

/// Tuner and flow graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Device arguments passed to the hardware source
    pub device_args: String,

    /// Hardware sample rate in Hz
    pub sample_rate: f64,

    /// Intermediate (quadrature) rate in Hz fed to the demodulator
    pub quadrature_rate: f64,

    /// Decimation applied inside the FM receiver
    pub audio_decimation: u32,

    /// Maximum FM deviation in Hz
    pub max_deviation: f64,

    /// Rate produced by the audio resampler in Hz
    pub audio_output_rate: f64,

    /// Rate the audio device is opened at in Hz
    pub audio_sink_rate: u32,

    /// Channel filter cutoff in Hz
    pub channel_cutoff: f64,

    /// Channel filter transition width in Hz
    pub channel_transition: f64,

    /// Frequency tuned at construction, in MHz
    pub initial_freq_mhz: f64,

    /// RF, IF and baseband gain in dB
    pub gain_db: f64,

    /// PPM frequency correction
    pub ppm_error: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            device_args: "numchan=1 rtl=0".to_string(),
            sample_rate: 2e6,
            quadrature_rate: 500e3,
            audio_decimation: 10,
            max_deviation: 75e3,
            audio_output_rate: 48e3,
            audio_sink_rate: 44_100,
            channel_cutoff: 100e3,
            channel_transition: 1e6,
            initial_freq_mhz: 101.9,
            gain_db: 20.0,
            ppm_error: 0.0,
        }
    }
}

impl TunerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            device_args: std::env::var("FM_DEVICE_ARGS").unwrap_or(defaults.device_args),
            sample_rate: env_or("FM_SAMPLE_RATE", defaults.sample_rate),
            quadrature_rate: env_or("FM_QUADRATURE_RATE", defaults.quadrature_rate),
            audio_decimation: env_or("FM_AUDIO_DECIMATION", defaults.audio_decimation),
            max_deviation: env_or("FM_MAX_DEVIATION", defaults.max_deviation),
            audio_output_rate: env_or("FM_AUDIO_OUTPUT_RATE", defaults.audio_output_rate),
            audio_sink_rate: env_or("FM_AUDIO_SINK_RATE", defaults.audio_sink_rate),
            channel_cutoff: defaults.channel_cutoff,
            channel_transition: defaults.channel_transition,
            initial_freq_mhz: env_or("FM_INITIAL_FREQ_MHZ", defaults.initial_freq_mhz),
            gain_db: env_or("FM_GAIN_DB", defaults.gain_db),
            ppm_error: env_or("FM_PPM_ERROR", defaults.ppm_error),
        }
    }

    /// Rate at the FM receiver output in Hz
    pub fn demod_rate(&self) -> f64 {
        self.quadrature_rate / self.audio_decimation as f64
    }
}

/// Band sweep parameters used by the station scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub step_mhz: f64,

    /// Wait after retuning before measuring
    pub settle: Duration,

    /// Wall-clock window the probe is sampled for at each step
    pub measure: Duration,

    /// Mean power a candidate must exceed to count as a station
    pub threshold: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            start_mhz: 87.9,
            stop_mhz: 107.9,
            step_mhz: 0.2,
            settle: Duration::from_millis(1000),
            measure: Duration::from_millis(200),
            threshold: 2e-4,
        }
    }
}

impl ScanSettings {
    /// Load sweep timing overrides from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            settle: Duration::from_millis(env_or(
                "FM_SCAN_SETTLE_MS",
                defaults.settle.as_millis() as u64,
            )),
            measure: Duration::from_millis(env_or(
                "FM_SCAN_MEASURE_MS",
                defaults.measure.as_millis() as u64,
            )),
            threshold: env_or("FM_SCAN_THRESHOLD", defaults.threshold),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), TunerError> {
        if !(self.step_mhz > 0.0) {
            return Err(TunerError::config(format!(
                "scan step must be positive, got {} MHz",
                self.step_mhz
            )));
        }
        if !(self.stop_mhz >= self.start_mhz) || !(self.start_mhz > 0.0) {
            return Err(TunerError::config(format!(
                "invalid scan band {}-{} MHz",
                self.start_mhz, self.stop_mhz
            )));
        }
        Ok(())
    }

    /// Candidate frequencies in ascending order, both band edges included
    pub fn candidates(&self) -> impl Iterator<Item = f64> + '_ {
        let steps = ((self.stop_mhz - self.start_mhz) / self.step_mhz + 1e-9).floor() as u32;
        // Snap to 1 kHz so accumulated step error never leaks into reported frequencies
        (0..=steps).map(move |i| {
            let freq = self.start_mhz + i as f64 * self.step_mhz;
            (freq * 1e3).round() / 1e3
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sweep_covers_band() {
        let scan = ScanSettings::default();
        let freqs: Vec<f64> = scan.candidates().collect();

        assert_eq!(freqs.len(), 101);
        assert_eq!(freqs[0], 87.9);
        assert_eq!(*freqs.last().unwrap(), 107.9);
        assert!(freqs.contains(&101.1));
        assert!(freqs.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_scan_settings_validation() {
        assert!(ScanSettings::default().validate().is_ok());

        let zero_step = ScanSettings { step_mhz: 0.0, ..ScanSettings::default() };
        assert!(zero_step.validate().is_err());

        let reversed = ScanSettings { start_mhz: 108.0, stop_mhz: 88.0, ..ScanSettings::default() };
        assert!(reversed.validate().is_err());
    }

    #[test]
    fn test_demod_rate() {
        let config = TunerConfig::default();
        assert_eq!(config.demod_rate(), 50_000.0);
    }
}
