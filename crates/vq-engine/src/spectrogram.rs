//! Gammatone spectrogram generation
//!
//! Frames are Hann-windowed, zero-padded to a power of two, transformed with a
//! real FFT and projected onto the gammatone filterbank. The grid stores
//! per-band energy (magnitude squared), indexed `[band][frame]`.

use crate::error::{MeasureError, MeasureResult};
use crate::filterbank::GammatoneFilterbank;
use crate::signal::AudioSignal;
use num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Absolute floor for prepared grids (dB)
pub const NOISE_FLOOR_ABSOLUTE_DB: f64 = -45.0;

/// Dynamic range kept below the reference peak (dB)
pub const NOISE_FLOOR_RELATIVE_TO_PEAK_DB: f64 = 45.0;

/// Lower clamp before taking logs
const MIN_ENERGY: f64 = 1e-20;

/// Filterbank analysis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterbankParams {
    pub num_bands: usize,
    pub min_freq: f64,
    pub max_freq: f64,
    /// Window length (samples)
    pub window_len: usize,
    /// Hop length (samples)
    pub hop_len: usize,
}

/// Band x frame energy grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrogram {
    data: Vec<Vec<f64>>,
    center_freqs: Vec<f64>,
    num_frames: usize,
    hop_secs: f64,
}

impl Spectrogram {
    /// Build directly from a `[band][frame]` grid
    ///
    /// Rows shorter than the first are not accepted; the frame count is the
    /// first row's length.
    pub fn from_grid(data: Vec<Vec<f64>>, center_freqs: Vec<f64>, hop_secs: f64) -> Self {
        let num_frames = data.first().map(|row| row.len()).unwrap_or(0);
        debug_assert!(data.iter().all(|row| row.len() == num_frames));
        debug_assert_eq!(data.len(), center_freqs.len());
        Self {
            data,
            center_freqs,
            num_frames,
            hop_secs,
        }
    }

    pub fn num_bands(&self) -> usize {
        self.data.len()
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn center_freqs(&self) -> &[f64] {
        &self.center_freqs
    }

    /// Seconds between consecutive frames
    pub fn hop_secs(&self) -> f64 {
        self.hop_secs
    }

    /// One band's frame sequence
    pub fn band(&self, band: usize) -> &[f64] {
        &self.data[band]
    }

    pub fn get(&self, band: usize, frame: usize) -> f64 {
        self.data[band][frame]
    }

    pub fn max(&self) -> f64 {
        self.values().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.values().fold(f64::INFINITY, f64::min)
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().flat_map(|row| row.iter().copied())
    }

    fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            data: self
                .data
                .iter()
                .map(|row| row.iter().map(|&v| f(v)).collect())
                .collect(),
            center_freqs: self.center_freqs.clone(),
            num_frames: self.num_frames,
            hop_secs: self.hop_secs,
        }
    }

    /// Energy to decibels
    pub fn to_db(&self) -> Self {
        self.map_values(|e| 10.0 * e.max(MIN_ENERGY).log10())
    }
}

/// Comparison-ready pair of dB grids
#[derive(Debug, Clone)]
pub struct PreparedPair {
    pub reference: Spectrogram,
    pub degraded: Spectrogram,
    /// Dynamic range of the prepared reference (dB)
    pub intensity_range: f64,
}

/// Convert both spectrograms to dB, apply a shared floor and shift both so the
/// common minimum is zero.
///
/// The floor is the higher of the absolute floor and the reference peak minus
/// the relative range. Values below it are raised to it in both grids.
pub fn prepare_for_comparison(reference: &Spectrogram, degraded: &Spectrogram) -> PreparedPair {
    let ref_db = reference.to_db();
    let deg_db = degraded.to_db();

    let floor = (ref_db.max() - NOISE_FLOOR_RELATIVE_TO_PEAK_DB).max(NOISE_FLOOR_ABSOLUTE_DB);
    let ref_db = ref_db.map_values(|v| v.max(floor));
    let deg_db = deg_db.map_values(|v| v.max(floor));

    let lowest = ref_db.min().min(deg_db.min());
    let reference = ref_db.map_values(|v| v - lowest);
    let degraded = deg_db.map_values(|v| v - lowest);
    let intensity_range = reference.max() - reference.min();

    PreparedPair {
        reference,
        degraded,
        intensity_range,
    }
}

/// Gammatone spectrogram builder
pub struct SpectrogramBuilder {
    params: FilterbankParams,
    fft_size: usize,
    sample_rate: u32,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    filterbank: GammatoneFilterbank,
}

impl SpectrogramBuilder {
    /// Create builder for the given parameters
    pub fn new(params: FilterbankParams, sample_rate: u32) -> Self {
        let window_len = params.window_len.max(2);
        let fft_size = window_len.next_power_of_two();

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Hann window
        let window: Vec<f64> = (0..window_len)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / window_len as f64).cos())
            })
            .collect();

        let filterbank = GammatoneFilterbank::new(
            params.num_bands,
            params.min_freq,
            params.max_freq,
            fft_size,
            sample_rate,
        );

        Self {
            params: FilterbankParams {
                window_len,
                hop_len: params.hop_len.max(1),
                ..params
            },
            fft_size,
            sample_rate,
            fft,
            window,
            filterbank,
        }
    }

    pub fn params(&self) -> &FilterbankParams {
        &self.params
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames produced for a signal of `num_samples`
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.params.window_len {
            0
        } else {
            (num_samples - self.params.window_len) / self.params.hop_len + 1
        }
    }

    /// Build the spectrogram of a signal
    pub fn build(&self, signal: &AudioSignal) -> MeasureResult<Spectrogram> {
        if signal.is_empty() {
            return Err(MeasureError::InvalidSignal("signal is empty".into()));
        }
        if signal.len() < self.params.window_len {
            return Err(MeasureError::InvalidSignal(format!(
                "signal has {} samples, shorter than one analysis window of {}",
                signal.len(),
                self.params.window_len
            )));
        }

        let num_frames = self.num_frames(signal.len());
        let num_bands = self.filterbank.num_bands();
        let num_bins = self.fft_size / 2 + 1;
        let window_len = self.params.window_len;

        let mut input = vec![0.0f64; self.fft_size];
        let mut spectrum = vec![Complex64::new(0.0, 0.0); num_bins];
        let mut power = vec![0.0f64; num_bins];
        let mut energies = vec![0.0f64; num_bands];
        let mut data = vec![Vec::with_capacity(num_frames); num_bands];

        let normalization = 2.0 / window_len as f64;

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.params.hop_len;
            let frame = &signal.samples[start..start + window_len];

            // Window, zero-pad the tail
            for (slot, (&sample, &w)) in input.iter_mut().zip(frame.iter().zip(&self.window)) {
                *slot = sample * w;
            }
            input[window_len..].fill(0.0);

            self.fft
                .process(&mut input, &mut spectrum)
                .map_err(|e| MeasureError::InvalidSignal(format!("FFT failed: {}", e)))?;

            for (p, bin) in power.iter_mut().zip(&spectrum) {
                let mag = bin.norm() * normalization;
                *p = mag * mag;
            }

            self.filterbank.apply(&power, &mut energies);
            for (row, &energy) in data.iter_mut().zip(&energies) {
                row.push(energy);
            }
        }

        Ok(Spectrogram {
            data,
            center_freqs: self.filterbank.center_freqs().to_vec(),
            num_frames,
            hop_secs: self.params.hop_len as f64 / self.sample_rate as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FilterbankParams {
        FilterbankParams {
            num_bands: 32,
            min_freq: 50.0,
            max_freq: 15000.0,
            window_len: 3840,
            hop_len: 1920,
        }
    }

    fn sine(freq: f64, secs: f64, sample_rate: u32) -> AudioSignal {
        let n = (secs * sample_rate as f64) as usize;
        let samples = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin())
            .collect();
        AudioSignal::new(samples, sample_rate)
    }

    #[test]
    fn test_grid_shape() {
        let builder = SpectrogramBuilder::new(params(), 48000);
        assert_eq!(builder.fft_size(), 4096);

        let spec = builder.build(&sine(1000.0, 1.0, 48000)).unwrap();
        assert_eq!(spec.num_bands(), 32);
        // (48000 - 3840) / 1920 + 1
        assert_eq!(spec.num_frames(), 24);
        assert!((spec.hop_secs() - 0.04).abs() < 1e-12);
        assert!(spec.min() >= 0.0);
    }

    #[test]
    fn test_tone_energy_in_matching_band() {
        let builder = SpectrogramBuilder::new(params(), 48000);
        let spec = builder.build(&sine(1000.0, 0.5, 48000)).unwrap();

        let loudest = (0..spec.num_bands())
            .max_by(|&a, &b| spec.get(a, 3).partial_cmp(&spec.get(b, 3)).unwrap())
            .unwrap();
        let center = spec.center_freqs()[loudest];
        assert!((center - 1000.0).abs() < 150.0, "loudest band at {} Hz", center);
    }

    #[test]
    fn test_rejects_short_and_empty_signals() {
        let builder = SpectrogramBuilder::new(params(), 48000);
        let empty = AudioSignal::new(Vec::new(), 48000);
        assert!(matches!(builder.build(&empty), Err(MeasureError::InvalidSignal(_))));

        let short = AudioSignal::new(vec![0.1; 3839], 48000);
        assert!(matches!(builder.build(&short), Err(MeasureError::InvalidSignal(_))));

        let exact = AudioSignal::new(vec![0.1; 3840], 48000);
        assert_eq!(builder.build(&exact).unwrap().num_frames(), 1);
    }

    #[test]
    fn test_prepare_for_comparison_is_non_negative() {
        let builder = SpectrogramBuilder::new(params(), 48000);
        let reference = builder.build(&sine(440.0, 0.5, 48000)).unwrap();
        let quiet: AudioSignal = {
            let s = sine(440.0, 0.5, 48000);
            AudioSignal::new(s.samples.iter().map(|v| v * 0.1).collect(), 48000)
        };
        let degraded = builder.build(&quiet).unwrap();

        let prepared = prepare_for_comparison(&reference, &degraded);
        assert!(prepared.reference.min() >= 0.0);
        assert!(prepared.degraded.min() >= 0.0);
        assert!(prepared.intensity_range > 0.0);
        assert!(prepared.intensity_range <= NOISE_FLOOR_RELATIVE_TO_PEAK_DB + 1e-9);
    }
}
