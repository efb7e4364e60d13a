//! ERB-spaced gammatone filterbank applied in the frequency domain
//!
//! Each band is the power response of a 4th-order gammatone filter
//! (bandwidth 1.019 ERB) sampled at the FFT bin frequencies. Band centers are
//! equally spaced on the Glasberg & Moore ERB-rate scale.

/// Gammatone filter order
const GAMMATONE_ORDER: i32 = 4;

/// Bandwidth factor relative to ERB for a 4th-order gammatone
const ERB_BANDWIDTH_FACTOR: f64 = 1.019;

/// Weights below this are dropped from a band's bin range
const WEIGHT_CUTOFF: f64 = 1e-10;

/// Equivalent rectangular bandwidth (Hz) at `freq`
pub fn erb(freq: f64) -> f64 {
    24.7 * (4.37e-3 * freq + 1.0)
}

/// ERB-rate (number of ERBs below `freq`)
pub fn hz_to_erb_rate(freq: f64) -> f64 {
    21.4 * (4.37e-3 * freq + 1.0).log10()
}

/// Inverse of [`hz_to_erb_rate`]
pub fn erb_rate_to_hz(rate: f64) -> f64 {
    (10.0_f64.powf(rate / 21.4) - 1.0) / 4.37e-3
}

/// Ascending band center frequencies, equally spaced in ERB-rate
pub fn erb_space(min_freq: f64, max_freq: f64, num_bands: usize) -> Vec<f64> {
    match num_bands {
        0 => Vec::new(),
        1 => vec![min_freq],
        n => {
            let lo = hz_to_erb_rate(min_freq);
            let hi = hz_to_erb_rate(max_freq);
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| erb_rate_to_hz(lo + step * i as f64)).collect()
        }
    }
}

/// Power response of one gammatone band at `freq`
pub fn gammatone_power(freq: f64, center: f64) -> f64 {
    let bandwidth = ERB_BANDWIDTH_FACTOR * erb(center);
    let x = (freq - center) / bandwidth;
    (1.0 + x * x).powi(-GAMMATONE_ORDER)
}

/// One band's non-negligible bin weights
#[derive(Debug, Clone)]
struct BandWeights {
    first_bin: usize,
    weights: Vec<f64>,
}

/// Gammatone filterbank sampled on an FFT grid
#[derive(Debug, Clone)]
pub struct GammatoneFilterbank {
    center_freqs: Vec<f64>,
    bands: Vec<BandWeights>,
    num_bins: usize,
}

impl GammatoneFilterbank {
    /// Build for an FFT of `fft_size` points at `sample_rate`
    pub fn new(
        num_bands: usize,
        min_freq: f64,
        max_freq: f64,
        fft_size: usize,
        sample_rate: u32,
    ) -> Self {
        let center_freqs = erb_space(min_freq, max_freq, num_bands);
        let num_bins = fft_size / 2 + 1;
        let bin_hz = sample_rate as f64 / fft_size as f64;

        let bands = center_freqs
            .iter()
            .map(|&center| {
                let full: Vec<f64> = (0..num_bins)
                    .map(|bin| gammatone_power(bin as f64 * bin_hz, center))
                    .collect();
                let first = full.iter().position(|&w| w > WEIGHT_CUTOFF).unwrap_or(0);
                let last = full
                    .iter()
                    .rposition(|&w| w > WEIGHT_CUTOFF)
                    .unwrap_or(first);
                BandWeights {
                    first_bin: first,
                    weights: full[first..=last].to_vec(),
                }
            })
            .collect();

        Self {
            center_freqs,
            bands,
            num_bins,
        }
    }

    pub fn num_bands(&self) -> usize {
        self.center_freqs.len()
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn center_freqs(&self) -> &[f64] {
        &self.center_freqs
    }

    /// Per-band energy of one power spectrum frame, written into `out`
    pub fn apply(&self, power: &[f64], out: &mut [f64]) {
        debug_assert_eq!(power.len(), self.num_bins);
        for (band, slot) in self.bands.iter().zip(out.iter_mut()) {
            let bins = &power[band.first_bin..band.first_bin + band.weights.len()];
            *slot = bins
                .iter()
                .zip(&band.weights)
                .map(|(p, w)| p * w)
                .sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_erb_rate_inverse() {
        for freq in [50.0, 440.0, 1000.0, 8000.0, 15000.0] {
            assert_relative_eq!(erb_rate_to_hz(hz_to_erb_rate(freq)), freq, max_relative = 1e-10);
        }
        assert_relative_eq!(erb(1000.0), 132.639, epsilon = 1e-3);
    }

    #[test]
    fn test_erb_space_is_perceptual() {
        let centers = erb_space(50.0, 15000.0, 32);
        assert_eq!(centers.len(), 32);
        assert_relative_eq!(centers[0], 50.0, epsilon = 1e-9);
        assert_relative_eq!(centers[31], 15000.0, epsilon = 1e-6);

        // Spacing grows with frequency
        let low_gap = centers[1] - centers[0];
        let high_gap = centers[31] - centers[30];
        assert!(high_gap > 10.0 * low_gap);
    }

    #[test]
    fn test_gammatone_peak_at_center() {
        assert_eq!(gammatone_power(1000.0, 1000.0), 1.0);
        assert!(gammatone_power(1100.0, 1000.0) < 1.0);
        assert!(gammatone_power(2000.0, 1000.0) < 1e-3);
    }

    #[test]
    fn test_filterbank_routes_tone_to_nearest_band() {
        let fb = GammatoneFilterbank::new(16, 100.0, 8000.0, 2048, 48000);
        let bin_hz: f64 = 48000.0 / 2048.0;
        let mut power = vec![0.0; fb.num_bins()];
        let tone_bin = (1000.0 / bin_hz).round() as usize;
        power[tone_bin] = 1.0;

        let mut energies = vec![0.0; fb.num_bands()];
        fb.apply(&power, &mut energies);

        let loudest = energies
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let nearest = fb
            .center_freqs()
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - tone_bin as f64 * bin_hz)
                    .abs()
                    .partial_cmp(&(*b - tone_bin as f64 * bin_hz).abs())
                    .unwrap()
            })
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, nearest);
    }
}
