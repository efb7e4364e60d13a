//! Global alignment by FFT cross-correlation
//!
//! Removes the bulk delay between reference and degraded signals before the
//! bounded per-patch search runs. A positive lag means the degraded signal
//! leads the reference.

use crate::signal::AudioSignal;
use num_complex::Complex64;
use realfft::RealFftPlanner;

/// Lag (samples) maximising `r[k] = Σ a[n + k] · b[n]`
///
/// Lags range over `±(max(len) - 1)`; the most negative lag wins ties.
pub fn best_lag(a: &[f64], b: &[f64]) -> i64 {
    best_lag_with_peak(a, b).0
}

fn best_lag_with_peak(a: &[f64], b: &[f64]) -> (i64, f64) {
    let n = a.len().max(b.len());
    if n == 0 {
        return (0, 0.0);
    }
    let max_lag = n - 1;
    let corrs = cross_correlation(a, b);
    let fft_points = corrs.len();

    // Negative lags sit at the end of the circular result
    let negatives = corrs[fft_points - max_lag..].iter();
    let positives = corrs[..=max_lag].iter();

    let mut best_index = 0usize;
    let mut best_value = f64::NEG_INFINITY;
    for (index, &value) in negatives.chain(positives).enumerate() {
        if value > best_value {
            best_value = value;
            best_index = index;
        }
    }
    (best_index as i64 - max_lag as i64, best_value)
}

/// Circular cross-correlation over `next_pow2(2n - 1)` points
fn cross_correlation(a: &[f64], b: &[f64]) -> Vec<f64> {
    let n = a.len().max(b.len());
    let fft_points = (2 * n - 1).next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_points);
    let inverse = planner.plan_fft_inverse(fft_points);

    let mut buf_a = vec![0.0; fft_points];
    buf_a[..a.len()].copy_from_slice(a);
    let mut buf_b = vec![0.0; fft_points];
    buf_b[..b.len()].copy_from_slice(b);

    let mut spec_a = forward.make_output_vec();
    let mut spec_b = forward.make_output_vec();
    // Buffer lengths always match the plan
    forward.process(&mut buf_a, &mut spec_a).ok();
    forward.process(&mut buf_b, &mut spec_b).ok();

    let mut product: Vec<Complex64> = spec_a
        .iter()
        .zip(&spec_b)
        .map(|(x, y)| x * y.conj())
        .collect();
    // c2r requires real DC and Nyquist bins
    if let Some(first) = product.first_mut() {
        first.im = 0.0;
    }
    if let Some(last) = product.last_mut() {
        last.im = 0.0;
    }

    let mut out = inverse.make_output_vec();
    inverse.process(&mut product, &mut out).ok();

    let scale = 1.0 / fft_points as f64;
    out.iter_mut().for_each(|v| *v *= scale);
    out
}

/// Shift the degraded signal by the best lag
///
/// Positive lag: zeros are prepended. Negative lag: leading samples are
/// dropped. Returns the shifted signal and the lag in samples. Signals with
/// no positive correlation at any lag (silence) are left unshifted.
pub fn globally_align(reference: &AudioSignal, degraded: &AudioSignal) -> (AudioSignal, i64) {
    let (lag, peak) = best_lag_with_peak(&reference.samples, &degraded.samples);
    let lag = if peak > 0.0 && peak.is_finite() { lag } else { 0 };
    let samples = if lag > 0 {
        let mut shifted = vec![0.0; lag as usize];
        shifted.extend_from_slice(&degraded.samples);
        shifted
    } else {
        let skip = (lag.unsigned_abs() as usize).min(degraded.samples.len());
        degraded.samples[skip..].to_vec()
    };
    (AudioSignal::new(samples, degraded.sample_rate), lag)
}

/// Globally align, then cut both signals to their common aligned span
pub fn align_and_truncate(
    reference: &AudioSignal,
    degraded: &AudioSignal,
) -> (AudioSignal, AudioSignal, i64) {
    let (aligned, lag) = globally_align(reference, degraded);

    let (mut ref_samples, mut deg_samples) = if lag > 0 {
        // Drop the span the degraded signal never covered
        let skip = (lag as usize).min(reference.samples.len());
        (
            reference.samples[skip..].to_vec(),
            aligned.samples[skip..].to_vec(),
        )
    } else {
        (reference.samples.clone(), aligned.samples)
    };

    let common = ref_samples.len().min(deg_samples.len());
    ref_samples.truncate(common);
    deg_samples.truncate(common);

    (
        AudioSignal::new(ref_samples, reference.sample_rate),
        AudioSignal::new(deg_samples, degraded.sample_rate),
        lag,
    )
}
