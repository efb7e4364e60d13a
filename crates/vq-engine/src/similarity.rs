//! Neurogram similarity (NSIM) between aligned patches
//!
//! SSIM adapted to spectrogram patches: local statistics come from a 3x3
//! Gaussian window over (band, frame) with zero padding at the patch edges.
//! The similarity map is the product of an intensity term and a structure
//! term; the contrast term of SSIM is folded into structure.

use crate::patch::Patch;
use serde::{Deserialize, Serialize};

/// Gaussian window standard deviation (cells)
const WINDOW_SIGMA: f64 = 0.5;

/// Stabilisation constants relative to the intensity range
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Intensity ranges below this (dB) are treated as this
const MIN_INTENSITY_RANGE: f64 = 1.0;

/// Similarity of one aligned patch pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSimilarity {
    /// Mean similarity per band, in [-1, 1]
    pub band_similarity: Vec<f64>,

    /// Mean over all bands and frames
    pub similarity: f64,
}

/// NSIM scorer for a fixed intensity range
#[derive(Debug, Clone)]
pub struct NsimScorer {
    window: [[f64; 3]; 3],
    c1: f64,
    c2: f64,
}

/// Local weighted moments at one cell
struct LocalStats {
    mu_r: f64,
    mu_d: f64,
    var_r: f64,
    var_d: f64,
    cov: f64,
}

impl NsimScorer {
    /// `intensity_range` is the dynamic range of the prepared reference grid
    pub fn new(intensity_range: f64) -> Self {
        let range = intensity_range.max(MIN_INTENSITY_RANGE);
        Self {
            window: gaussian_window(),
            c1: (K1 * range).powi(2),
            c2: (K2 * range).powi(2) / 2.0,
        }
    }

    pub fn c1(&self) -> f64 {
        self.c1
    }

    pub fn c2(&self) -> f64 {
        self.c2
    }

    fn local_stats(
        &self,
        reference: &Patch<'_>,
        degraded: &Patch<'_>,
        band: usize,
        frame: usize,
    ) -> LocalStats {
        let bands = reference.num_bands();
        let width = reference.width();

        let (mut mu_r, mut mu_d, mut rr, mut dd, mut rd) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (di, row) in self.window.iter().enumerate() {
            let Some(b) = (band + di).checked_sub(1).filter(|&b| b < bands) else {
                continue;
            };
            let ref_band = reference.band(b);
            let deg_band = degraded.band(b);
            for (dj, &w) in row.iter().enumerate() {
                let Some(t) = (frame + dj).checked_sub(1).filter(|&t| t < width) else {
                    continue;
                };
                let r = ref_band[t];
                let d = deg_band[t];
                mu_r += w * r;
                mu_d += w * d;
                rr += w * r * r;
                dd += w * d * d;
                rd += w * r * d;
            }
        }

        LocalStats {
            mu_r,
            mu_d,
            var_r: rr - mu_r * mu_r,
            var_d: dd - mu_d * mu_d,
            cov: rd - mu_r * mu_d,
        }
    }

    fn cell_similarity(&self, s: &LocalStats) -> f64 {
        let intensity =
            (2.0 * s.mu_r * s.mu_d + self.c1) / (s.mu_r * s.mu_r + s.mu_d * s.mu_d + self.c1);
        let structure =
            (s.cov + self.c2) / (s.var_r.max(0.0).sqrt() * s.var_d.max(0.0).sqrt() + self.c2);
        intensity * structure
    }

    /// Mean cell similarity along one band of the patch
    fn band_similarity(&self, reference: &Patch<'_>, degraded: &Patch<'_>, band: usize) -> f64 {
        let width = reference.width();
        if width == 0 {
            return 0.0;
        }
        let sum: f64 = (0..width)
            .map(|frame| self.cell_similarity(&self.local_stats(reference, degraded, band, frame)))
            .sum();
        sum / width as f64
    }

    /// Per-band and overall similarity of two patches of equal shape
    pub fn score(&self, reference: &Patch<'_>, degraded: &Patch<'_>) -> PatchSimilarity {
        debug_assert_eq!(reference.num_bands(), degraded.num_bands());
        debug_assert_eq!(reference.width(), degraded.width());

        let band_similarity: Vec<f64> = (0..reference.num_bands())
            .map(|band| self.band_similarity(reference, degraded, band))
            .collect();
        let similarity = mean(&band_similarity);

        PatchSimilarity {
            band_similarity,
            similarity,
        }
    }

    /// Overall similarity only, used to rank alignment candidates
    pub fn mean_similarity(&self, reference: &Patch<'_>, degraded: &Patch<'_>) -> f64 {
        let bands = reference.num_bands();
        if bands == 0 {
            return 0.0;
        }
        let sum: f64 = (0..bands)
            .map(|band| self.band_similarity(reference, degraded, band))
            .sum();
        sum / bands as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Normalised 3x3 Gaussian window
fn gaussian_window() -> [[f64; 3]; 3] {
    let mut window = [[0.0; 3]; 3];
    let mut total = 0.0;
    for (i, row) in window.iter_mut().enumerate() {
        for (j, w) in row.iter_mut().enumerate() {
            let y = i as f64 - 1.0;
            let x = j as f64 - 1.0;
            *w = (-(x * x + y * y) / (2.0 * WINDOW_SIGMA * WINDOW_SIGMA)).exp();
            total += *w;
        }
    }
    for w in window.iter_mut().flatten() {
        *w /= total;
    }
    window
}
