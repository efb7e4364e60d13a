//! Reduction of per-patch band similarity to vnsim / fvnsim

use serde::{Deserialize, Serialize};

/// Per (patch, band) similarity, one row per aligned patch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    num_bands: usize,
    rows: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn new(num_bands: usize) -> Self {
        Self {
            num_bands,
            rows: Vec::new(),
        }
    }

    /// Append one patch's band values
    pub fn push(&mut self, band_similarity: Vec<f64>) {
        debug_assert_eq!(band_similarity.len(), self.num_bands);
        self.rows.push(band_similarity);
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn num_patches(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Aggregate similarity of one measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSimilarity {
    /// Mean over all patches and bands, in [0, 1]
    pub vnsim: f64,

    /// Mean over patches, per band
    pub fvnsim: Vec<f64>,

    /// Standard deviation over patches, per band
    pub fstdnsim: Vec<f64>,
}

impl AggregateSimilarity {
    /// Unweighted means over every row; values are clamped to [0, 1] first.
    /// An empty matrix gives zeros.
    pub fn from_matrix(matrix: &SimilarityMatrix) -> Self {
        let num_bands = matrix.num_bands();
        let count = matrix.num_patches();
        if count == 0 || num_bands == 0 {
            return Self {
                vnsim: 0.0,
                fvnsim: vec![0.0; num_bands],
                fstdnsim: vec![0.0; num_bands],
            };
        }

        let mut sums = vec![0.0; num_bands];
        let mut sums_sq = vec![0.0; num_bands];
        for row in matrix.rows() {
            for ((sum, sum_sq), &value) in sums.iter_mut().zip(sums_sq.iter_mut()).zip(row) {
                let v = value.clamp(0.0, 1.0);
                *sum += v;
                *sum_sq += v * v;
            }
        }

        let n = count as f64;
        let fvnsim: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let fstdnsim: Vec<f64> = sums_sq
            .iter()
            .zip(&fvnsim)
            .map(|(sq, mean)| (sq / n - mean * mean).max(0.0).sqrt())
            .collect();
        let vnsim = (fvnsim.iter().sum::<f64>() / num_bands as f64).clamp(0.0, 1.0);

        Self {
            vnsim,
            fvnsim,
            fstdnsim,
        }
    }

    pub fn num_bands(&self) -> usize {
        self.fvnsim.len()
    }

    /// Mean of the per-band values
    pub fn mean_fvnsim(&self) -> f64 {
        if self.fvnsim.is_empty() {
            0.0
        } else {
            self.fvnsim.iter().sum::<f64>() / self.fvnsim.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn matrix_of(rows: &[Vec<f64>]) -> SimilarityMatrix {
        let mut matrix = SimilarityMatrix::new(rows.first().map_or(0, Vec::len));
        for row in rows {
            matrix.push(row.clone());
        }
        matrix
    }

    #[test]
    fn test_means() {
        let matrix = matrix_of(&[vec![1.0, 0.5], vec![0.5, 0.5]]);
        let agg = AggregateSimilarity::from_matrix(&matrix);
        assert_eq!(agg.fvnsim, vec![0.75, 0.5]);
        assert_abs_diff_eq!(agg.vnsim, 0.625);
        assert_abs_diff_eq!(agg.fstdnsim[0], 0.25);
        assert_abs_diff_eq!(agg.fstdnsim[1], 0.0);
    }

    #[test]
    fn test_clamps_negative_similarity() {
        let matrix = matrix_of(&[vec![-0.5, 1.0 + 1e-15]]);
        let agg = AggregateSimilarity::from_matrix(&matrix);
        assert_eq!(agg.fvnsim, vec![0.0, 1.0]);
        assert!((0.0..=1.0).contains(&agg.vnsim));
    }

    #[test]
    fn test_order_invariant() {
        let rows: Vec<Vec<f64>> = (0..17)
            .map(|i| (0..5).map(|b| ((i * 31 + b * 7) % 13) as f64 / 13.0).collect())
            .collect();
        let reversed: Vec<Vec<f64>> = rows.iter().rev().cloned().collect();
        let forward = matrix_of(&rows);
        let backward = matrix_of(&reversed);

        let a = AggregateSimilarity::from_matrix(&forward);
        let b = AggregateSimilarity::from_matrix(&backward);
        assert_abs_diff_eq!(a.vnsim, b.vnsim, epsilon = 1e-12);
        for (x, y) in a.fvnsim.iter().zip(&b.fvnsim) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_empty_matrix() {
        let agg = AggregateSimilarity::from_matrix(&SimilarityMatrix::new(4));
        assert_eq!(agg.fvnsim.len(), 4);
        assert_eq!(agg.vnsim, 0.0);
    }
}
