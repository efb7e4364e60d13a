//! Bounded per-patch alignment
//!
//! Each reference patch is matched against every degraded patch whose start
//! lies within `search_window` frames of the reference start. The search is
//! local so repeated material elsewhere in the signal cannot be matched.

use crate::error::AlignmentError;
use crate::patch::{Patch, SearchSpace};
use crate::similarity::NsimScorer;
use std::ops::RangeInclusive;

/// Chosen degraded patch for one reference patch
#[derive(Debug, Clone, Copy)]
pub struct AlignmentResult<'a> {
    pub reference: Patch<'a>,
    pub degraded: Patch<'a>,
    /// Degraded start minus reference start (frames)
    pub offset: isize,
    /// Similarity that won the search
    pub pre_score: f64,
}

/// Patch aligner with an explicit search half-width
#[derive(Debug, Clone)]
pub struct PatchAligner {
    search_window: usize,
}

impl PatchAligner {
    pub fn new(search_window: usize) -> Self {
        Self { search_window }
    }

    pub fn search_window(&self) -> usize {
        self.search_window
    }

    /// Find the best degraded match for `reference`
    ///
    /// Candidates are visited in order of increasing distance from the
    /// nominal start, earlier start first at equal distance, and only a
    /// strictly better score replaces the current choice.
    pub fn align<'a>(
        &self,
        reference: Patch<'a>,
        degraded: &SearchSpace<'a>,
        scorer: &NsimScorer,
    ) -> Result<AlignmentResult<'a>, AlignmentError> {
        let nominal = reference.start();
        let range = degraded
            .candidate_starts(nominal, self.search_window)
            .ok_or(AlignmentError {
                nominal,
                search_window: self.search_window,
                available: degraded.spectrogram().num_frames(),
            })?;

        let mut best: Option<(usize, f64)> = None;
        for start in nearest_first(nominal, range) {
            let score = scorer.mean_similarity(&reference, &degraded.patch(start));
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((start, score));
            }
        }

        // The range is non-empty, so at least one candidate was scored
        let (start, pre_score) = best.ok_or(AlignmentError {
            nominal,
            search_window: self.search_window,
            available: degraded.spectrogram().num_frames(),
        })?;

        Ok(AlignmentResult {
            reference,
            degraded: degraded.patch(start),
            offset: start as isize - nominal as isize,
            pre_score,
        })
    }
}

/// Starts in `range` ordered `nominal, nominal-1, nominal+1, nominal-2, ...`
///
/// The walk stops at the farther end of `range`, so its length depends on the
/// range and never on the configured half-width.
fn nearest_first(nominal: usize, range: RangeInclusive<usize>) -> impl Iterator<Item = usize> {
    let (lo, hi) = (*range.start(), *range.end());
    let max_distance = nominal.abs_diff(lo).max(nominal.abs_diff(hi));
    (0..=max_distance).flat_map(move |d| {
        let before = nominal.checked_sub(d);
        let after = if d == 0 { None } else { nominal.checked_add(d) };
        before
            .into_iter()
            .chain(after)
            .filter(move |start| (lo..=hi).contains(start))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchExtractor;
    use crate::spectrogram::Spectrogram;

    fn textured(b: usize, t: usize) -> f64 {
        20.0 + 8.0 * ((b as f64 * 0.9 + t as f64 * 0.37).sin() + (t as f64 * 1.3).cos())
    }

    fn grid(frames: usize, f: impl Fn(usize, usize) -> f64) -> Spectrogram {
        let data = (0..6).map(|b| (0..frames).map(|t| f(b, t)).collect()).collect();
        Spectrogram::from_grid(data, vec![500.0; 6], 0.04)
    }

    #[test]
    fn test_nearest_first_order() {
        let order: Vec<usize> = nearest_first(5, 3..=7).collect();
        assert_eq!(order, vec![5, 4, 6, 3, 7]);

        let clipped: Vec<usize> = nearest_first(1, 0..=3).collect();
        assert_eq!(clipped, vec![1, 0, 2, 3]);

        // Nominal past the end of the range
        let beyond: Vec<usize> = nearest_first(10, 6..=8).collect();
        assert_eq!(beyond, vec![8, 7, 6]);
    }

    #[test]
    fn test_huge_search_window_matches_default() {
        let reference = grid(120, textured);
        let degraded = grid(123, |b, t| if t < 3 { 20.0 } else { textured(b, t - 3) });
        let space = PatchExtractor::new(20).degraded_range(&degraded);
        let scorer = NsimScorer::new(32.0);

        for start in [0, 40, 100] {
            let patch = Patch::new(&reference, start, 20);
            let bounded = PatchAligner::new(60).align(patch, &space, &scorer).unwrap();
            let unbounded = PatchAligner::new(usize::MAX)
                .align(patch, &space, &scorer)
                .unwrap();
            assert_eq!(unbounded.offset, bounded.offset);
            assert_eq!(unbounded.pre_score, bounded.pre_score);
        }
    }

    #[test]
    fn test_identical_aligns_at_zero_offset() {
        let spec = grid(120, textured);
        let extractor = PatchExtractor::new(20);
        let patches = extractor.reference_patches(&spec).unwrap();
        let space = extractor.degraded_range(&spec);
        let scorer = NsimScorer::new(32.0);
        let aligner = PatchAligner::new(10);

        for patch in &patches {
            let result = aligner.align(patch, &space, &scorer).unwrap();
            assert_eq!(result.offset, 0);
            assert!((result.pre_score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_recovers_delay_within_window() {
        let reference = grid(120, textured);
        // Degraded lags by 3 frames
        let degraded = grid(123, |b, t| if t < 3 { 20.0 } else { textured(b, t - 3) });
        let extractor = PatchExtractor::new(20);
        let space = extractor.degraded_range(&degraded);
        let scorer = NsimScorer::new(32.0);

        let patch = Patch::new(&reference, 40, 20);
        let result = PatchAligner::new(5).align(patch, &space, &scorer).unwrap();
        assert_eq!(result.offset, 3);
        assert_eq!(result.degraded.start(), 43);
    }

    #[test]
    fn test_delay_outside_window_not_found() {
        let reference = grid(120, textured);
        let degraded = grid(128, |b, t| if t < 8 { 20.0 } else { textured(b, t - 8) });
        let space = PatchExtractor::new(20).degraded_range(&degraded);
        let scorer = NsimScorer::new(32.0);

        let result = PatchAligner::new(2)
            .align(Patch::new(&reference, 40, 20), &space, &scorer)
            .unwrap();
        assert!(result.offset.unsigned_abs() <= 2);
        assert!(result.pre_score < 1.0 - 1e-6);
    }

    #[test]
    fn test_tie_prefers_smallest_offset() {
        // Constant grids score the same at every offset
        let reference = grid(60, |_, _| 10.0);
        let degraded = grid(60, |_, _| 10.0);
        let space = PatchExtractor::new(20).degraded_range(&degraded);
        let scorer = NsimScorer::new(32.0);

        let result = PatchAligner::new(10)
            .align(Patch::new(&reference, 20, 20), &space, &scorer)
            .unwrap();
        assert_eq!(result.offset, 0);
    }

    #[test]
    fn test_short_degraded_fails() {
        let reference = grid(120, textured);
        let degraded = grid(40, textured);
        let space = PatchExtractor::new(20).degraded_range(&degraded);
        let scorer = NsimScorer::new(32.0);

        let err = PatchAligner::new(5)
            .align(Patch::new(&reference, 80, 20), &space, &scorer)
            .unwrap_err();
        assert_eq!(err.nominal, 80);
        assert_eq!(err.available, 40);
    }
}
