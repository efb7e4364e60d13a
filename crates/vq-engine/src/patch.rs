//! Patch extraction
//!
//! A patch is a borrowed view of `width` consecutive frames across every band
//! of a spectrogram. Reference patches tile the signal; the degraded side only
//! exposes the candidate start range around a nominal position.

use crate::error::{MeasureError, MeasureResult};
use crate::spectrogram::Spectrogram;
use std::ops::RangeInclusive;

/// View of a contiguous frame range of a spectrogram
#[derive(Debug, Clone, Copy)]
pub struct Patch<'a> {
    spectrogram: &'a Spectrogram,
    start: usize,
    width: usize,
}

impl<'a> Patch<'a> {
    /// Create a view; `start + width` must not exceed the frame count
    pub fn new(spectrogram: &'a Spectrogram, start: usize, width: usize) -> Self {
        debug_assert!(start + width <= spectrogram.num_frames());
        Self {
            spectrogram,
            start,
            width,
        }
    }

    pub fn spectrogram(&self) -> &'a Spectrogram {
        self.spectrogram
    }

    /// First frame of the patch
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn num_bands(&self) -> usize {
        self.spectrogram.num_bands()
    }

    /// One band's frames inside the patch
    pub fn band(&self, band: usize) -> &'a [f64] {
        &self.spectrogram.band(band)[self.start..self.start + self.width]
    }

    /// Start time in seconds
    pub fn start_secs(&self) -> f64 {
        self.start as f64 * self.spectrogram.hop_secs()
    }
}

/// Patch geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchExtractor {
    width: usize,
    stride: usize,
}

impl PatchExtractor {
    /// Non-overlapping patches of `width` frames
    pub fn new(width: usize) -> Self {
        Self::with_stride(width, width)
    }

    /// Patches of `width` frames starting every `stride` frames
    pub fn with_stride(width: usize, stride: usize) -> Self {
        Self {
            width: width.max(1),
            stride: stride.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Reference-side patch sequence covering the whole spectrogram
    pub fn reference_patches<'a>(
        &self,
        spectrogram: &'a Spectrogram,
    ) -> MeasureResult<PatchSet<'a>> {
        if spectrogram.num_frames() < self.width {
            return Err(MeasureError::InsufficientData {
                signal: "reference",
                frames: spectrogram.num_frames(),
                needed: self.width,
            });
        }
        Ok(PatchSet {
            spectrogram,
            width: self.width,
            stride: self.stride,
        })
    }

    /// Degraded-side candidate source
    ///
    /// Never fails: a degraded spectrogram shorter than one patch simply has
    /// no candidates, which surfaces as per-patch alignment errors.
    pub fn degraded_range<'a>(&self, spectrogram: &'a Spectrogram) -> SearchSpace<'a> {
        SearchSpace {
            spectrogram,
            width: self.width,
        }
    }
}

/// Finite, restartable reference patch sequence
#[derive(Debug, Clone, Copy)]
pub struct PatchSet<'a> {
    spectrogram: &'a Spectrogram,
    width: usize,
    stride: usize,
}

impl<'a> PatchSet<'a> {
    /// Fresh iterator from the first patch
    pub fn iter(&self) -> Patches<'a> {
        Patches {
            spectrogram: self.spectrogram,
            width: self.width,
            stride: self.stride,
            next_start: 0,
        }
    }

    pub fn len(&self) -> usize {
        let frames = self.spectrogram.num_frames();
        if frames < self.width {
            0
        } else {
            (frames - self.width) / self.stride + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &PatchSet<'a> {
    type Item = Patch<'a>;
    type IntoIter = Patches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy patch iterator
#[derive(Debug, Clone)]
pub struct Patches<'a> {
    spectrogram: &'a Spectrogram,
    width: usize,
    stride: usize,
    next_start: usize,
}

impl<'a> Iterator for Patches<'a> {
    type Item = Patch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start + self.width > self.spectrogram.num_frames() {
            return None;
        }
        let patch = Patch::new(self.spectrogram, self.next_start, self.width);
        self.next_start += self.stride;
        Some(patch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let frames = self.spectrogram.num_frames();
        let remaining = if self.next_start + self.width > frames {
            0
        } else {
            (frames - self.width - self.next_start) / self.stride + 1
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Patches<'_> {}

/// Degraded spectrogram seen as a source of candidate patches
#[derive(Debug, Clone, Copy)]
pub struct SearchSpace<'a> {
    spectrogram: &'a Spectrogram,
    width: usize,
}

impl<'a> SearchSpace<'a> {
    pub fn spectrogram(&self) -> &'a Spectrogram {
        self.spectrogram
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Last start frame that still holds a full patch
    pub fn last_start(&self) -> Option<usize> {
        self.spectrogram.num_frames().checked_sub(self.width)
    }

    /// Starts within `[nominal - half_width, nominal + half_width]` that hold a
    /// full patch; `None` when that set is empty.
    pub fn candidate_starts(
        &self,
        nominal: usize,
        half_width: usize,
    ) -> Option<RangeInclusive<usize>> {
        let lo = nominal.saturating_sub(half_width);
        let hi = nominal.saturating_add(half_width).min(self.last_start()?);
        (lo <= hi).then_some(lo..=hi)
    }

    pub fn patch(&self, start: usize) -> Patch<'a> {
        Patch::new(self.spectrogram, start, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(bands: usize, frames: usize) -> Spectrogram {
        let data = (0..bands)
            .map(|b| (0..frames).map(|f| (b * 100 + f) as f64).collect())
            .collect();
        Spectrogram::from_grid(data, (0..bands).map(|b| 100.0 * (b + 1) as f64).collect(), 0.04)
    }

    #[test]
    fn test_reference_patches_tile_signal() {
        let spec = ramp(3, 95);
        let set = PatchExtractor::new(30).reference_patches(&spec).unwrap();
        let starts: Vec<usize> = set.iter().map(|p| p.start()).collect();
        assert_eq!(starts, vec![0, 30, 60]);
        assert_eq!(set.len(), 3);

        // Restartable
        assert_eq!(set.iter().count(), 3);
        assert_eq!((&set).into_iter().len(), 3);
    }

    #[test]
    fn test_overlapping_stride() {
        let spec = ramp(2, 50);
        let set = PatchExtractor::with_stride(20, 10).reference_patches(&spec).unwrap();
        let starts: Vec<usize> = set.iter().map(|p| p.start()).collect();
        assert_eq!(starts, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_patch_band_view() {
        let spec = ramp(2, 40);
        let patch = Patch::new(&spec, 10, 5);
        assert_eq!(patch.band(1), &[110.0, 111.0, 112.0, 113.0, 114.0]);
        assert!((patch.start_secs() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_data() {
        let spec = ramp(2, 29);
        let err = PatchExtractor::new(30).reference_patches(&spec).unwrap_err();
        assert_eq!(
            err,
            MeasureError::InsufficientData {
                signal: "reference",
                frames: 29,
                needed: 30
            }
        );
        // The degraded side has no candidates instead
        let space = PatchExtractor::new(30).degraded_range(&spec);
        assert_eq!(space.last_start(), None);
        assert_eq!(space.candidate_starts(0, 60), None);
    }

    #[test]
    fn test_candidate_starts_clipped() {
        let spec = ramp(2, 100);
        let space = PatchExtractor::new(30).degraded_range(&spec);
        assert_eq!(space.last_start(), Some(70));
        assert_eq!(space.candidate_starts(0, 5), Some(0..=5));
        assert_eq!(space.candidate_starts(40, 5), Some(35..=45));
        assert_eq!(space.candidate_starts(68, 5), Some(63..=70));
        assert_eq!(space.candidate_starts(90, 5), None);
    }
}
