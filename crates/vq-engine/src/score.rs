//! Measurement result and its text/JSON renderings

use crate::aggregate::AggregateSimilarity;
use crate::config::ScoringMode;
use serde::{Deserialize, Serialize};

/// Outcome for one aligned reference patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSimilarityRecord {
    /// Reference patch start frame
    pub ref_frame: usize,

    /// Matched degraded patch start frame
    pub deg_frame: usize,

    /// `deg_frame - ref_frame`
    pub offset: isize,

    /// Reference patch start time (seconds)
    pub ref_start_secs: f64,

    /// Degraded patch start time (seconds)
    pub deg_start_secs: f64,

    /// Mean similarity of the pair
    pub similarity: f64,

    /// Per-band similarity of the pair
    pub band_similarity: Vec<f64>,
}

/// Result of one measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Predicted MOS-LQO (1-5)
    pub moslqo: f64,

    /// Aggregate similarity that produced the score
    pub similarity: AggregateSimilarity,

    /// Mode the score was mapped with
    pub mode: ScoringMode,

    /// Band center frequencies (Hz)
    pub center_freqs: Vec<f64>,

    /// Aligned patches, in reference order
    pub patches: Vec<PatchSimilarityRecord>,

    /// Reference patches that could not be aligned
    pub skipped_patches: usize,

    /// Bulk delay removed before patch alignment (seconds, positive when the
    /// degraded signal leads)
    pub global_lag_secs: f64,
}

impl QualityScore {
    pub fn vnsim(&self) -> f64 {
        self.similarity.vnsim
    }

    pub fn fvnsim(&self) -> &[f64] {
        &self.similarity.fvnsim
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "MOS-LQO: {:.4} (vnsim {:.4}, {} patches, {} skipped, {})",
            self.moslqo,
            self.similarity.vnsim,
            self.patches.len(),
            self.skipped_patches,
            mode_label(self.mode)
        )
    }

    /// Multi-line report with per-band and per-patch detail
    pub fn detailed_report(&self) -> String {
        let mut report = String::new();

        report.push_str("Quality Report\n");
        report.push_str("==============\n\n");
        report.push_str(&format!("Mode: {}\n", mode_label(self.mode)));
        report.push_str(&format!("MOS-LQO: {:.4}\n", self.moslqo));
        report.push_str(&format!("VNSIM: {:.6}\n", self.similarity.vnsim));
        report.push_str(&format!("Global lag: {:.4} s\n", self.global_lag_secs));
        report.push_str(&format!(
            "Patches: {} aligned, {} skipped\n\n",
            self.patches.len(),
            self.skipped_patches
        ));

        report.push_str("Bands:\n");
        for (i, (mean, std)) in self
            .similarity
            .fvnsim
            .iter()
            .zip(&self.similarity.fstdnsim)
            .enumerate()
        {
            let freq = self.center_freqs.get(i).copied().unwrap_or(0.0);
            report.push_str(&format!(
                "  {:>2} {:>8.1} Hz  fvnsim {:.4}  std {:.4}\n",
                i, freq, mean, std
            ));
        }

        report.push_str("\nPatches:\n");
        for patch in &self.patches {
            report.push_str(&format!(
                "  ref {:>8.3} s  deg {:>8.3} s  offset {:>+4}  sim {:.4}\n",
                patch.ref_start_secs, patch.deg_start_secs, patch.offset, patch.similarity
            ));
        }

        report
    }

    /// Pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn mode_label(mode: ScoringMode) -> &'static str {
    match mode {
        ScoringMode::Audio => "audio",
        ScoringMode::Speech { scaled: true } => "speech (scaled)",
        ScoringMode::Speech { scaled: false } => "speech (unscaled)",
    }
}
