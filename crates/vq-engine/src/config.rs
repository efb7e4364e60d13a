//! Engine configuration and per-mode analysis parameters

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The only sample rate accepted without the override flag
pub const SUPPORTED_SAMPLE_RATE: u32 = 48_000;

/// Configuration for [`Engine::create`](crate::Engine::create)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate of the signals to be measured (Hz)
    pub sample_rate: Option<u32>,

    /// Score as speech instead of general audio
    pub use_speech_scoring: bool,

    /// Report the raw speech mapping instead of scaling a perfect match to 5.0.
    /// Ignored unless `use_speech_scoring` is set.
    pub use_unscaled_speech_mos_mapping: bool,

    /// Regression model for audio mode; the bundled model is used when unset
    pub svr_model_path: Option<PathBuf>,

    /// Accept sample rates other than 48 kHz
    pub allow_unsupported_sample_rates: bool,

    /// Patch search half-width in frames; the mode default is used when unset
    pub search_window: Option<usize>,

    /// Remove the bulk delay between the signals before patch alignment
    pub global_alignment: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            use_speech_scoring: false,
            use_unscaled_speech_mos_mapping: false,
            svr_model_path: None,
            allow_unsupported_sample_rates: false,
            search_window: None,
            global_alignment: true,
        }
    }
}

impl EngineConfig {
    /// General audio scoring at the given rate
    pub fn audio(sample_rate: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            ..Default::default()
        }
    }

    /// Speech scoring (scaled mapping) at the given rate
    pub fn speech(sample_rate: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            use_speech_scoring: true,
            ..Default::default()
        }
    }

    /// Builder pattern: set sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Builder pattern: enable or disable speech scoring
    pub fn with_speech_scoring(mut self, enabled: bool) -> Self {
        self.use_speech_scoring = enabled;
        self
    }

    /// Builder pattern: select the unscaled speech mapping
    pub fn with_unscaled_speech_mapping(mut self, enabled: bool) -> Self {
        self.use_unscaled_speech_mos_mapping = enabled;
        self
    }

    /// Builder pattern: set regression model path
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.svr_model_path = Some(path.into());
        self
    }

    /// Builder pattern: allow sample rates other than 48 kHz
    pub fn with_unsupported_sample_rates(mut self, allow: bool) -> Self {
        self.allow_unsupported_sample_rates = allow;
        self
    }

    /// Builder pattern: override the patch search half-width (frames)
    pub fn with_search_window(mut self, frames: usize) -> Self {
        self.search_window = Some(frames);
        self
    }

    /// Builder pattern: enable or disable global alignment
    pub fn with_global_alignment(mut self, enabled: bool) -> Self {
        self.global_alignment = enabled;
        self
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Check the sample rate contract and return the validated rate
    pub fn validated_sample_rate(&self) -> Result<u32, ConfigError> {
        let sample_rate = self.sample_rate.ok_or(ConfigError::MissingSampleRate)?;
        if sample_rate == 0 {
            return Err(ConfigError::MissingSampleRate);
        }
        if sample_rate != SUPPORTED_SAMPLE_RATE && !self.allow_unsupported_sample_rates {
            return Err(ConfigError::UnsupportedSampleRate(sample_rate));
        }
        Ok(sample_rate)
    }

    /// Mode after flag resolution. The unscaled flag only matters in speech mode.
    pub fn scoring_mode(&self) -> ScoringMode {
        if !self.use_speech_scoring {
            ScoringMode::Audio
        } else if self.use_unscaled_speech_mos_mapping {
            ScoringMode::Speech { scaled: false }
        } else {
            ScoringMode::Speech { scaled: true }
        }
    }
}

/// Resolved scoring mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// General audio, regression model over per-band similarity
    Audio,
    /// Speech, exponential fit over mean similarity
    Speech { scaled: bool },
}

impl ScoringMode {
    pub fn is_speech(&self) -> bool {
        matches!(self, ScoringMode::Speech { .. })
    }
}

/// Analysis parameter bundle selected by the scoring mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisProfile {
    /// Number of gammatone bands
    pub num_bands: usize,

    /// Lowest band center frequency (Hz)
    pub min_freq: f64,

    /// Highest band center frequency (Hz)
    pub max_freq: f64,

    /// Analysis window length (seconds)
    pub window_secs: f64,

    /// Hop between frames (seconds)
    pub hop_secs: f64,

    /// Patch width (frames)
    pub patch_width: usize,

    /// Distance between reference patch starts (frames)
    pub patch_stride: usize,

    /// Degraded search half-width around the nominal position (frames)
    pub search_window: usize,
}

impl AnalysisProfile {
    pub fn audio() -> Self {
        Self {
            num_bands: 32,
            min_freq: 50.0,
            max_freq: 15_000.0,
            window_secs: 0.08,
            hop_secs: 0.04,
            patch_width: 30,
            patch_stride: 30,
            search_window: 60,
        }
    }

    /// Narrower range, finer time resolution
    pub fn speech() -> Self {
        Self {
            num_bands: 21,
            min_freq: 50.0,
            max_freq: 8_000.0,
            window_secs: 0.032,
            hop_secs: 0.016,
            patch_width: 20,
            patch_stride: 20,
            search_window: 60,
        }
    }

    /// Resolve the bundle for a validated configuration
    pub fn resolve(config: &EngineConfig, sample_rate: u32) -> Self {
        let mut profile = match config.scoring_mode() {
            ScoringMode::Audio => Self::audio(),
            ScoringMode::Speech { .. } => Self::speech(),
        };
        if let Some(search_window) = config.search_window {
            profile.search_window = search_window;
        }
        // Keep the top band below Nyquist at override rates
        let nyquist_limit = sample_rate as f64 * 0.5 * 0.95;
        if profile.max_freq > nyquist_limit {
            profile.max_freq = nyquist_limit;
        }
        profile
    }

    /// Window length in samples at the given rate
    pub fn window_len(&self, sample_rate: u32) -> usize {
        ((self.window_secs * sample_rate as f64).round() as usize).max(2)
    }

    /// Hop length in samples at the given rate
    pub fn hop_len(&self, sample_rate: u32) -> usize {
        ((self.hop_secs * sample_rate as f64).round() as usize).max(1)
    }
}
