//! Measurement pipeline
//!
//! [`Engine::create`] validates a configuration once and freezes the analysis
//! profile, spectrogram builder and quality mapper. [`Engine::measure`] then
//! runs the full chain for one signal pair:
//!
//! 1. signal validation and optional global alignment
//! 2. gammatone spectrograms (both sides in parallel) and dB preparation
//! 3. reference patch extraction
//! 4. bounded alignment and NSIM scoring per patch (in parallel)
//! 5. aggregation and MOS-LQO mapping
//!
//! An engine is immutable after creation, so one instance can serve
//! concurrent `measure` calls.

use crate::aggregate::{AggregateSimilarity, SimilarityMatrix};
use crate::aligner::PatchAligner;
use crate::config::{AnalysisProfile, EngineConfig, ScoringMode};
use crate::error::{ConfigError, MeasureError, MeasureResult, ModelError};
use crate::mapper::{QualityMapper, SpeechQualityMapper, SvrQualityMapper};
use crate::model::{bundled_audio_model, load_model};
use crate::patch::{Patch, PatchExtractor};
use crate::score::{PatchSimilarityRecord, QualityScore};
use crate::signal::AudioSignal;
use crate::similarity::NsimScorer;
use crate::spectrogram::{
    prepare_for_comparison, FilterbankParams, Spectrogram, SpectrogramBuilder,
};
use crate::xcorr::align_and_truncate;
use rayon::prelude::*;
use std::borrow::Cow;
use std::fmt;

/// Duration difference above which a mismatch is logged (seconds)
const DURATION_MISMATCH_WARN_SECS: f64 = 0.1;

/// Configured quality engine, ready to measure
pub struct Engine {
    config: EngineConfig,
    sample_rate: u32,
    mode: ScoringMode,
    profile: AnalysisProfile,
    builder: SpectrogramBuilder,
    mapper: Box<dyn QualityMapper>,
}

impl Engine {
    /// Validate `config` and build an engine
    ///
    /// Audio mode loads the regression model from `svr_model_path`, or the
    /// bundled model when no path is set. Speech mode never touches a model
    /// file.
    pub fn create(config: EngineConfig) -> Result<Self, ConfigError> {
        let sample_rate = config.validated_sample_rate()?;
        let mode = config.scoring_mode();
        let profile = AnalysisProfile::resolve(&config, sample_rate);

        let mapper: Box<dyn QualityMapper> = match mode {
            ScoringMode::Audio => {
                let model = match &config.svr_model_path {
                    Some(path) => load_model(path)?,
                    None => bundled_audio_model()?,
                };
                let features = model.num_features().unwrap_or(0);
                if features > profile.num_bands {
                    let source = config
                        .svr_model_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "bundled model".to_string());
                    return Err(ModelError::parse(
                        source,
                        format!(
                            "model expects {} features, the audio profile has {} bands",
                            features, profile.num_bands
                        ),
                    )
                    .into());
                }
                match &config.svr_model_path {
                    Some(path) => log::info!("Quality model loaded from {}", path.display()),
                    None => log::info!("Using the bundled audio quality model"),
                }
                Box::new(SvrQualityMapper::new(model))
            }
            ScoringMode::Speech { scaled } => {
                if config.svr_model_path.is_some() {
                    log::debug!("Speech scoring ignores svr_model_path");
                }
                Box::new(SpeechQualityMapper::new(scaled))
            }
        };

        if sample_rate != crate::config::SUPPORTED_SAMPLE_RATE {
            log::warn!(
                "Running at unsupported sample rate {} Hz; scores are not calibrated",
                sample_rate
            );
        }

        let builder = SpectrogramBuilder::new(
            FilterbankParams {
                num_bands: profile.num_bands,
                min_freq: profile.min_freq,
                max_freq: profile.max_freq,
                window_len: profile.window_len(sample_rate),
                hop_len: profile.hop_len(sample_rate),
            },
            sample_rate,
        );

        log::info!(
            "Engine ready: {:?} mode, {} Hz, {} bands, patch {} frames, search ±{} frames",
            mode,
            sample_rate,
            profile.num_bands,
            profile.patch_width,
            profile.search_window
        );

        Ok(Self {
            config,
            sample_rate,
            mode,
            profile,
            builder,
            mapper,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    pub fn profile(&self) -> &AnalysisProfile {
        &self.profile
    }

    /// Score `degraded` against `reference`
    pub fn measure(
        &self,
        reference: &AudioSignal,
        degraded: &AudioSignal,
    ) -> MeasureResult<QualityScore> {
        self.validate_signal(reference, "reference")?;
        self.validate_signal(degraded, "degraded")?;

        let duration_delta = (reference.duration() - degraded.duration()).abs();
        if duration_delta > DURATION_MISMATCH_WARN_SECS {
            log::warn!(
                "Reference and degraded durations differ by {:.3}s ({:.3}s vs {:.3}s)",
                duration_delta,
                reference.duration(),
                degraded.duration()
            );
        }

        let (reference, degraded, lag) = if self.config.global_alignment {
            let (r, d, lag) = align_and_truncate(reference, degraded);
            (Cow::Owned(r), Cow::Owned(d), lag)
        } else {
            (Cow::Borrowed(reference), Cow::Borrowed(degraded), 0)
        };
        let global_lag_secs = lag as f64 / self.sample_rate as f64;
        if lag != 0 {
            log::debug!("Global alignment removed {} samples ({:.4}s)", lag, global_lag_secs);
        }

        let (ref_spec, deg_spec) = rayon::join(
            || self.spectrogram(&reference, "reference"),
            || self.spectrogram(&degraded, "degraded"),
        );
        let prepared = prepare_for_comparison(&ref_spec?, &deg_spec?);

        let extractor =
            PatchExtractor::with_stride(self.profile.patch_width, self.profile.patch_stride);
        let ref_patches = extractor.reference_patches(&prepared.reference)?;
        let search_space = extractor.degraded_range(&prepared.degraded);
        let scorer = NsimScorer::new(prepared.intensity_range);
        let aligner = PatchAligner::new(self.profile.search_window);

        let patches: Vec<Patch<'_>> = ref_patches.iter().collect();
        let outcomes: Vec<_> = patches
            .par_iter()
            .map(|&patch| {
                aligner.align(patch, &search_space, &scorer).map(|aligned| {
                    let similarity = scorer.score(&aligned.reference, &aligned.degraded);
                    PatchSimilarityRecord {
                        ref_frame: aligned.reference.start(),
                        deg_frame: aligned.degraded.start(),
                        offset: aligned.offset,
                        ref_start_secs: aligned.reference.start_secs(),
                        deg_start_secs: aligned.degraded.start_secs(),
                        similarity: similarity.similarity,
                        band_similarity: similarity.band_similarity,
                    }
                })
            })
            .collect();

        let mut records = Vec::with_capacity(outcomes.len());
        let mut skipped = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("Skipping reference patch: {}", e);
                    skipped += 1;
                }
            }
        }

        if records.is_empty() {
            return Err(MeasureError::AlignmentFailure {
                skipped,
                search_window: self.profile.search_window,
            });
        }

        let mut matrix = SimilarityMatrix::new(self.profile.num_bands);
        for record in &records {
            matrix.push(record.band_similarity.clone());
        }
        let similarity = AggregateSimilarity::from_matrix(&matrix);
        let moslqo = self.mapper.predict_quality(&similarity);

        log::debug!(
            "Measured {} patches ({} skipped): vnsim {:.4}, MOS-LQO {:.4}",
            records.len(),
            skipped,
            similarity.vnsim,
            moslqo
        );

        Ok(QualityScore {
            moslqo,
            similarity,
            mode: self.mode,
            center_freqs: prepared.reference.center_freqs().to_vec(),
            patches: records,
            skipped_patches: skipped,
            global_lag_secs,
        })
    }

    /// Score raw sample buffers at the engine's sample rate
    pub fn measure_samples(
        &self,
        reference: &[f64],
        degraded: &[f64],
    ) -> MeasureResult<QualityScore> {
        self.measure(
            &AudioSignal::from_slice(reference, self.sample_rate),
            &AudioSignal::from_slice(degraded, self.sample_rate),
        )
    }

    /// Spectrogram of one side, with `name` prefixed to builder errors
    fn spectrogram(&self, signal: &AudioSignal, name: &str) -> MeasureResult<Spectrogram> {
        self.builder.build(signal).map_err(|e| match e {
            MeasureError::InvalidSignal(msg) => {
                MeasureError::InvalidSignal(format!("{} {}", name, msg))
            }
            other => other,
        })
    }

    fn validate_signal(&self, signal: &AudioSignal, name: &str) -> MeasureResult<()> {
        if signal.sample_rate != self.sample_rate {
            return Err(MeasureError::InvalidSignal(format!(
                "{} signal sample rate {} Hz does not match the configured {} Hz",
                name, signal.sample_rate, self.sample_rate
            )));
        }
        if signal.is_empty() {
            return Err(MeasureError::InvalidSignal(format!("{} signal is empty", name)));
        }
        if !signal.is_finite() {
            return Err(MeasureError::InvalidSignal(format!(
                "{} signal contains non-finite samples",
                name
            )));
        }
        let window_len = self.builder.params().window_len;
        if signal.len() < window_len {
            return Err(MeasureError::InvalidSignal(format!(
                "{} signal has {} samples, shorter than one analysis window of {}",
                name,
                signal.len(),
                window_len
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("sample_rate", &self.sample_rate)
            .field("mode", &self.mode)
            .field("profile", &self.profile)
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::MAX_MOS;
    use std::io::Write;

    const SR: u32 = 48_000;

    fn noise(secs: f64, seed: u64) -> Vec<f64> {
        let n = (secs * SR as f64) as usize;
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_create_selects_profile() {
        let audio = Engine::create(EngineConfig::audio(SR)).unwrap();
        assert_eq!(audio.mode(), ScoringMode::Audio);
        assert_eq!(audio.profile().num_bands, 32);

        let speech = Engine::create(EngineConfig::speech(SR)).unwrap();
        assert_eq!(speech.mode(), ScoringMode::Speech { scaled: true });
        assert_eq!(speech.profile().num_bands, 21);
    }

    #[test]
    fn test_create_rejects_missing_rate() {
        let err = Engine::create(EngineConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSampleRate));
    }

    #[test]
    fn test_speech_ignores_model_path() {
        let config = EngineConfig::speech(SR).with_model_path("/nonexistent/model.txt");
        assert!(Engine::create(config).is_ok());
    }

    #[test]
    fn test_create_rejects_model_wider_than_profile() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "weights": [{}], "bias": 1.0 }}"#, vec!["0.1"; 40].join(", ")).unwrap();

        let config = EngineConfig::audio(SR).with_model_path(file.path());
        let err = Engine::create(config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ModelLoadFailure(ModelError::Parse { .. })
        ));
        let message = err.to_string();
        assert!(message.starts_with("INVALID_ARGUMENT: "), "{}", message);
        assert!(message.contains("model expects 40 features"), "{}", message);
        assert!(message.contains("32 bands"), "{}", message);
    }

    #[test]
    fn test_spectrogram_errors_name_the_side() {
        let engine = Engine::create(EngineConfig::speech(SR)).unwrap();
        let short = AudioSignal::new(vec![0.1; 16], SR);

        let err = engine.spectrogram(&short, "degraded").unwrap_err();
        assert!(matches!(err, MeasureError::InvalidSignal(_)));
        assert!(
            err.to_string().starts_with("INVALID_ARGUMENT: degraded signal has 16 samples"),
            "{}",
            err
        );

        let empty = AudioSignal::new(Vec::new(), SR);
        let err = engine.spectrogram(&empty, "reference").unwrap_err();
        assert_eq!(err.to_string(), "INVALID_ARGUMENT: reference signal is empty");
    }

    #[test]
    fn test_identical_speech_scores_max() {
        let engine = Engine::create(EngineConfig::speech(SR)).unwrap();
        let signal = noise(1.5, 7);
        let score = engine.measure_samples(&signal, &signal).unwrap();
        assert!((score.moslqo - MAX_MOS).abs() < 1e-4);
        assert_eq!(score.skipped_patches, 0);
        assert_eq!(score.global_lag_secs, 0.0);
        assert!(score.patches.iter().all(|p| p.offset == 0));
    }

    #[test]
    fn test_rate_mismatch_rejected() {
        let engine = Engine::create(EngineConfig::speech(SR)).unwrap();
        let reference = AudioSignal::new(noise(1.0, 1), SR);
        let degraded = AudioSignal::new(noise(1.0, 2), 16_000);
        let err = engine.measure(&reference, &degraded).unwrap_err();
        assert!(matches!(err, MeasureError::InvalidSignal(_)));
        assert!(err.to_string().starts_with("INVALID_ARGUMENT: degraded"));
    }

    #[test]
    fn test_short_degraded_fails_alignment() {
        let engine = Engine::create(EngineConfig::speech(SR).with_global_alignment(false)).unwrap();
        // Longer than one window, shorter than one patch
        let reference = noise(1.0, 3);
        let degraded = noise(0.1, 4);
        let err = engine.measure_samples(&reference, &degraded).unwrap_err();
        assert!(matches!(err, MeasureError::AlignmentFailure { .. }));
    }
}
