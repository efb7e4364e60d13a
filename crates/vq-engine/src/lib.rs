//! # vq-engine
//!
//! Full-reference perceptual audio quality estimation.
//!
//! A degraded signal is compared against its clean reference in the
//! time-frequency domain and the result is mapped to a MOS-LQO score (1-5).
//!
//! ## Pipeline
//!
//! - **Spectrogram**: Hann-windowed STFT folded into a gammatone filterbank
//! - **Patches**: fixed-width frame ranges tiled over the reference
//! - **Alignment**: global cross-correlation, then a bounded per-patch search
//! - **Similarity**: NSIM over each aligned patch pair, per band
//! - **Mapping**: regression model (audio) or exponential fit (speech)
//!
//! ## Example
//!
//! ```rust,ignore
//! use vq_engine::{AudioSignal, Engine, EngineConfig};
//!
//! let engine = Engine::create(EngineConfig::speech(48_000))?;
//! let reference = AudioSignal::new(ref_samples, 48_000);
//! let degraded = AudioSignal::new(deg_samples, 48_000);
//!
//! let score = engine.measure(&reference, &degraded)?;
//! println!("{}", score.summary());
//! ```

pub mod aggregate;
pub mod aligner;
pub mod config;
pub mod engine;
pub mod error;
pub mod filterbank;
pub mod mapper;
pub mod model;
pub mod patch;
pub mod score;
pub mod signal;
pub mod similarity;
pub mod spectrogram;
pub mod xcorr;

pub use aggregate::{AggregateSimilarity, SimilarityMatrix};
pub use config::{AnalysisProfile, EngineConfig, ScoringMode, SUPPORTED_SAMPLE_RATE};
pub use engine::Engine;
pub use error::{AlignmentError, ConfigError, MeasureError, MeasureResult, ModelError, StatusCode};
pub use mapper::{QualityMapper, MAX_MOS, MIN_MOS};
pub use model::QualityModel;
pub use score::{PatchSimilarityRecord, QualityScore};
pub use signal::AudioSignal;
pub use spectrogram::Spectrogram;

/// Score a degraded buffer against a reference with a fresh engine
pub fn measure_once(
    config: EngineConfig,
    reference: &AudioSignal,
    degraded: &AudioSignal,
) -> Result<QualityScore, Box<dyn std::error::Error + Send + Sync>> {
    let engine = Engine::create(config)?;
    Ok(engine.measure(reference, degraded)?)
}
