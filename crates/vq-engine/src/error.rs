//! Error types for engine creation and measurement
//!
//! Every error renders as `"<STATUS_CODE>: <description>"`. Calling tooling
//! greps for the prefix, so the prefixes and the fixed messages below are part
//! of the public surface.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Status code prefix carried by every error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    InvalidArgument,
    FailedPrecondition,
    OutOfRange,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regression model loading errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// Model file does not exist
    #[error("Failed to load the SVR model file: {}", .path.display())]
    NotFound { path: PathBuf },

    /// Model file exists but could not be read
    #[error("Failed to read the SVR model file: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Model file content is malformed
    #[error("Failed to parse the SVR model file: {path}: {reason}")]
    Parse { path: String, reason: String },
}

impl ModelError {
    pub(crate) fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by [`Engine::create`](crate::Engine::create)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("INVALID_ARGUMENT: Audio info must be supplied for config.")]
    MissingSampleRate,

    #[error(
        "INVALID_ARGUMENT: Currently, 48k is the only sample rate supported by vq-engine. \
         See allow_unsupported_sample_rates for details of overriding."
    )]
    UnsupportedSampleRate(u32),

    #[error("INVALID_ARGUMENT: {0}")]
    ModelLoadFailure(#[from] ModelError),
}

impl ConfigError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::InvalidArgument
    }
}

/// Errors raised by [`Engine::measure`](crate::Engine::measure)
///
/// Scoped to one call; the engine stays usable afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("INVALID_ARGUMENT: {0}")]
    InvalidSignal(String),

    #[error(
        "FAILED_PRECONDITION: {signal} spectrogram has {frames} frames, one patch needs {needed}"
    )]
    InsufficientData {
        signal: &'static str,
        frames: usize,
        needed: usize,
    },

    #[error(
        "OUT_OF_RANGE: no reference patch could be aligned ({skipped} patches skipped, \
         search window {search_window} frames)"
    )]
    AlignmentFailure { skipped: usize, search_window: usize },
}

impl MeasureError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MeasureError::InvalidSignal(_) => StatusCode::InvalidArgument,
            MeasureError::InsufficientData { .. } => StatusCode::FailedPrecondition,
            MeasureError::AlignmentFailure { .. } => StatusCode::OutOfRange,
        }
    }
}

/// Per-patch alignment failure; recovered by skipping the patch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "patch at frame {nominal} has no full candidate within ±{search_window} frames \
     ({available} degraded frames)"
)]
pub struct AlignmentError {
    pub nominal: usize,
    pub search_window: usize,
    pub available: usize,
}

pub type MeasureResult<T> = std::result::Result<T, MeasureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sample_rate_message() {
        assert_eq!(
            ConfigError::MissingSampleRate.to_string(),
            "INVALID_ARGUMENT: Audio info must be supplied for config."
        );
    }

    #[test]
    fn test_unsupported_sample_rate_message() {
        assert_eq!(
            ConfigError::UnsupportedSampleRate(44_100).to_string(),
            "INVALID_ARGUMENT: Currently, 48k is the only sample rate supported by vq-engine. \
             See allow_unsupported_sample_rates for details of overriding."
        );
    }

    #[test]
    fn test_model_not_found_message() {
        let err = ConfigError::from(ModelError::NotFound {
            path: PathBuf::from("non_existant.txt"),
        });
        assert_eq!(
            err.to_string(),
            "INVALID_ARGUMENT: Failed to load the SVR model file: non_existant.txt"
        );
    }

    #[test]
    fn test_measure_prefixes_match_status_code() {
        let errors = [
            MeasureError::InvalidSignal("empty".into()),
            MeasureError::InsufficientData {
                signal: "reference",
                frames: 3,
                needed: 30,
            },
            MeasureError::AlignmentFailure {
                skipped: 4,
                search_window: 60,
            },
        ];
        for err in errors {
            let prefix = format!("{}: ", err.status_code());
            assert!(err.to_string().starts_with(&prefix), "{}", err);
        }
    }
}
