//! Mono signal container

use serde::{Deserialize, Serialize};

/// Mono PCM signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSignal {
    /// Samples (nominally -1.0..1.0)
    pub samples: Vec<f64>,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Copy a sample span
    pub fn from_slice(samples: &[f64], sample_rate: u32) -> Self {
        Self::new(samples.to_vec(), sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }

    /// Whether every sample is finite
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }
}
