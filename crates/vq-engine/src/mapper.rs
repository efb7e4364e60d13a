//! Similarity to MOS-LQO mapping

use crate::aggregate::AggregateSimilarity;
use crate::model::QualityModel;

pub const MIN_MOS: f64 = 1.0;
pub const MAX_MOS: f64 = 5.0;

/// Exponential fit `a · exp(b · (x - x0))` of speech MOS over mean fvnsim
const SPEECH_FIT_A: f64 = 1.4;
const SPEECH_FIT_B: f64 = 4.68054;
const SPEECH_FIT_X0: f64 = 0.76722;

/// Maps aggregate similarity to a quality score
pub trait QualityMapper: Send + Sync + std::fmt::Debug {
    fn predict_quality(&self, similarity: &AggregateSimilarity) -> f64;
}

/// Audio mode: regression model over the per-band similarity vector
#[derive(Debug)]
pub struct SvrQualityMapper {
    model: Box<dyn QualityModel>,
}

impl SvrQualityMapper {
    pub fn new(model: Box<dyn QualityModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &dyn QualityModel {
        self.model.as_ref()
    }
}

impl QualityMapper for SvrQualityMapper {
    fn predict_quality(&self, similarity: &AggregateSimilarity) -> f64 {
        self.model
            .predict(&similarity.fvnsim)
            .clamp(MIN_MOS, MAX_MOS)
    }
}

/// Speech mode: exponential fit over mean similarity
#[derive(Debug, Clone, Copy)]
pub struct SpeechQualityMapper {
    scale_to_max_mos: bool,
}

impl SpeechQualityMapper {
    pub fn new(scale_to_max_mos: bool) -> Self {
        Self { scale_to_max_mos }
    }

    fn exponential_fit(x: f64) -> f64 {
        SPEECH_FIT_A * (SPEECH_FIT_B * (x - SPEECH_FIT_X0)).exp()
    }

    /// Raw fit value for a perfect match
    pub fn unscaled_perfect_mos() -> f64 {
        Self::exponential_fit(1.0)
    }
}

impl QualityMapper for SpeechQualityMapper {
    fn predict_quality(&self, similarity: &AggregateSimilarity) -> f64 {
        let x = similarity.mean_fvnsim();
        let mos = if self.scale_to_max_mos {
            // Same curve, rescaled so x = 1 lands exactly on MAX_MOS
            MAX_MOS * (SPEECH_FIT_B * (x - 1.0)).exp()
        } else {
            Self::exponential_fit(x)
        };
        mos.clamp(MIN_MOS, MAX_MOS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearModel;
    use approx::assert_abs_diff_eq;

    fn uniform(value: f64, bands: usize) -> AggregateSimilarity {
        AggregateSimilarity {
            vnsim: value,
            fvnsim: vec![value; bands],
            fstdnsim: vec![0.0; bands],
        }
    }

    #[test]
    fn test_speech_scaled_perfect_is_max() {
        let mapper = SpeechQualityMapper::new(true);
        assert_eq!(mapper.predict_quality(&uniform(1.0, 21)), MAX_MOS);
    }

    #[test]
    fn test_speech_unscaled_perfect_below_max() {
        let mapper = SpeechQualityMapper::new(false);
        let mos = mapper.predict_quality(&uniform(1.0, 21));
        assert_eq!(mos, SpeechQualityMapper::unscaled_perfect_mos());
        assert!(mos > 4.0 && mos < MAX_MOS);
        assert_abs_diff_eq!(mos, 4.16205, epsilon = 1e-4);
    }

    #[test]
    fn test_speech_mapping_monotonic_and_clamped() {
        for scaled in [true, false] {
            let mapper = SpeechQualityMapper::new(scaled);
            let low = mapper.predict_quality(&uniform(0.3, 21));
            let mid = mapper.predict_quality(&uniform(0.8, 21));
            let high = mapper.predict_quality(&uniform(0.95, 21));
            assert_eq!(low, MIN_MOS);
            assert!(mid < high);
        }
    }

    #[test]
    fn test_svr_mapper_clamps() {
        let model = LinearModel {
            weights: vec![10.0; 4],
            bias: -2.0,
        };
        let mapper = SvrQualityMapper::new(Box::new(model));
        assert_eq!(mapper.predict_quality(&uniform(1.0, 4)), MAX_MOS);
        assert_eq!(mapper.predict_quality(&uniform(0.0, 4)), MIN_MOS);
        assert_abs_diff_eq!(mapper.predict_quality(&uniform(0.1, 4)), 2.0, epsilon = 1e-12);
    }
}
