//! Regression models mapping similarity features to a quality score
//!
//! The mapper only needs [`QualityModel::predict`]. Two on-disk formats are
//! understood:
//!
//! - libsvm text models (`epsilon_svr` / `nu_svr`, `rbf` or `linear` kernel)
//! - JSON linear models: `{ "weights": [...], "bias": 1.0 }`

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bundled audio-mode model, used when no path is configured
const BUNDLED_AUDIO_MODEL: &str = include_str!("../model/audio_linear.json");
const BUNDLED_AUDIO_MODEL_NAME: &str = "<bundled audio_linear.json>";

/// Feature vector to score
pub trait QualityModel: Send + Sync + std::fmt::Debug {
    /// Raw regression output for one feature vector
    fn predict(&self, features: &[f64]) -> f64;

    /// Number of features the model reads, when known
    fn num_features(&self) -> Option<usize>;
}

/// Linear regression: `bias + Σ wᵢ xᵢ`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearModel {
    pub fn from_json(json: &str, source: &str) -> Result<Self, ModelError> {
        let model: Self =
            serde_json::from_str(json).map_err(|e| ModelError::parse(source, e.to_string()))?;
        if model.weights.is_empty() {
            return Err(ModelError::parse(source, "model has no weights"));
        }
        if !model.bias.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::parse(source, "model has non-finite coefficients"));
        }
        Ok(model)
    }
}

impl QualityModel for LinearModel {
    fn predict(&self, features: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    fn num_features(&self) -> Option<usize> {
        Some(self.weights.len())
    }
}

/// SVR kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
}

/// Support vector with sparse features (0-based indices)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SupportVector {
    coef: f64,
    features: Vec<(usize, f64)>,
}

impl SupportVector {
    fn dot(&self, x: &[f64]) -> f64 {
        self.features
            .iter()
            .map(|&(i, v)| v * x.get(i).copied().unwrap_or(0.0))
            .sum()
    }

    fn squared_distance(&self, x: &[f64]) -> f64 {
        // Dense walk so features absent from the vector still count
        let mut dist = 0.0;
        let mut sparse = self.features.iter().peekable();
        let dims = x.len().max(self.features.last().map(|&(i, _)| i + 1).unwrap_or(0));
        for i in 0..dims {
            let sv = match sparse.peek() {
                Some(&&(idx, v)) if idx == i => {
                    sparse.next();
                    v
                }
                _ => 0.0,
            };
            let d = sv - x.get(i).copied().unwrap_or(0.0);
            dist += d * d;
        }
        dist
    }
}

/// Support vector regression model in libsvm layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvrModel {
    kernel: Kernel,
    rho: f64,
    support_vectors: Vec<SupportVector>,
    num_features: usize,
}

impl SvrModel {
    /// Parse libsvm model text; `source` names the file in errors
    pub fn parse(text: &str, source: &str) -> Result<Self, ModelError> {
        let mut svm_type = None;
        let mut kernel_type = None;
        let mut gamma = None;
        let mut rho = None;
        let mut total_sv = None;

        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        for line in lines.by_ref() {
            if line == "SV" {
                break;
            }
            let mut parts = line.split_whitespace();
            let key = parts.next().unwrap_or_default();
            let value = parts.next();
            match key {
                "svm_type" => svm_type = value.map(str::to_owned),
                "kernel_type" => kernel_type = value.map(str::to_owned),
                "gamma" => gamma = Some(parse_f64(value, "gamma", source)?),
                "rho" => rho = Some(parse_f64(value, "rho", source)?),
                "total_sv" => {
                    total_sv = Some(
                        value
                            .and_then(|v| v.parse::<usize>().ok())
                            .ok_or_else(|| ModelError::parse(source, "invalid total_sv"))?,
                    )
                }
                // nr_class, degree, coef0, label, nr_sv, probA... are not needed for regression
                _ => {}
            }
        }

        match svm_type.as_deref() {
            Some("epsilon_svr") | Some("nu_svr") => {}
            Some(other) => {
                return Err(ModelError::parse(source, format!("unsupported svm_type {}", other)));
            }
            None => return Err(ModelError::parse(source, "missing svm_type")),
        }

        let kernel = match kernel_type.as_deref() {
            Some("rbf") => Kernel::Rbf {
                gamma: gamma.ok_or_else(|| ModelError::parse(source, "rbf kernel without gamma"))?,
            },
            Some("linear") => Kernel::Linear,
            Some(other) => {
                return Err(ModelError::parse(source, format!("unsupported kernel_type {}", other)));
            }
            None => return Err(ModelError::parse(source, "missing kernel_type")),
        };
        let rho = rho.ok_or_else(|| ModelError::parse(source, "missing rho"))?;

        let mut support_vectors = Vec::new();
        for (line_no, line) in lines.enumerate() {
            support_vectors.push(parse_support_vector(line, source, line_no)?);
        }
        if support_vectors.is_empty() {
            return Err(ModelError::parse(source, "no support vectors"));
        }
        if let Some(expected) = total_sv {
            if expected != support_vectors.len() {
                return Err(ModelError::parse(
                    source,
                    format!(
                        "total_sv is {} but {} support vectors were found",
                        expected,
                        support_vectors.len()
                    ),
                ));
            }
        }

        let num_features = support_vectors
            .iter()
            .filter_map(|sv| sv.features.last().map(|&(i, _)| i + 1))
            .max()
            .unwrap_or(0);

        Ok(Self {
            kernel,
            rho,
            support_vectors,
            num_features,
        })
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn num_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }
}

impl QualityModel for SvrModel {
    fn predict(&self, features: &[f64]) -> f64 {
        let sum: f64 = self
            .support_vectors
            .iter()
            .map(|sv| {
                let k = match self.kernel {
                    Kernel::Linear => sv.dot(features),
                    Kernel::Rbf { gamma } => (-gamma * sv.squared_distance(features)).exp(),
                };
                sv.coef * k
            })
            .sum();
        sum - self.rho
    }

    fn num_features(&self) -> Option<usize> {
        Some(self.num_features)
    }
}

fn parse_f64(value: Option<&str>, key: &str, source: &str) -> Result<f64, ModelError> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| ModelError::parse(source, format!("invalid {}", key)))
}

fn parse_support_vector(
    line: &str,
    source: &str,
    line_no: usize,
) -> Result<SupportVector, ModelError> {
    let mut parts = line.split_whitespace();
    let coef = parts
        .next()
        .and_then(|c| c.parse::<f64>().ok())
        .ok_or_else(|| {
            ModelError::parse(source, format!("support vector {}: bad coefficient", line_no))
        })?;

    let mut features = Vec::new();
    for pair in parts {
        let (index, value) = pair
            .split_once(':')
            .and_then(|(i, v)| Some((i.parse::<usize>().ok()?, v.parse::<f64>().ok()?)))
            .filter(|&(i, _)| i >= 1)
            .ok_or_else(|| {
                ModelError::parse(
                    source,
                    format!("support vector {}: bad feature '{}'", line_no, pair),
                )
            })?;
        features.push((index - 1, value));
    }
    features.sort_by_key(|&(i, _)| i);

    Ok(SupportVector { coef, features })
}

/// Load a model file; JSON for `.json`, libsvm text otherwise
pub fn load_model(path: &Path) -> Result<Box<dyn QualityModel>, ModelError> {
    if !path.is_file() {
        return Err(ModelError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source = path.display().to_string();

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(Box::new(LinearModel::from_json(&text, &source)?))
    } else {
        Ok(Box::new(SvrModel::parse(&text, &source)?))
    }
}

/// The model compiled into the crate
pub fn bundled_audio_model() -> Result<Box<dyn QualityModel>, ModelError> {
    Ok(Box::new(LinearModel::from_json(
        BUNDLED_AUDIO_MODEL,
        BUNDLED_AUDIO_MODEL_NAME,
    )?))
}
