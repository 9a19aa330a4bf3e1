use std::collections::BTreeMap;
use std::fmt;

use corefer_core::EntityId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EntityError, PairError};

// ---------------------------------------------------------------------------
// Candidate pairs
// ---------------------------------------------------------------------------

/// An ordered (source, target) pair produced by blocking. `Ord` so the
/// overall result set can be keyed deterministically regardless of
/// worker completion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatePair {
    pub source: EntityId,
    pub target: EntityId,
}

impl CandidatePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: EntityId::new(source),
            target: EntityId::new(target),
        }
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.source, self.target)
    }
}

// ---------------------------------------------------------------------------
// Feature vectors
// ---------------------------------------------------------------------------

/// Ordered feature labels. A trained model is only ever scored against
/// vectors of the exact same schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub labels: Vec<String>,
}

impl FeatureSchema {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Stable hex digest over the ordered labels. Versioning key for
    /// persisted model artifacts.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for label in &self.labels {
            hasher.update(label.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Fixed-width numeric features for one candidate pair. Missing
/// comparisons score 0.0, never NaN: downstream classifiers cannot
/// handle holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub pair: CandidatePair,
    pub values: Vec<f64>,
}

/// A feature vector with its ground-truth outcome. Training and
/// evaluation only.
#[derive(Debug, Clone)]
pub struct LabeledVector {
    pub vector: FeatureVector,
    pub is_match: bool,
}

// ---------------------------------------------------------------------------
// Trained models
// ---------------------------------------------------------------------------

/// Classifier parameters, one variant per algorithm family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "family")]
pub enum ModelParams {
    /// Bernoulli naive-Bayes over binarized features: log priors plus
    /// per-feature log likelihoods for the "on" state.
    NaiveBayes {
        log_prior_match: f64,
        log_prior_non_match: f64,
        log_on_given_match: Vec<f64>,
        log_off_given_match: Vec<f64>,
        log_on_given_non_match: Vec<f64>,
        log_off_given_non_match: Vec<f64>,
        binarize: f64,
    },
    /// Linear decision function: weights + bias. Used by both the SVM
    /// (raw margin) and the perceptron (sigmoid of the margin).
    Linear { weights: Vec<f64>, bias: f64 },
}

/// Immutable trained classifier state. A new training run produces a
/// new `Model`, never mutates an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub algorithm: String,
    pub schema: FeatureSchema,
    /// Hash of `schema` at training time; checked on artifact load.
    pub schema_hash: String,
    pub params: ModelParams,
    pub trained_at: String,
    pub training_pairs: usize,
}

impl Model {
    pub fn new(
        algorithm: &str,
        schema: FeatureSchema,
        params: ModelParams,
        training_pairs: usize,
    ) -> Self {
        let schema_hash = schema.hash();
        Self {
            algorithm: algorithm.to_string(),
            schema,
            schema_hash,
            params,
            trained_at: chrono::Utc::now().to_rfc3339(),
            training_pairs,
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::ModelArtifact(e.to_string()))
    }

    /// Deserialize and verify the embedded schema hash, so a model
    /// trained against one feature schema is never scored against
    /// another.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let model: Model =
            serde_json::from_str(json).map_err(|e| EngineError::ModelArtifact(e.to_string()))?;

        let recomputed = model.schema.hash();
        if recomputed != model.schema_hash {
            return Err(EngineError::ModelArtifact(format!(
                "schema hash mismatch: artifact says {}, schema hashes to {}",
                model.schema_hash, recomputed
            )));
        }

        model.validate_params()?;
        Ok(model)
    }

    /// Every parameter vector must span the schema exactly. The hash
    /// only covers the labels, so a hand-edited artifact can be
    /// hash-valid yet narrower than the schema; scoring such a model
    /// would index out of bounds or silently drop features.
    fn validate_params(&self) -> Result<(), EngineError> {
        let width = self.schema.len();
        let check = |what: &str, len: usize| -> Result<(), EngineError> {
            if len != width {
                return Err(EngineError::ModelArtifact(format!(
                    "{what} has {len} entries, schema has {width}"
                )));
            }
            Ok(())
        };

        match &self.params {
            ModelParams::NaiveBayes {
                log_on_given_match,
                log_off_given_match,
                log_on_given_non_match,
                log_off_given_non_match,
                ..
            } => {
                check("log_on_given_match", log_on_given_match.len())?;
                check("log_off_given_match", log_off_given_match.len())?;
                check("log_on_given_non_match", log_on_given_non_match.len())?;
                check("log_off_given_non_match", log_off_given_non_match.len())?;
            }
            ModelParams::Linear { weights, .. } => {
                check("weight vector", weights.len())?;
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLabel {
    Match,
    NonMatch,
    Undecided,
    /// An accepted pair suppressed by a higher-confidence pair for the
    /// same source entity. Kept so callers can audit alternatives.
    Superseded,
}

impl fmt::Display for DecisionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::NonMatch => write!(f, "non_match"),
            Self::Undecided => write!(f, "undecided"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

/// Final output per candidate pair. Consumed by the ingester; the
/// engine persists nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDecision {
    pub source: EntityId,
    pub target: EntityId,
    pub label: DecisionLabel,
    /// Absent for classifiers without calibrated probabilities
    /// (e.g., a linear-margin SVM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Identifier of the deciding strategy.
    pub strategy: String,
}

// ---------------------------------------------------------------------------
// Run output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionSummary {
    pub total_pairs: usize,
    pub matches: usize,
    pub non_matches: usize,
    pub undecided: usize,
    pub superseded: usize,
    pub label_counts: BTreeMap<String, usize>,
}

impl ResolutionSummary {
    pub fn compute(decisions: &[LinkDecision]) -> Self {
        let mut summary = Self { total_pairs: decisions.len(), ..Default::default() };

        for d in decisions {
            *summary.label_counts.entry(d.label.to_string()).or_insert(0) += 1;
            match d.label {
                DecisionLabel::Match => summary.matches += 1,
                DecisionLabel::NonMatch => summary.non_matches += 1,
                DecisionLabel::Undecided => summary.undecided += 1,
                DecisionLabel::Superseded => summary.superseded += 1,
            }
        }

        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionMeta {
    pub config_name: String,
    pub strategy: String,
    pub engine_version: String,
    pub run_at: String,
}

/// Complete decision set with the attached error lists. Per-pair and
/// per-entity problems never halt the run; setup and training problems
/// surface as a single fatal [`EngineError`](crate::error::EngineError)
/// instead.
#[derive(Debug, Serialize)]
pub struct ResolutionResult {
    pub meta: ResolutionMeta,
    pub summary: ResolutionSummary,
    pub decisions: Vec<LinkDecision>,
    pub entity_errors: Vec<EntityError>,
    pub pair_errors: Vec<PairError>,
}
