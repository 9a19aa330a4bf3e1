use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::features::FeatureKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    pub name: String,
    #[serde(default)]
    pub attributes: AttributeConfig,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

// ---------------------------------------------------------------------------
// Attribute mapping
// ---------------------------------------------------------------------------

/// Which entity attributes feed each comparator family.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeConfig {
    #[serde(default = "default_name_attribute")]
    pub name: String,
    #[serde(default = "default_date_attribute")]
    pub date: String,
    #[serde(default = "default_link_attribute")]
    pub link: String,
    #[serde(default = "default_token_attribute")]
    pub tokens: String,
}

fn default_name_attribute() -> String {
    "name".into()
}
fn default_date_attribute() -> String {
    "born".into()
}
fn default_link_attribute() -> String {
    "link".into()
}
fn default_token_attribute() -> String {
    "occupations".into()
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            name: default_name_attribute(),
            date: default_date_attribute(),
            link: default_link_attribute(),
            tokens: default_token_attribute(),
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategyKind {
    /// Exact match on the normalized first token of any name value.
    FirstNameToken,
    /// Exact match on any normalized link value.
    ExactLink,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockingConfig {
    #[serde(default = "default_blocking_strategies")]
    pub strategies: Vec<BlockingStrategyKind>,
}

fn default_blocking_strategies() -> Vec<BlockingStrategyKind> {
    vec![BlockingStrategyKind::FirstNameToken]
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self { strategies: default_blocking_strategies() }
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_feature_set")]
    pub set: Vec<FeatureKind>,
    /// When set, the Levenshtein feature is binarized against this
    /// similarity threshold instead of emitting a continuous score.
    #[serde(default)]
    pub levenshtein_threshold: Option<f64>,
    /// Same, for the Jaro-Winkler feature. Empirically tuned elsewhere
    /// at 0.85; re-tune per deployment.
    #[serde(default)]
    pub jaro_winkler_threshold: Option<f64>,
}

fn default_feature_set() -> Vec<FeatureKind> {
    vec![
        FeatureKind::ExactNames,
        FeatureKind::LevenshteinNames,
        FeatureKind::JaroWinklerNames,
        FeatureKind::SimilarDates,
        FeatureKind::SharedTokens,
        FeatureKind::SharedLinks,
    ]
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            set: default_feature_set(),
            levenshtein_threshold: None,
            jaro_winkler_threshold: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule-based baseline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BaselineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Require a full shared-precision date agreement on top of the
    /// perfect name match.
    #[serde(default = "default_true")]
    pub check_dates: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { enabled: true, check_dates: true }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    NaiveBayes,
    LinearSvm,
    Perceptron,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NaiveBayes => "naive_bayes",
            Self::LinearSvm => "linear_svm",
            Self::Perceptron => "perceptron",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    /// Continuous features count as "on" above this value when a
    /// generative classifier needs binary inputs.
    #[serde(default = "default_binarize")]
    pub binarize: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_regularization")]
    pub regularization: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_algorithm() -> Algorithm {
    Algorithm::NaiveBayes
}
fn default_binarize() -> f64 {
    0.5
}
fn default_epochs() -> usize {
    100
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_regularization() -> f64 {
    0.01
}
fn default_seed() -> u64 {
    42
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            binarize: default_binarize(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            regularization: default_regularization(),
            seed: default_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    /// Accept a calibrated score as a match at or above this value.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Calibrated scores inside [threshold - band, threshold) come out
    /// as undecided instead of non-match. 0 disables the band.
    #[serde(default)]
    pub undecided_band: f64,
    /// Force non-match when the pair shares no name token at all.
    #[serde(default)]
    pub zero_when_different_names: bool,
    /// When a target link embeds a source identifier, let it override
    /// the classifier score entirely.
    #[serde(default)]
    pub override_on_source_link: bool,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            undecided_band: 0.0,
            zero_when_different_names: false,
            override_on_source_link: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_k_folds")]
    pub k_folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_k_folds() -> usize {
    5
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { k_folds: default_k_folds(), seed: default_seed() }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ResolutionConfig {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let config: ResolutionConfig =
            toml::from_str(input).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.blocking.strategies.is_empty() {
            return Err(EngineError::ConfigValidation(
                "at least one blocking strategy is required".into(),
            ));
        }

        if self.features.set.is_empty() {
            return Err(EngineError::ConfigValidation(
                "feature set must not be empty".into(),
            ));
        }

        let mut seen = Vec::new();
        for kind in &self.features.set {
            if seen.contains(kind) {
                return Err(EngineError::ConfigValidation(format!(
                    "duplicate feature '{}' in feature set",
                    kind.label()
                )));
            }
            seen.push(*kind);
        }

        for (label, value) in [
            ("decision.threshold", self.decision.threshold),
            ("classifier.binarize", self.classifier.binarize),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigValidation(format!(
                    "{label} must be in [0, 1], got {value}"
                )));
            }
        }

        if let Some(t) = self.features.levenshtein_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(EngineError::ConfigValidation(format!(
                    "features.levenshtein_threshold must be in [0, 1], got {t}"
                )));
            }
        }
        if let Some(t) = self.features.jaro_winkler_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(EngineError::ConfigValidation(format!(
                    "features.jaro_winkler_threshold must be in [0, 1], got {t}"
                )));
            }
        }

        if self.evaluation.k_folds < 2 {
            return Err(EngineError::ConfigValidation(format!(
                "evaluation.k_folds must be at least 2, got {}",
                self.evaluation.k_folds
            )));
        }

        if self.classifier.epochs == 0 {
            return Err(EngineError::ConfigValidation(
                "classifier.epochs must be positive".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "People"

[attributes]
name = "name"
date = "born"
link = "link"
tokens = "occupations"

[blocking]
strategies = ["first_name_token", "exact_link"]

[features]
set = ["exact_names", "jaro_winkler_names", "similar_dates", "shared_links"]
jaro_winkler_threshold = 0.85

[classifier]
algorithm = "naive_bayes"
binarize = 0.5

[decision]
threshold = 0.6

[evaluation]
k_folds = 5
seed = 7
"#;

    #[test]
    fn parse_valid() {
        let config = ResolutionConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "People");
        assert_eq!(config.blocking.strategies.len(), 2);
        assert_eq!(config.features.set.len(), 4);
        assert_eq!(config.features.jaro_winkler_threshold, Some(0.85));
        assert_eq!(config.classifier.algorithm, Algorithm::NaiveBayes);
        assert_eq!(config.decision.threshold, 0.6);
        assert_eq!(config.evaluation.seed, 7);
    }

    #[test]
    fn defaults_fill_in() {
        let config = ResolutionConfig::from_toml("name = \"Minimal\"").unwrap();
        assert_eq!(config.attributes.name, "name");
        assert_eq!(config.blocking.strategies, vec![BlockingStrategyKind::FirstNameToken]);
        assert_eq!(config.decision.threshold, 0.5);
        assert!(config.baseline.enabled);
        assert_eq!(config.evaluation.k_folds, 5);
    }

    #[test]
    fn reject_unknown_algorithm() {
        let input = "name = \"Bad\"\n[classifier]\nalgorithm = \"decision_tree\"\n";
        let err = ResolutionConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn reject_out_of_range_threshold() {
        let input = "name = \"Bad\"\n[decision]\nthreshold = 1.5\n";
        let err = ResolutionConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn reject_duplicate_feature() {
        let input = "name = \"Bad\"\n[features]\nset = [\"exact_names\", \"exact_names\"]\n";
        let err = ResolutionConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("duplicate feature"));
    }

    #[test]
    fn reject_empty_feature_set() {
        let input = "name = \"Bad\"\n[features]\nset = []\n";
        let err = ResolutionConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("feature set"));
    }

    #[test]
    fn reject_single_fold() {
        let input = "name = \"Bad\"\n[evaluation]\nk_folds = 1\n";
        let err = ResolutionConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("k_folds"));
    }
}
