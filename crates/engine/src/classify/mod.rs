//! Supervised classifiers behind one object-safe trait, so the engine
//! can score candidate pairs without caring which family trained the
//! model.
//!
//! Training is deliberately strict: an empty or single-class training
//! set fails loudly instead of producing a degenerate model.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::config::{Algorithm, ClassifierConfig};
use crate::error::{EngineError, PairError};
use crate::model::{CandidatePair, FeatureSchema, FeatureVector, LabeledVector, Model};

mod naive_bayes;
mod perceptron;
mod svm;

pub use naive_bayes::NaiveBayes;
pub use perceptron::Perceptron;
pub use svm::LinearSvm;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait Classifier {
    fn algorithm(&self) -> &'static str;

    /// Whether `predict` returns a calibrated probability in [0, 1].
    /// Uncalibrated scores (a raw SVM margin, say) only carry sign and
    /// ordering; the decision layer must not treat them as confidence.
    fn calibrated(&self) -> bool;

    fn fit(
        &self,
        schema: &FeatureSchema,
        training: &[LabeledVector],
    ) -> Result<Model, EngineError>;

    fn predict(&self, model: &Model, vector: &FeatureVector) -> Result<f64, EngineError>;
}

pub fn classifier_for(
    algorithm: Algorithm,
    config: &ClassifierConfig,
) -> Box<dyn Classifier + Send + Sync> {
    match algorithm {
        Algorithm::NaiveBayes => Box::new(NaiveBayes::new(config.binarize)),
        Algorithm::LinearSvm => Box::new(LinearSvm::new(
            config.epochs,
            config.regularization,
            config.seed,
        )),
        Algorithm::Perceptron => Box::new(Perceptron::new(
            config.epochs,
            config.learning_rate,
            config.seed,
        )),
    }
}

// ---------------------------------------------------------------------------
// Shared guards
// ---------------------------------------------------------------------------

/// Reject degenerate training sets before any algorithm sees them.
pub(crate) fn check_training_set(
    schema: &FeatureSchema,
    training: &[LabeledVector],
) -> Result<(), EngineError> {
    if training.is_empty() {
        return Err(EngineError::Training("training set is empty".into()));
    }

    for sample in training {
        if sample.vector.values.len() != schema.len() {
            return Err(EngineError::Training(format!(
                "vector for {} has {} features, schema has {}",
                sample.vector.pair,
                sample.vector.values.len(),
                schema.len()
            )));
        }
    }

    let matches = training.iter().filter(|s| s.is_match).count();
    if matches == 0 || matches == training.len() {
        return Err(EngineError::Training(
            "training set must contain both matching and non-matching pairs".into(),
        ));
    }

    Ok(())
}

/// Scoring-time shape check. Fatal to this pair only.
pub(crate) fn check_vector(model: &Model, vector: &FeatureVector) -> Result<(), EngineError> {
    if vector.values.len() != model.schema.len() {
        return Err(EngineError::SchemaMismatch {
            expected: model.schema.len(),
            actual: vector.values.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Batch scoring
// ---------------------------------------------------------------------------

/// Score every vector in parallel. A failing pair lands in the error
/// list and the rest of the batch keeps going; the score map is keyed
/// by pair, so the outcome is independent of worker scheduling.
pub fn predict_batch(
    classifier: &(dyn Classifier + Send + Sync),
    model: &Model,
    vectors: &[FeatureVector],
) -> (BTreeMap<CandidatePair, f64>, Vec<PairError>) {
    let results: Vec<_> = vectors
        .par_iter()
        .map(|vector| (vector.pair.clone(), classifier.predict(model, vector)))
        .collect();

    let mut scores = BTreeMap::new();
    let mut errors = Vec::new();
    for (pair, result) in results {
        match result {
            Ok(score) => {
                scores.insert(pair, score);
            }
            Err(e) => errors.push(PairError {
                source: pair.source,
                target: pair.target,
                reason: e.to_string(),
            }),
        }
    }

    (scores, errors)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn schema2() -> FeatureSchema {
        FeatureSchema::new(vec!["exact_names".into(), "similar_dates".into()])
    }

    pub(crate) fn labeled(id: usize, values: Vec<f64>, is_match: bool) -> LabeledVector {
        LabeledVector {
            vector: FeatureVector {
                pair: CandidatePair::new(format!("Q{id}"), format!("T{id}")),
                values,
            },
            is_match,
        }
    }

    /// Clearly separable toy set: matches light up both features,
    /// non-matches neither.
    pub(crate) fn separable_training() -> Vec<LabeledVector> {
        vec![
            labeled(1, vec![1.0, 1.0], true),
            labeled(2, vec![1.0, 0.9], true),
            labeled(3, vec![0.9, 1.0], true),
            labeled(4, vec![0.0, 0.1], false),
            labeled(5, vec![0.1, 0.0], false),
            labeled(6, vec![0.0, 0.0], false),
        ]
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let err = check_training_set(&schema2(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Training(_)));
    }

    #[test]
    fn single_class_training_set_is_rejected() {
        let training = vec![
            labeled(1, vec![1.0, 1.0], true),
            labeled(2, vec![0.9, 1.0], true),
        ];
        let err = check_training_set(&schema2(), &training).unwrap_err();
        assert!(err.to_string().contains("both matching and non-matching"));
    }

    #[test]
    fn ragged_training_set_is_rejected() {
        let training = vec![
            labeled(1, vec![1.0, 1.0], true),
            labeled(2, vec![0.0], false),
        ];
        let err = check_training_set(&schema2(), &training).unwrap_err();
        assert!(matches!(err, EngineError::Training(_)));
    }

    #[test]
    fn batch_collects_errors_without_halting() {
        let classifier = NaiveBayes::new(0.5);
        let model = classifier.fit(&schema2(), &separable_training()).unwrap();

        let vectors = vec![
            FeatureVector { pair: CandidatePair::new("Q7", "T7"), values: vec![1.0, 1.0] },
            // wrong width, must fail alone
            FeatureVector { pair: CandidatePair::new("Q8", "T8"), values: vec![1.0] },
            FeatureVector { pair: CandidatePair::new("Q9", "T9"), values: vec![0.0, 0.0] },
        ];

        let (scores, errors) = predict_batch(&classifier, &model, &vectors);
        assert_eq!(scores.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source.as_str(), "Q8");
    }

    #[test]
    fn classifier_for_covers_every_algorithm() {
        let config = ClassifierConfig::default();
        for (algorithm, name) in [
            (Algorithm::NaiveBayes, "naive_bayes"),
            (Algorithm::LinearSvm, "linear_svm"),
            (Algorithm::Perceptron, "perceptron"),
        ] {
            assert_eq!(classifier_for(algorithm, &config).algorithm(), name);
        }
    }
}
