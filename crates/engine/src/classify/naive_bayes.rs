//! Bernoulli naive Bayes over binarized features. Laplace smoothing
//! keeps unseen feature states from zeroing a whole posterior.
//!
//! This is the calibrated workhorse: posteriors are honest
//! probabilities, so the decision layer can threshold them directly.

use crate::error::EngineError;
use crate::model::{FeatureSchema, FeatureVector, LabeledVector, Model, ModelParams};

use super::{check_training_set, check_vector, Classifier};

pub struct NaiveBayes {
    binarize: f64,
}

impl NaiveBayes {
    pub fn new(binarize: f64) -> Self {
        Self { binarize }
    }
}

impl Classifier for NaiveBayes {
    fn algorithm(&self) -> &'static str {
        "naive_bayes"
    }

    fn calibrated(&self) -> bool {
        true
    }

    fn fit(
        &self,
        schema: &FeatureSchema,
        training: &[LabeledVector],
    ) -> Result<Model, EngineError> {
        check_training_set(schema, training)?;

        let width = schema.len();
        let n_match = training.iter().filter(|s| s.is_match).count();
        let n_non_match = training.len() - n_match;

        let mut on_match = vec![0usize; width];
        let mut on_non_match = vec![0usize; width];
        for sample in training {
            let counts = if sample.is_match { &mut on_match } else { &mut on_non_match };
            for (j, value) in sample.vector.values.iter().enumerate() {
                if *value >= self.binarize {
                    counts[j] += 1;
                }
            }
        }

        // Add-one smoothing over the two Bernoulli states.
        let smoothed = |on: usize, total: usize| -> (f64, f64) {
            let denominator = (total + 2) as f64;
            (
                ((on + 1) as f64 / denominator).ln(),
                ((total - on + 1) as f64 / denominator).ln(),
            )
        };

        let mut log_on_given_match = Vec::with_capacity(width);
        let mut log_off_given_match = Vec::with_capacity(width);
        let mut log_on_given_non_match = Vec::with_capacity(width);
        let mut log_off_given_non_match = Vec::with_capacity(width);
        for j in 0..width {
            let (on, off) = smoothed(on_match[j], n_match);
            log_on_given_match.push(on);
            log_off_given_match.push(off);
            let (on, off) = smoothed(on_non_match[j], n_non_match);
            log_on_given_non_match.push(on);
            log_off_given_non_match.push(off);
        }

        let total = training.len() as f64;
        let params = ModelParams::NaiveBayes {
            log_prior_match: (n_match as f64 / total).ln(),
            log_prior_non_match: (n_non_match as f64 / total).ln(),
            log_on_given_match,
            log_off_given_match,
            log_on_given_non_match,
            log_off_given_non_match,
            binarize: self.binarize,
        };

        Ok(Model::new(self.algorithm(), schema.clone(), params, training.len()))
    }

    fn predict(&self, model: &Model, vector: &FeatureVector) -> Result<f64, EngineError> {
        check_vector(model, vector)?;

        let ModelParams::NaiveBayes {
            log_prior_match,
            log_prior_non_match,
            log_on_given_match,
            log_off_given_match,
            log_on_given_non_match,
            log_off_given_non_match,
            binarize,
        } = &model.params
        else {
            return Err(EngineError::ModelArtifact(format!(
                "model parameters are not naive_bayes (algorithm says {})",
                model.algorithm
            )));
        };

        let mut log_match = *log_prior_match;
        let mut log_non_match = *log_prior_non_match;
        for (j, value) in vector.values.iter().enumerate() {
            if *value >= *binarize {
                log_match += log_on_given_match[j];
                log_non_match += log_on_given_non_match[j];
            } else {
                log_match += log_off_given_match[j];
                log_non_match += log_off_given_non_match[j];
            }
        }

        // Posterior P(match | x), computed without exponentiating the
        // raw log joints.
        Ok(1.0 / (1.0 + (log_non_match - log_match).exp()))
    }
}
