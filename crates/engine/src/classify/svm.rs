//! Linear SVM trained with the Pegasos stochastic sub-gradient
//! method. Epoch order is a seeded shuffle, so the same training set
//! and seed always yield the same weights.
//!
//! Predictions are the raw margin `w·x + b`: sign decides, magnitude
//! orders, and neither is a probability. `calibrated()` is false and
//! the decision layer must respect that.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::EngineError;
use crate::model::{FeatureSchema, FeatureVector, LabeledVector, Model, ModelParams};

use super::{check_training_set, check_vector, Classifier};

pub struct LinearSvm {
    epochs: usize,
    regularization: f64,
    seed: u64,
}

impl LinearSvm {
    pub fn new(epochs: usize, regularization: f64, seed: u64) -> Self {
        Self { epochs, regularization, seed }
    }
}

impl Classifier for LinearSvm {
    fn algorithm(&self) -> &'static str {
        "linear_svm"
    }

    fn calibrated(&self) -> bool {
        false
    }

    fn fit(
        &self,
        schema: &FeatureSchema,
        training: &[LabeledVector],
    ) -> Result<Model, EngineError> {
        check_training_set(schema, training)?;

        let lambda = self.regularization.max(1e-9);
        let mut weights = vec![0.0f64; schema.len()];
        let mut bias = 0.0f64;

        let mut order: Vec<usize> = (0..training.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut t = 0usize;
        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                t += 1;
                let eta = 1.0 / (lambda * t as f64);
                let sample = &training[i];
                let y = if sample.is_match { 1.0 } else { -1.0 };

                let margin = dot(&weights, &sample.vector.values) + bias;
                let decay = 1.0 - eta * lambda;
                for w in &mut weights {
                    *w *= decay;
                }
                if y * margin < 1.0 {
                    for (w, x) in weights.iter_mut().zip(&sample.vector.values) {
                        *w += eta * y * x;
                    }
                    bias += eta * y;
                }
            }
        }

        Ok(Model::new(
            self.algorithm(),
            schema.clone(),
            ModelParams::Linear { weights, bias },
            training.len(),
        ))
    }

    fn predict(&self, model: &Model, vector: &FeatureVector) -> Result<f64, EngineError> {
        check_vector(model, vector)?;

        let ModelParams::Linear { weights, bias } = &model.params else {
            return Err(EngineError::ModelArtifact(format!(
                "model parameters are not linear (algorithm says {})",
                model.algorithm
            )));
        };

        Ok(dot(weights, &vector.values) + bias)
    }
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, x)| w * x).sum()
}
