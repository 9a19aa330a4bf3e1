//! Single logistic unit trained by stochastic gradient descent on
//! log loss. The shallow stand-in for a neural classifier: same
//! sigmoid output, none of the hidden-layer machinery.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::EngineError;
use crate::model::{FeatureSchema, FeatureVector, LabeledVector, Model, ModelParams};

use super::{check_training_set, check_vector, Classifier};

pub struct Perceptron {
    epochs: usize,
    learning_rate: f64,
    seed: u64,
}

impl Perceptron {
    pub fn new(epochs: usize, learning_rate: f64, seed: u64) -> Self {
        Self { epochs, learning_rate, seed }
    }
}

impl Classifier for Perceptron {
    fn algorithm(&self) -> &'static str {
        "perceptron"
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

        let mut weights = vec![0.0f64; schema.len()];
        let mut bias = 0.0f64;

        let mut order: Vec<usize> = (0..training.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);

        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let sample = &training[i];
                let y = if sample.is_match { 1.0 } else { 0.0 };
                let p = sigmoid(dot(&weights, &sample.vector.values) + bias);
                let error = y - p;

                for (w, x) in weights.iter_mut().zip(&sample.vector.values) {
                    *w += self.learning_rate * error * x;
                }
                bias += self.learning_rate * error;
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

        Ok(sigmoid(dot(weights, &vector.values) + bias))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, x)| w * x).sum()
}

#[cfg(test)]
mod tests {
    use super::super::tests::{schema2, separable_training};
    use super::*;
    use crate::model::CandidatePair;

    fn vector(values: Vec<f64>) -> FeatureVector {
        FeatureVector { pair: CandidatePair::new("Q9", "T9"), values }
    }

    #[test]
    fn outputs_are_probabilities_that_separate() {
        let classifier = Perceptron::new(200, 0.5, 42);
        let model = classifier.fit(&schema2(), &separable_training()).unwrap();

        let high = classifier.predict(&model, &vector(vec![1.0, 1.0])).unwrap();
        let low = classifier.predict(&model, &vector(vec![0.0, 0.0])).unwrap();

        assert!((0.0..=1.0).contains(&high));
        assert!((0.0..=1.0).contains(&low));
        assert!(high > 0.7, "expected confident match, got {high}");
        assert!(low < 0.3, "expected confident non-match, got {low}");
    }

    #[test]
    fn training_is_reproducible() {
        let training = separable_training();
        let a = Perceptron::new(50, 0.1, 3).fit(&schema2(), &training).unwrap();
        let b = Perceptron::new(50, 0.1, 3).fit(&schema2(), &training).unwrap();

        let (ModelParams::Linear { weights: wa, bias: ba },
             ModelParams::Linear { weights: wb, bias: bb }) = (&a.params, &b.params)
        else {
            panic!("expected linear params");
        };
        assert_eq!(wa, wb);
        assert_eq!(ba, bb);
    }
}
