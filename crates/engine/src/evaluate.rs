//! Stratified k-fold cross-validation. Each fold keeps the overall
//! match/non-match ratio, so a heavily imbalanced training set does
//! not produce folds with no positives at all.
//!
//! The fold assignment is fully determined by the seed: per-class
//! seeded shuffle, then a round-robin deal into k buckets.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::classify::Classifier;
use crate::config::EvaluationConfig;
use crate::error::EngineError;
use crate::model::{FeatureSchema, LabeledVector};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    /// Zero denominators yield 0.0, never NaN.
    pub fn from_counts(true_positives: usize, false_positives: usize, false_negatives: usize) -> Self {
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self { precision, recall, f1 }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub algorithm: String,
    pub k: usize,
    pub folds: Vec<Metrics>,
    pub mean: Metrics,
    pub std_dev: Metrics,
}

// ---------------------------------------------------------------------------
// Cross-validation
// ---------------------------------------------------------------------------

pub fn cross_validate(
    classifier: &(dyn Classifier + Send + Sync),
    schema: &FeatureSchema,
    samples: &[LabeledVector],
    config: &EvaluationConfig,
    threshold: f64,
) -> Result<EvaluationReport, EngineError> {
    let k = config.k_folds;
    let folds = stratified_folds(samples, k, config.seed)?;

    let mut fold_metrics = Vec::with_capacity(k);
    for (fold, held_out) in folds.iter().enumerate() {
        let train_set: Vec<LabeledVector> = folds
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != fold)
            .flat_map(|(_, indices)| indices.iter().map(|&i| samples[i].clone()))
            .collect();

        let model = classifier.fit(schema, &train_set)?;

        let mut true_positives = 0;
        let mut false_positives = 0;
        let mut false_negatives = 0;
        for &i in held_out {
            let sample = &samples[i];
            let score = classifier.predict(&model, &sample.vector)?;
            let predicted_match = if classifier.calibrated() {
                score >= threshold
            } else {
                score > 0.0
            };
            match (predicted_match, sample.is_match) {
                (true, true) => true_positives += 1,
                (true, false) => false_positives += 1,
                (false, true) => false_negatives += 1,
                (false, false) => {}
            }
        }

        let metrics = Metrics::from_counts(true_positives, false_positives, false_negatives);
        info!(
            fold,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            "fold evaluated"
        );
        fold_metrics.push(metrics);
    }

    let (mean, std_dev) = aggregate(&fold_metrics);
    Ok(EvaluationReport {
        algorithm: classifier.algorithm().to_string(),
        k,
        folds: fold_metrics,
        mean,
        std_dev,
    })
}

/// Per-class shuffle and round-robin deal. Errors when any fold would
/// end up without a representative of some class.
fn stratified_folds(
    samples: &[LabeledVector],
    k: usize,
    seed: u64,
) -> Result<Vec<Vec<usize>>, EngineError> {
    if k < 2 {
        return Err(EngineError::Training(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }

    let mut positives: Vec<usize> = Vec::new();
    let mut negatives: Vec<usize> = Vec::new();
    for (i, sample) in samples.iter().enumerate() {
        if sample.is_match {
            positives.push(i);
        } else {
            negatives.push(i);
        }
    }

    let minority = positives.len().min(negatives.len());
    if minority < k {
        return Err(EngineError::Training(format!(
            "cannot stratify {k} folds: minority class has only {minority} samples"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    positives.shuffle(&mut rng);
    negatives.shuffle(&mut rng);

    let mut folds = vec![Vec::new(); k];
    for (position, index) in positives.into_iter().chain(negatives).enumerate() {
        folds[position % k].push(index);
    }

    Ok(folds)
}

fn aggregate(folds: &[Metrics]) -> (Metrics, Metrics) {
    let k = folds.len() as f64;
    let mean = Metrics {
        precision: folds.iter().map(|m| m.precision).sum::<f64>() / k,
        recall: folds.iter().map(|m| m.recall).sum::<f64>() / k,
        f1: folds.iter().map(|m| m.f1).sum::<f64>() / k,
    };
    let variance = |pick: fn(&Metrics) -> f64, center: f64| -> f64 {
        (folds.iter().map(|m| (pick(m) - center).powi(2)).sum::<f64>() / k).sqrt()
    };
    let std_dev = Metrics {
        precision: variance(|m| m.precision, mean.precision),
        recall: variance(|m| m.recall, mean.recall),
        f1: variance(|m| m.f1, mean.f1),
    };
    (mean, std_dev)
}
