//! Pipeline orchestration. `run` links two collections, `train` fits a
//! model from ground truth, `evaluate` cross-validates a configuration
//! without keeping the model.
//!
//! Per-entity and per-pair problems are collected into the result;
//! only setup, config, and training failures abort a call.

use std::collections::{BTreeMap, BTreeSet};

use corefer_core::{Collection, Entity, EntityId};
use rayon::prelude::*;
use tracing::info;

use crate::baseline::{self, RuleBasedLinker};
use crate::block;
use crate::classify::{self, Classifier};
use crate::config::{Algorithm, ResolutionConfig};
use crate::decide::{self, DecisionContext};
use crate::error::{EngineError, EntityError};
use crate::evaluate::{cross_validate, EvaluationReport};
use crate::features::FeatureExtractor;
use crate::model::{
    CandidatePair, DecisionLabel, FeatureVector, LabeledVector, LinkDecision, Model,
    ResolutionMeta, ResolutionResult, ResolutionSummary,
};

/// Pre-loaded entities for one run. The engine never reads files or
/// databases itself.
#[derive(Debug, Clone, Default)]
pub struct ResolutionInput {
    pub source: Vec<Entity>,
    pub target: Vec<Entity>,
}

// ---------------------------------------------------------------------------
// Entity validation
// ---------------------------------------------------------------------------

/// Drop malformed entities and report them. Keeps the first of any
/// duplicated id.
fn validate_entities(
    entities: &[Entity],
    expected: Collection,
    errors: &mut Vec<EntityError>,
) -> Vec<Entity> {
    let mut seen: BTreeSet<EntityId> = BTreeSet::new();
    let mut valid = Vec::with_capacity(entities.len());

    for entity in entities {
        if entity.id.as_str().is_empty() {
            errors.push(EntityError {
                entity: entity.id.clone(),
                reason: "empty entity id".into(),
            });
            continue;
        }
        if entity.collection != expected {
            errors.push(EntityError {
                entity: entity.id.clone(),
                reason: format!(
                    "expected collection {:?}, got {:?}",
                    expected, entity.collection
                ),
            });
            continue;
        }
        if !seen.insert(entity.id.clone()) {
            errors.push(EntityError {
                entity: entity.id.clone(),
                reason: "duplicate entity id".into(),
            });
            continue;
        }
        valid.push(entity.clone());
    }

    valid
}

fn index(entities: &[Entity]) -> BTreeMap<EntityId, &Entity> {
    entities.iter().map(|e| (e.id.clone(), e)).collect()
}

// ---------------------------------------------------------------------------
// Linking
// ---------------------------------------------------------------------------

/// Link the two collections. Without a model the rule-based linker
/// decides everything; with one, the rules still pre-accept the
/// certain pairs and the classifier scores the rest.
pub fn run(
    config: &ResolutionConfig,
    input: &ResolutionInput,
    model: Option<&Model>,
) -> Result<ResolutionResult, EngineError> {
    config.validate()?;

    if model.is_none() && !config.baseline.enabled {
        return Err(EngineError::ConfigValidation(
            "no model supplied and the rule-based baseline is disabled".into(),
        ));
    }

    let mut entity_errors = Vec::new();
    let source = validate_entities(&input.source, Collection::Source, &mut entity_errors);
    let target = validate_entities(&input.target, Collection::Target, &mut entity_errors);

    let strategies = block::strategies_from_config(
        &config.blocking,
        &config.attributes.name,
        &config.attributes.link,
    );
    let pairs = block::block(&source, &target, &strategies);
    info!(
        candidates = pairs.len(),
        source = source.len(),
        target = target.len(),
        excluded = entity_errors.len(),
        "blocking done"
    );

    let source_index = index(&source);
    let target_index = index(&target);

    let linker = RuleBasedLinker::from_config(&config.baseline, &config.attributes);
    let mut decisions: Vec<LinkDecision> = Vec::with_capacity(pairs.len());
    let mut remaining: Vec<CandidatePair> = Vec::new();

    for pair in &pairs {
        let (Some(s), Some(t)) = (source_index.get(&pair.source), target_index.get(&pair.target))
        else {
            continue;
        };
        if config.baseline.enabled && linker.accepts(s, t) {
            decisions.push(linker.decide(pair, s, t));
        } else {
            remaining.push(pair.clone());
        }
    }
    if config.baseline.enabled {
        info!(accepted = decisions.len(), "rule-based pass done");
    }

    let mut pair_errors = Vec::new();
    match model {
        Some(model) => {
            let extractor = FeatureExtractor::from_config(&config.features, &config.attributes);
            let schema = extractor.schema();
            if schema != model.schema {
                return Err(EngineError::ModelArtifact(format!(
                    "model was trained on schema {:?}, config produces {:?}",
                    model.schema.labels, schema.labels
                )));
            }

            let classifier = classifier_for_model(model, config)?;

            let vectors: Vec<FeatureVector> = remaining
                .par_iter()
                .filter_map(|pair| {
                    let s = source_index.get(&pair.source)?;
                    let t = target_index.get(&pair.target)?;
                    Some(extractor.extract(pair, s, t))
                })
                .collect();
            info!(vectors = vectors.len(), "feature extraction done");

            let (scores, mut errors) = classify::predict_batch(classifier.as_ref(), model, &vectors);
            pair_errors.append(&mut errors);

            let context = DecisionContext {
                config: &config.decision,
                attributes: &config.attributes,
                calibrated: classifier.calibrated(),
                strategy: &model.algorithm,
            };
            decisions.extend(decide::decide_scores(
                &scores,
                &source_index,
                &target_index,
                &context,
            ));
        }
        None => {
            // Baseline-only run: everything the rules did not accept
            // is a non-match.
            for pair in &remaining {
                decisions.push(LinkDecision {
                    source: pair.source.clone(),
                    target: pair.target.clone(),
                    label: DecisionLabel::NonMatch,
                    confidence: None,
                    strategy: baseline::STRATEGY.into(),
                });
            }
        }
    }

    decisions.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
    decide::supersede(&mut decisions);

    let summary = ResolutionSummary::compute(&decisions);
    info!(
        matches = summary.matches,
        undecided = summary.undecided,
        superseded = summary.superseded,
        pair_errors = pair_errors.len(),
        "run done"
    );

    Ok(ResolutionResult {
        meta: ResolutionMeta {
            config_name: config.name.clone(),
            strategy: model
                .map(|m| m.algorithm.clone())
                .unwrap_or_else(|| baseline::STRATEGY.into()),
            engine_version: env!("CARGO_PKG_VERSION").into(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        decisions,
        entity_errors,
        pair_errors,
    })
}

fn classifier_for_model(
    model: &Model,
    config: &ResolutionConfig,
) -> Result<Box<dyn Classifier + Send + Sync>, EngineError> {
    let algorithm = match model.algorithm.as_str() {
        "naive_bayes" => Algorithm::NaiveBayes,
        "linear_svm" => Algorithm::LinearSvm,
        "perceptron" => Algorithm::Perceptron,
        other => return Err(EngineError::UnknownAlgorithm(other.to_string())),
    };
    Ok(classify::classifier_for(algorithm, &config.classifier))
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Fit a model from a ground-truth link map (source id → target id).
/// Positives come straight from the map; negatives are the blocked
/// candidates the map does not confirm.
pub fn train(
    config: &ResolutionConfig,
    input: &ResolutionInput,
    links: &BTreeMap<EntityId, EntityId>,
) -> Result<Model, EngineError> {
    config.validate()?;

    let mut entity_errors = Vec::new();
    let source = validate_entities(&input.source, Collection::Source, &mut entity_errors);
    let target = validate_entities(&input.target, Collection::Target, &mut entity_errors);

    let samples = labeled_vectors(config, &source, &target, links);
    info!(
        samples = samples.len(),
        positives = samples.iter().filter(|s| s.is_match).count(),
        "training set assembled"
    );

    let extractor = FeatureExtractor::from_config(&config.features, &config.attributes);
    let classifier = classify::classifier_for(config.classifier.algorithm, &config.classifier);
    classifier.fit(&extractor.schema(), &samples)
}

/// Cross-validate the configured classifier on the ground truth.
pub fn evaluate(
    config: &ResolutionConfig,
    input: &ResolutionInput,
    links: &BTreeMap<EntityId, EntityId>,
) -> Result<EvaluationReport, EngineError> {
    config.validate()?;

    let mut entity_errors = Vec::new();
    let source = validate_entities(&input.source, Collection::Source, &mut entity_errors);
    let target = validate_entities(&input.target, Collection::Target, &mut entity_errors);

    let samples = labeled_vectors(config, &source, &target, links);
    let extractor = FeatureExtractor::from_config(&config.features, &config.attributes);
    let classifier = classify::classifier_for(config.classifier.algorithm, &config.classifier);

    cross_validate(
        classifier.as_ref(),
        &extractor.schema(),
        &samples,
        &config.evaluation,
        config.decision.threshold,
    )
}

/// Positive vectors for every confirmed link whose entities exist,
/// negative vectors for every blocked candidate the ground truth does
/// not confirm.
fn labeled_vectors(
    config: &ResolutionConfig,
    source: &[Entity],
    target: &[Entity],
    links: &BTreeMap<EntityId, EntityId>,
) -> Vec<LabeledVector> {
    let source_index = index(source);
    let target_index = index(target);
    let extractor = FeatureExtractor::from_config(&config.features, &config.attributes);

    let mut samples = Vec::new();

    for (source_id, target_id) in links {
        let (Some(s), Some(t)) = (source_index.get(source_id), target_index.get(target_id))
        else {
            continue;
        };
        let pair = CandidatePair { source: source_id.clone(), target: target_id.clone() };
        samples.push(LabeledVector { vector: extractor.extract(&pair, s, t), is_match: true });
    }

    let strategies = block::strategies_from_config(
        &config.blocking,
        &config.attributes.name,
        &config.attributes.link,
    );
    let candidates = block::block(source, target, &strategies);

    let negatives: Vec<LabeledVector> = candidates
        .par_iter()
        .filter(|pair| links.get(&pair.source) != Some(&pair.target))
        .filter_map(|pair| {
            let s = source_index.get(&pair.source)?;
            let t = target_index.get(&pair.target)?;
            Some(LabeledVector { vector: extractor.extract(pair, s, t), is_match: false })
        })
        .collect();

    samples.extend(negatives);
    samples
}
