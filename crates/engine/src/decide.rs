//! Decision layer: turns raw classifier scores into labeled link
//! decisions, applies the configured guard rules, and resolves
//! competing matches for the same source entity.
//!
//! Calibrated scores are thresholded with an optional undecided band;
//! uncalibrated margins carry only their sign and never produce a
//! confidence value.

use std::collections::{BTreeMap, BTreeSet};

use corefer_core::{normalize, Entity, EntityId};
use tracing::debug;

use crate::config::{AttributeConfig, DecisionConfig};
use crate::model::{CandidatePair, DecisionLabel, LinkDecision};

// ---------------------------------------------------------------------------
// Score thresholding
// ---------------------------------------------------------------------------

/// Label one calibrated score. The undecided band sits directly below
/// the threshold: [threshold - band, threshold).
fn label_calibrated(score: f64, config: &DecisionConfig) -> (DecisionLabel, Option<f64>) {
    if score >= config.threshold {
        (DecisionLabel::Match, Some(score))
    } else if score >= config.threshold - config.undecided_band {
        (DecisionLabel::Undecided, Some(score))
    } else {
        (DecisionLabel::NonMatch, Some(score))
    }
}

/// An uncalibrated margin only has a usable sign.
fn label_margin(score: f64) -> (DecisionLabel, Option<f64>) {
    if score > 0.0 {
        (DecisionLabel::Match, None)
    } else {
        (DecisionLabel::NonMatch, None)
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

fn name_token_set(entity: &Entity, attribute: &str) -> BTreeSet<String> {
    entity
        .names(attribute)
        .map(|names| names.iter().flat_map(|n| normalize::name_tokens(n)).collect())
        .unwrap_or_default()
}

/// True when the entities share at least one normalized name token.
fn shares_name_token(source: &Entity, target: &Entity, attribute: &str) -> bool {
    let source_tokens = name_token_set(source, attribute);
    if source_tokens.is_empty() {
        return false;
    }
    let target_tokens = name_token_set(target, attribute);
    source_tokens.intersection(&target_tokens).next().is_some()
}

/// Which known source ids appear as a segment of the target's links.
/// A catalog record that cites its own source-side identifier is
/// stronger evidence than any classifier score.
fn embedded_source_ids(
    target: &Entity,
    link_attribute: &str,
    source_ids: &BTreeMap<String, EntityId>,
) -> BTreeSet<EntityId> {
    let Some(links) = target.links(link_attribute) else {
        return BTreeSet::new();
    };

    let mut found = BTreeSet::new();
    for link in links {
        let normalized = normalize::normalize_url(link);
        for segment in normalized.split(['/', '=', '?', '&']) {
            if let Some(id) = source_ids.get(&segment.to_lowercase()) {
                found.insert(id.clone());
            }
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Per-pair decisions
// ---------------------------------------------------------------------------

pub struct DecisionContext<'a> {
    pub config: &'a DecisionConfig,
    pub attributes: &'a AttributeConfig,
    pub calibrated: bool,
    pub strategy: &'a str,
}

/// Label every scored pair. Scores arrive keyed by pair, so the output
/// order is deterministic.
pub fn decide_scores(
    scores: &BTreeMap<CandidatePair, f64>,
    source_index: &BTreeMap<EntityId, &Entity>,
    target_index: &BTreeMap<EntityId, &Entity>,
    context: &DecisionContext<'_>,
) -> Vec<LinkDecision> {
    let source_ids: BTreeMap<String, EntityId> = source_index
        .keys()
        .map(|id| (id.as_str().to_lowercase(), id.clone()))
        .collect();
    let mut decisions = Vec::with_capacity(scores.len());

    for (pair, &score) in scores {
        let (mut label, mut confidence) = if context.calibrated {
            label_calibrated(score, context.config)
        } else {
            label_margin(score)
        };

        let source = source_index.get(&pair.source);
        let target = target_index.get(&pair.target);

        if let (Some(source), Some(target)) = (source, target) {
            if context.config.zero_when_different_names
                && !shares_name_token(source, target, &context.attributes.name)
            {
                label = DecisionLabel::NonMatch;
                confidence = context.calibrated.then_some(0.0);
            }

            // The link override outranks the name guard.
            if context.config.override_on_source_link {
                let embedded =
                    embedded_source_ids(target, &context.attributes.link, &source_ids);
                if embedded.contains(&pair.source) {
                    label = DecisionLabel::Match;
                    confidence = Some(1.0);
                } else if !embedded.is_empty() {
                    label = DecisionLabel::NonMatch;
                    confidence = context.calibrated.then_some(0.0);
                }
            }
        }

        decisions.push(LinkDecision {
            source: pair.source.clone(),
            target: pair.target.clone(),
            label,
            confidence,
            strategy: context.strategy.to_string(),
        });
    }

    decisions
}

// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// One match per source entity. Among competing matches the highest
/// confidence wins; a match without confidence loses to any match with
/// one; ties go to the smaller target id. Losers stay in the output as
/// `Superseded`, so the alternatives remain auditable.
pub fn supersede(decisions: &mut [LinkDecision]) {
    let mut best: BTreeMap<EntityId, usize> = BTreeMap::new();

    for (i, decision) in decisions.iter().enumerate() {
        if decision.label != DecisionLabel::Match {
            continue;
        }
        match best.get(&decision.source) {
            None => {
                best.insert(decision.source.clone(), i);
            }
            Some(&current) => {
                if outranks(decision, &decisions[current]) {
                    best.insert(decision.source.clone(), i);
                }
            }
        }
    }

    let mut demoted = 0usize;
    for (i, decision) in decisions.iter_mut().enumerate() {
        if decision.label == DecisionLabel::Match && best.get(&decision.source) != Some(&i) {
            decision.label = DecisionLabel::Superseded;
            demoted += 1;
        }
    }

    if demoted > 0 {
        debug!(demoted, "competing matches superseded");
    }
}

fn outranks(challenger: &LinkDecision, incumbent: &LinkDecision) -> bool {
    match (challenger.confidence, incumbent.confidence) {
        (Some(a), Some(b)) if a != b => a > b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        // Equal confidence (or both absent): smaller target id wins.
        _ => challenger.target < incumbent.target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corefer_core::{AttributeValue, Collection};

    fn context<'a>(
        config: &'a DecisionConfig,
        attributes: &'a AttributeConfig,
        calibrated: bool,
    ) -> DecisionContext<'a> {
        DecisionContext { config, attributes, calibrated, strategy: "naive_bayes" }
    }

    fn person(id: &str, collection: Collection, name: &str) -> Entity {
        Entity::new(id, collection)
            .with_attribute("name", AttributeValue::Names(vec![name.to_string()]))
    }

    fn indexed(entities: &[Entity]) -> BTreeMap<EntityId, &Entity> {
        entities.iter().map(|e| (e.id.clone(), e)).collect()
    }

    #[test]
    fn calibrated_scores_split_into_three_bands() {
        let config = DecisionConfig { threshold: 0.6, undecided_band: 0.1, ..Default::default() };
        assert_eq!(label_calibrated(0.9, &config), (DecisionLabel::Match, Some(0.9)));
        assert_eq!(label_calibrated(0.55, &config), (DecisionLabel::Undecided, Some(0.55)));
        assert_eq!(label_calibrated(0.3, &config), (DecisionLabel::NonMatch, Some(0.3)));
        // boundary: exactly at threshold is a match
        assert_eq!(label_calibrated(0.6, &config).0, DecisionLabel::Match);
    }

    #[test]
    fn margins_never_carry_confidence() {
        assert_eq!(label_margin(2.3), (DecisionLabel::Match, None));
        assert_eq!(label_margin(-0.4), (DecisionLabel::NonMatch, None));
        assert_eq!(label_margin(0.0), (DecisionLabel::NonMatch, None));
    }

    #[test]
    fn different_names_guard_forces_non_match() {
        let source = [person("Q1", Collection::Source, "Ada Lovelace")];
        let target = [person("T1", Collection::Target, "Miles Davis")];

        let mut scores = BTreeMap::new();
        scores.insert(CandidatePair::new("Q1", "T1"), 0.95);

        let config = DecisionConfig { zero_when_different_names: true, ..Default::default() };
        let attributes = AttributeConfig::default();
        let decisions = decide_scores(
            &scores,
            &indexed(&source),
            &indexed(&target),
            &context(&config, &attributes, true),
        );

        assert_eq!(decisions[0].label, DecisionLabel::NonMatch);
        assert_eq!(decisions[0].confidence, Some(0.0));
    }

    #[test]
    fn source_link_override_beats_the_score() {
        let source = [person("Q42", Collection::Source, "Douglas Adams")];
        let target = [person("T1", Collection::Target, "D. Adams").with_attribute(
            "link",
            AttributeValue::Links(vec!["https://example.org/wiki/q42".into()]),
        )];

        let mut scores = BTreeMap::new();
        scores.insert(CandidatePair::new("Q42", "T1"), 0.1);

        let config = DecisionConfig { override_on_source_link: true, ..Default::default() };
        let attributes = AttributeConfig::default();
        let decisions = decide_scores(
            &scores,
            &indexed(&source),
            &indexed(&target),
            &context(&config, &attributes, true),
        );

        assert_eq!(decisions[0].label, DecisionLabel::Match);
        assert_eq!(decisions[0].confidence, Some(1.0));
    }

    #[test]
    fn foreign_source_link_forces_non_match() {
        let source = [
            person("Q1", Collection::Source, "John Smith"),
            person("Q2", Collection::Source, "John Smyth"),
        ];
        // T1 cites Q2, so pairing it with Q1 is contradicted.
        let target = [person("T1", Collection::Target, "John Smith").with_attribute(
            "link",
            AttributeValue::Links(vec!["https://example.org/wiki/q2".into()]),
        )];

        let mut scores = BTreeMap::new();
        scores.insert(CandidatePair::new("Q1", "T1"), 0.99);

        let config = DecisionConfig { override_on_source_link: true, ..Default::default() };
        let attributes = AttributeConfig::default();
        let decisions = decide_scores(
            &scores,
            &indexed(&source),
            &indexed(&target),
            &context(&config, &attributes, true),
        );

        assert_eq!(decisions[0].label, DecisionLabel::NonMatch);
    }

    #[test]
    fn highest_confidence_match_supersedes_the_rest() {
        let d = |target: &str, confidence: Option<f64>| LinkDecision {
            source: EntityId::new("Q1"),
            target: EntityId::new(target),
            label: DecisionLabel::Match,
            confidence,
            strategy: "naive_bayes".into(),
        };

        let mut decisions = vec![d("T1", Some(0.7)), d("T2", Some(0.9)), d("T3", None)];
        supersede(&mut decisions);

        assert_eq!(decisions[0].label, DecisionLabel::Superseded);
        assert_eq!(decisions[1].label, DecisionLabel::Match);
        assert_eq!(decisions[2].label, DecisionLabel::Superseded);
        // losers keep their original confidence for auditing
        assert_eq!(decisions[0].confidence, Some(0.7));
    }

    #[test]
    fn confidence_tie_goes_to_smaller_target_id() {
        let d = |target: &str| LinkDecision {
            source: EntityId::new("Q1"),
            target: EntityId::new(target),
            label: DecisionLabel::Match,
            confidence: Some(0.8),
            strategy: "baseline".into(),
        };

        let mut decisions = vec![d("T9"), d("T2")];
        supersede(&mut decisions);

        assert_eq!(decisions[0].label, DecisionLabel::Superseded);
        assert_eq!(decisions[1].label, DecisionLabel::Match);
    }

    #[test]
    fn matches_for_different_sources_do_not_compete() {
        let d = |source: &str, target: &str| LinkDecision {
            source: EntityId::new(source),
            target: EntityId::new(target),
            label: DecisionLabel::Match,
            confidence: Some(0.9),
            strategy: "baseline".into(),
        };

        let mut decisions = vec![d("Q1", "T1"), d("Q2", "T2")];
        supersede(&mut decisions);
        assert!(decisions.iter().all(|d| d.label == DecisionLabel::Match));
    }
}
