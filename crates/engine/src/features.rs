//! Pairwise feature extraction: one comparator per attribute family,
//! each yielding a score in [0, 1].
//!
//! Multi-valued attributes take the **maximum** pairwise score over
//! the cross-product of values, never the average: one strong alias
//! match must not be diluted by weak ones. Missing attributes score
//! 0.0 — classifiers downstream cannot handle holes.

use std::collections::BTreeSet;

use corefer_core::{normalize, Entity, PartialDate};
use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, levenshtein};

use crate::config::{AttributeConfig, FeatureConfig};
use crate::model::{CandidatePair, FeatureSchema, FeatureVector};

/// Score used when either side lacks the compared attribute.
pub const MISSING_SCORE: f64 = 0.0;

// ---------------------------------------------------------------------------
// Feature kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    ExactNames,
    LevenshteinNames,
    JaroWinklerNames,
    SimilarDates,
    SharedTokens,
    SharedLinks,
}

impl FeatureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExactNames => "exact_names",
            Self::LevenshteinNames => "levenshtein_names",
            Self::JaroWinklerNames => "jaro_winkler_names",
            Self::SimilarDates => "similar_dates",
            Self::SharedTokens => "shared_tokens",
            Self::SharedLinks => "shared_links",
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Stateless extractor bound to one feature schema. Re-extracting the
/// same pair always yields the identical vector.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    kinds: Vec<FeatureKind>,
    attributes: AttributeConfig,
    levenshtein_threshold: Option<f64>,
    jaro_winkler_threshold: Option<f64>,
}

impl FeatureExtractor {
    pub fn from_config(features: &FeatureConfig, attributes: &AttributeConfig) -> Self {
        Self {
            kinds: features.set.clone(),
            attributes: attributes.clone(),
            levenshtein_threshold: features.levenshtein_threshold,
            jaro_winkler_threshold: features.jaro_winkler_threshold,
        }
    }

    /// The schema every vector from this extractor conforms to.
    /// Feature order and count are stable for the extractor's lifetime.
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.kinds.iter().map(|k| k.label().to_string()).collect())
    }

    pub fn extract(&self, pair: &CandidatePair, source: &Entity, target: &Entity) -> FeatureVector {
        let values = self
            .kinds
            .iter()
            .map(|kind| self.compute(*kind, source, target))
            .collect();

        FeatureVector { pair: pair.clone(), values }
    }

    fn compute(&self, kind: FeatureKind, source: &Entity, target: &Entity) -> f64 {
        let attr = &self.attributes;
        match kind {
            FeatureKind::ExactNames => {
                max_over_names(source, target, &attr.name, |a, b| {
                    if a == b {
                        1.0
                    } else {
                        0.0
                    }
                })
            }
            FeatureKind::LevenshteinNames => binarize(
                max_over_names(source, target, &attr.name, levenshtein_similarity),
                self.levenshtein_threshold,
            ),
            FeatureKind::JaroWinklerNames => binarize(
                max_over_names(source, target, &attr.name, |a, b| jaro_winkler(a, b)),
                self.jaro_winkler_threshold,
            ),
            FeatureKind::SimilarDates => {
                let (Some(source_dates), Some(target_dates)) =
                    (source.dates(&attr.date), target.dates(&attr.date))
                else {
                    return MISSING_SCORE;
                };
                date_agreement(source_dates, target_dates)
            }
            FeatureKind::SharedTokens => {
                let (Some(source_tokens), Some(target_tokens)) =
                    (source.tokens(&attr.tokens), target.tokens(&attr.tokens))
                else {
                    return MISSING_SCORE;
                };
                shared_tokens(source_tokens, target_tokens)
            }
            FeatureKind::SharedLinks => {
                let (Some(source_links), Some(target_links)) =
                    (source.links(&attr.link), target.links(&attr.link))
                else {
                    return MISSING_SCORE;
                };
                link_agreement(source_links, target_links)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Comparators
// ---------------------------------------------------------------------------

/// Bounded edit-distance similarity: 1 − distance / max_len, in [0, 1].
/// Raw Levenshtein distance is unbounded and useless as a feature.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Best shared-precision agreement over the cross-product of dates.
pub fn date_agreement(source_dates: &[PartialDate], target_dates: &[PartialDate]) -> f64 {
    let mut best: f64 = 0.0;
    for s in source_dates {
        for t in target_dates {
            best = best.max(s.agreement(t));
        }
    }
    best
}

/// Token-set overlap: |intersection| / min(|source|, |target|). The
/// min-length denominator rewards one side being a subset of the
/// other, which a union denominator would punish.
pub fn shared_tokens(source_tokens: &[String], target_tokens: &[String]) -> f64 {
    // A fully bracketed value normalizes to "" on both sides; it must
    // not count as a shared token.
    let normalized = |tokens: &[String]| -> BTreeSet<String> {
        tokens
            .iter()
            .map(|t| normalize::normalize_string(t))
            .filter(|t| !t.is_empty())
            .collect()
    };
    let source_set = normalized(source_tokens);
    let target_set = normalized(target_tokens);

    let min_len = source_set.len().min(target_set.len());
    if min_len == 0 {
        return MISSING_SCORE;
    }

    let shared = source_set.intersection(&target_set).count();
    shared as f64 / min_len as f64
}

/// 1.0 iff any URL pair is identical after normalization.
pub fn link_agreement(source_links: &[String], target_links: &[String]) -> f64 {
    let target_set: BTreeSet<String> =
        target_links.iter().map(|l| normalize::normalize_url(l)).collect();

    for link in source_links {
        if target_set.contains(&normalize::normalize_url(link)) {
            return 1.0;
        }
    }
    MISSING_SCORE
}

fn max_over_names(
    source: &Entity,
    target: &Entity,
    attribute: &str,
    score: impl Fn(&str, &str) -> f64,
) -> f64 {
    let (Some(source_names), Some(target_names)) =
        (source.names(attribute), target.names(attribute))
    else {
        return MISSING_SCORE;
    };

    let source_normalized: Vec<String> =
        source_names.iter().map(|n| normalize::normalize_string(n)).collect();
    let target_normalized: Vec<String> =
        target_names.iter().map(|n| normalize::normalize_string(n)).collect();

    let mut best: f64 = MISSING_SCORE;
    for s in &source_normalized {
        for t in &target_normalized {
            best = best.max(score(s, t));
        }
    }
    best
}

fn binarize(score: f64, threshold: Option<f64>) -> f64 {
    match threshold {
        Some(t) => {
            if score >= t {
                1.0
            } else {
                0.0
            }
        }
        None => score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;
    use corefer_core::{AttributeValue, Collection};

    fn extractor(set: Vec<FeatureKind>) -> FeatureExtractor {
        FeatureExtractor::from_config(
            &FeatureConfig { set, levenshtein_threshold: None, jaro_winkler_threshold: None },
            &AttributeConfig::default(),
        )
    }

    fn source_person(names: &[&str]) -> Entity {
        Entity::new("Q1", Collection::Source).with_attribute(
            "name",
            AttributeValue::Names(names.iter().map(|s| s.to_string()).collect()),
        )
    }

    fn target_person(names: &[&str]) -> Entity {
        Entity::new("T1", Collection::Target).with_attribute(
            "name",
            AttributeValue::Names(names.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[test]
    fn schema_tracks_configured_order() {
        let e = extractor(vec![FeatureKind::SharedLinks, FeatureKind::ExactNames]);
        assert_eq!(e.schema().labels, ["shared_links", "exact_names"]);
    }

    #[test]
    fn alias_max_beats_average() {
        // {"bob", "robert"} vs "robert": the maximum must be 1.0, an
        // average would dilute the strong match.
        let source = source_person(&["bob", "robert"]);
        let target = target_person(&["robert"]);

        let e = extractor(vec![FeatureKind::ExactNames, FeatureKind::LevenshteinNames]);
        let pair = CandidatePair::new("Q1", "T1");
        let vector = e.extract(&pair, &source, &target);

        assert_eq!(vector.values, [1.0, 1.0]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let source = source_person(&["Antonín Dvořák"]).with_attribute(
            "born",
            AttributeValue::Dates(vec![PartialDate::full(1841, 9, 8)]),
        );
        let target = target_person(&["Antonin Dvorak"]).with_attribute(
            "born",
            AttributeValue::Dates(vec![PartialDate::year(1841)]),
        );

        let e = extractor(vec![
            FeatureKind::ExactNames,
            FeatureKind::JaroWinklerNames,
            FeatureKind::SimilarDates,
        ]);
        let pair = CandidatePair::new("Q1", "T1");

        let first = e.extract(&pair, &source, &target);
        let second = e.extract(&pair, &source, &target);
        assert_eq!(first, second);
        assert_eq!(first.values[0], 1.0); // diacritics fold away
        assert_eq!(first.values[2], 1.0); // year-precision agreement
    }

    #[test]
    fn missing_attributes_score_zero_not_nan() {
        let source = source_person(&["Someone"]);
        let target = Entity::new("T1", Collection::Target);

        let e = extractor(vec![
            FeatureKind::ExactNames,
            FeatureKind::SimilarDates,
            FeatureKind::SharedTokens,
            FeatureKind::SharedLinks,
        ]);
        let vector = e.extract(&CandidatePair::new("Q1", "T1"), &source, &target);

        assert_eq!(vector.values, [0.0, 0.0, 0.0, 0.0]);
        assert!(vector.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn levenshtein_similarity_is_bounded() {
        assert_eq!(levenshtein_similarity("robert", "robert"), 1.0);
        assert!(levenshtein_similarity("robert", "rupert") > 0.5);
        assert_eq!(levenshtein_similarity("", ""), 1.0);
        assert_eq!(levenshtein_similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn binarized_feature_respects_threshold() {
        let e = FeatureExtractor::from_config(
            &FeatureConfig {
                set: vec![FeatureKind::JaroWinklerNames],
                levenshtein_threshold: None,
                jaro_winkler_threshold: Some(0.85),
            },
            &AttributeConfig::default(),
        );

        let close = e.extract(
            &CandidatePair::new("Q1", "T1"),
            &source_person(&["martha"]),
            &target_person(&["marhta"]),
        );
        assert_eq!(close.values, [1.0]); // jaro-winkler(martha, marhta) ≈ 0.96

        let far = e.extract(
            &CandidatePair::new("Q1", "T1"),
            &source_person(&["martha"]),
            &target_person(&["zzzzzz"]),
        );
        assert_eq!(far.values, [0.0]);
    }

    #[test]
    fn shared_tokens_uses_min_length_denominator() {
        let source = ["guitarist".to_string(), "composer".to_string()];
        let target = [
            "composer".to_string(),
            "conductor".to_string(),
            "pianist".to_string(),
        ];
        // 1 shared / min(2, 3) = 0.5
        assert_eq!(shared_tokens(&source, &target), 0.5);
    }

    #[test]
    fn tokens_that_normalize_to_nothing_never_overlap() {
        let source = ["(retired)".to_string(), "composer".to_string()];
        let target = ["[annotation]".to_string(), "conductor".to_string()];
        assert_eq!(shared_tokens(&source, &target), 0.0);

        // Both sides all-empty: a missing comparison, not a hit.
        let blank_source = ["(a)".to_string()];
        let blank_target = ["[b]".to_string()];
        assert_eq!(shared_tokens(&blank_source, &blank_target), 0.0);
    }

    proptest::proptest! {
        #[test]
        fn name_scores_stay_in_the_unit_interval(a in "\\PC{0,24}", b in "\\PC{0,24}") {
            let source = source_person(&[a.as_str()]);
            let target = target_person(&[b.as_str()]);
            let e = extractor(vec![
                FeatureKind::ExactNames,
                FeatureKind::LevenshteinNames,
                FeatureKind::JaroWinklerNames,
            ]);
            let vector = e.extract(&CandidatePair::new("Q1", "T1"), &source, &target);
            proptest::prop_assert!(vector.values.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn links_agree_after_url_normalization() {
        let source = ["https://WWW.Example.com/ada/".to_string()];
        let target = ["https://example.com/ada".to_string()];
        assert_eq!(link_agreement(&source, &target), 1.0);

        let other = ["https://example.com/bob".to_string()];
        assert_eq!(link_agreement(&source, &other), 0.0);
    }
}
