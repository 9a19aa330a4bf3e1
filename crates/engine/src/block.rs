//! Candidate-pair generation. Partitions both collections by a
//! blocking key and emits the cross-product only within matching
//! partitions, so the quadratic full comparison never happens.
//!
//! Blocking never fails on missing attributes: an entity without a
//! value for a key simply contributes no candidates under that
//! strategy. That is silent recall loss, not an error.

use std::collections::{BTreeMap, BTreeSet};

use corefer_core::{normalize, Entity, EntityId};
use tracing::debug;

use crate::config::{BlockingConfig, BlockingStrategyKind};
use crate::model::CandidatePair;

// ---------------------------------------------------------------------------
// Key index
// ---------------------------------------------------------------------------

/// Explicit blocking-key index: key → entity ids. Built once per run
/// and passed by reference; there is no ambient shared state.
#[derive(Debug, Default)]
pub struct KeyIndex {
    buckets: BTreeMap<String, Vec<EntityId>>,
    pub skipped: usize,
}

impl KeyIndex {
    /// Build from a key function that may emit several keys per entity
    /// (one per name value, say). Entities yielding no key are counted
    /// as skipped.
    pub fn build<'a, F>(entities: impl IntoIterator<Item = &'a Entity>, key_fn: F) -> Self
    where
        F: Fn(&Entity) -> Vec<String>,
    {
        let mut index = KeyIndex::default();

        for entity in entities {
            let keys = key_fn(entity);
            if keys.is_empty() {
                index.skipped += 1;
                continue;
            }
            for key in keys {
                let bucket = index.buckets.entry(key).or_default();
                if !bucket.contains(&entity.id) {
                    bucket.push(entity.id.clone());
                }
            }
        }

        index
    }

    pub fn get(&self, key: &str) -> &[EntityId] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.buckets.keys()
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// A pluggable candidate generator. Implementations must be pure with
/// respect to the entity slices; results from all configured
/// strategies are unioned and deduplicated.
pub trait BlockingStrategy {
    fn name(&self) -> &'static str;

    fn candidates(&self, source: &[Entity], target: &[Entity]) -> BTreeSet<CandidatePair>;
}

/// Exact-key blocking on the normalized first token of each name
/// value. Cheap and high-precision; misses true matches whose first
/// token carries a typo, which a second strategy can recover.
pub struct FirstNameToken {
    pub attribute: String,
}

impl BlockingStrategy for FirstNameToken {
    fn name(&self) -> &'static str {
        "first_name_token"
    }

    fn candidates(&self, source: &[Entity], target: &[Entity]) -> BTreeSet<CandidatePair> {
        let key_fn = |entity: &Entity| -> Vec<String> {
            entity
                .names(&self.attribute)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|n| normalize::first_name_token(n))
                        .collect()
                })
                .unwrap_or_default()
        };

        let source_index = KeyIndex::build(source, key_fn);
        let target_index = KeyIndex::build(target, key_fn);
        pair_within_buckets(&source_index, &target_index, self.name())
    }
}

/// Exact-key blocking on normalized link values. Recovers pairs whose
/// names disagree but whose external links coincide.
pub struct ExactLink {
    pub attribute: String,
}

impl BlockingStrategy for ExactLink {
    fn name(&self) -> &'static str {
        "exact_link"
    }

    fn candidates(&self, source: &[Entity], target: &[Entity]) -> BTreeSet<CandidatePair> {
        let key_fn = |entity: &Entity| -> Vec<String> {
            entity
                .links(&self.attribute)
                .map(|links| links.iter().map(|l| normalize::normalize_url(l)).collect())
                .unwrap_or_default()
        };

        let source_index = KeyIndex::build(source, key_fn);
        let target_index = KeyIndex::build(target, key_fn);
        pair_within_buckets(&source_index, &target_index, self.name())
    }
}

fn pair_within_buckets(
    source_index: &KeyIndex,
    target_index: &KeyIndex,
    strategy: &str,
) -> BTreeSet<CandidatePair> {
    let mut pairs = BTreeSet::new();

    for key in source_index.keys() {
        let targets = target_index.get(key);
        if targets.is_empty() {
            continue;
        }
        for source_id in source_index.get(key) {
            for target_id in targets {
                pairs.insert(CandidatePair {
                    source: source_id.clone(),
                    target: target_id.clone(),
                });
            }
        }
    }

    debug!(
        strategy,
        pairs = pairs.len(),
        source_skipped = source_index.skipped,
        target_skipped = target_index.skipped,
        "blocking strategy done"
    );

    pairs
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn strategies_from_config(
    config: &BlockingConfig,
    name_attribute: &str,
    link_attribute: &str,
) -> Vec<Box<dyn BlockingStrategy + Send + Sync>> {
    config
        .strategies
        .iter()
        .map(|kind| -> Box<dyn BlockingStrategy + Send + Sync> {
            match kind {
                BlockingStrategyKind::FirstNameToken => {
                    Box::new(FirstNameToken { attribute: name_attribute.to_string() })
                }
                BlockingStrategyKind::ExactLink => {
                    Box::new(ExactLink { attribute: link_attribute.to_string() })
                }
            }
        })
        .collect()
}

/// Union the candidates of every strategy. The set is unique per run:
/// a pair found by two strategies appears once.
pub fn block(
    source: &[Entity],
    target: &[Entity],
    strategies: &[Box<dyn BlockingStrategy + Send + Sync>],
) -> BTreeSet<CandidatePair> {
    let mut all = BTreeSet::new();
    for strategy in strategies {
        all.extend(strategy.candidates(source, target));
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use corefer_core::{AttributeValue, Collection};

    fn person(id: &str, collection: Collection, names: &[&str]) -> Entity {
        Entity::new(id, collection).with_attribute(
            "name",
            AttributeValue::Names(names.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[test]
    fn shared_first_token_lands_in_same_block() {
        let source = vec![person("Q1", Collection::Source, &["Charles Hartshorne"])];
        let target = vec![
            person("T1", Collection::Target, &["charles hartshorne"]),
            person("T2", Collection::Target, &["Miles Davis"]),
        ];

        let strategy = FirstNameToken { attribute: "name".into() };
        let pairs = strategy.candidates(&source, &target);

        assert_eq!(pairs.len(), 1);
        assert!(pairs.contains(&CandidatePair::new("Q1", "T1")));
    }

    #[test]
    fn aliases_each_contribute_a_key() {
        let source = vec![person("Q1", Collection::Source, &["Bob Dylan", "Robert Zimmerman"])];
        let target = vec![
            person("T1", Collection::Target, &["Robert Allen Zimmerman"]),
            person("T2", Collection::Target, &["Bob Marley"]),
        ];

        let strategy = FirstNameToken { attribute: "name".into() };
        let pairs = strategy.candidates(&source, &target);

        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&CandidatePair::new("Q1", "T1")));
        assert!(pairs.contains(&CandidatePair::new("Q1", "T2")));
    }

    #[test]
    fn missing_key_yields_no_candidates_not_an_error() {
        let source = vec![Entity::new("Q1", Collection::Source)];
        let target = vec![person("T1", Collection::Target, &["Anyone"])];

        let strategy = FirstNameToken { attribute: "name".into() };
        assert!(strategy.candidates(&source, &target).is_empty());
    }

    #[test]
    fn strategies_union_without_duplicates() {
        let mut source_entity = person("Q1", Collection::Source, &["Ada Lovelace"]);
        source_entity = source_entity.with_attribute(
            "link",
            AttributeValue::Links(vec!["https://example.com/ada".into()]),
        );
        let mut target_entity = person("T1", Collection::Target, &["Ada King, Countess of Lovelace"]);
        target_entity = target_entity.with_attribute(
            "link",
            AttributeValue::Links(vec!["https://www.example.com/ada/".into()]),
        );

        let source = vec![source_entity];
        let target = vec![target_entity];

        let strategies = strategies_from_config(
            &BlockingConfig {
                strategies: vec![
                    BlockingStrategyKind::FirstNameToken,
                    BlockingStrategyKind::ExactLink,
                ],
            },
            "name",
            "link",
        );

        // Both strategies find the same pair; the union holds it once.
        let pairs = block(&source, &target, &strategies);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn key_index_counts_skipped_entities() {
        let entities = vec![
            person("Q1", Collection::Source, &["Ada"]),
            Entity::new("Q2", Collection::Source),
        ];
        let index = KeyIndex::build(&entities, |e| {
            e.names("name")
                .map(|ns| ns.iter().filter_map(|n| normalize::first_name_token(n)).collect())
                .unwrap_or_default()
        });
        assert_eq!(index.skipped, 1);
        assert_eq!(index.get("ada"), [EntityId::new("Q1")]);
    }
}
