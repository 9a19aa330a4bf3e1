//! Rule-based linker. No training data, no tunable weights: a pair is
//! a match when an external link coincides exactly, or when a
//! normalized name coincides exactly and (optionally) the dates agree
//! at their full shared precision.
//!
//! The rules are binary on purpose. Every pair comes out `Match` with
//! confidence 1.0 or `NonMatch` with no confidence; `Undecided` is a
//! classifier concept and never appears here.

use corefer_core::{normalize, Entity};

use crate::config::{AttributeConfig, BaselineConfig};
use crate::features;
use crate::model::{CandidatePair, DecisionLabel, LinkDecision};

pub const STRATEGY: &str = "baseline";

#[derive(Debug, Clone)]
pub struct RuleBasedLinker {
    attributes: AttributeConfig,
    check_dates: bool,
}

impl RuleBasedLinker {
    pub fn from_config(baseline: &BaselineConfig, attributes: &AttributeConfig) -> Self {
        Self {
            attributes: attributes.clone(),
            check_dates: baseline.check_dates,
        }
    }

    /// Whether the rules accept this pair as a certain match.
    pub fn accepts(&self, source: &Entity, target: &Entity) -> bool {
        self.perfect_link(source, target) || self.perfect_name(source, target)
    }

    pub fn decide(&self, pair: &CandidatePair, source: &Entity, target: &Entity) -> LinkDecision {
        if self.accepts(source, target) {
            LinkDecision {
                source: pair.source.clone(),
                target: pair.target.clone(),
                label: DecisionLabel::Match,
                confidence: Some(1.0),
                strategy: STRATEGY.into(),
            }
        } else {
            LinkDecision {
                source: pair.source.clone(),
                target: pair.target.clone(),
                label: DecisionLabel::NonMatch,
                confidence: None,
                strategy: STRATEGY.into(),
            }
        }
    }

    fn perfect_link(&self, source: &Entity, target: &Entity) -> bool {
        let attr = &self.attributes.link;
        match (source.links(attr), target.links(attr)) {
            (Some(s), Some(t)) => features::link_agreement(s, t) == 1.0,
            _ => false,
        }
    }

    fn perfect_name(&self, source: &Entity, target: &Entity) -> bool {
        let attr = &self.attributes.name;
        let (Some(source_names), Some(target_names)) =
            (source.names(attr), target.names(attr))
        else {
            return false;
        };

        let target_normalized: Vec<String> =
            target_names.iter().map(|n| normalize::normalize_string(n)).collect();

        let name_hit = source_names
            .iter()
            .map(|n| normalize::normalize_string(n))
            .any(|s| target_normalized.contains(&s));

        if !name_hit {
            return false;
        }
        if !self.check_dates {
            return true;
        }
        self.dates_fully_agree(source, target)
    }

    /// Dates must exist on both sides and agree at every position of
    /// their shared precision. A name-only coincidence is too weak for
    /// an unsupervised match when date checking is on.
    fn dates_fully_agree(&self, source: &Entity, target: &Entity) -> bool {
        let attr = &self.attributes.date;
        let (Some(source_dates), Some(target_dates)) =
            (source.dates(attr), target.dates(attr))
        else {
            return false;
        };

        source_dates
            .iter()
            .any(|s| target_dates.iter().any(|t| s.agreement(t) == 1.0))
    }
}
