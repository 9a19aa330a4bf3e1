use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque record identifier, unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Source,
    Target,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

// ---------------------------------------------------------------------------
// Partial dates
// ---------------------------------------------------------------------------

/// A date with hierarchical precision: a known day implies a known
/// month, a known month implies a known year. Missing components are
/// explicit, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PartialDate {
    pub fn year(year: i32) -> Self {
        Self { year: Some(year), ..Default::default() }
    }

    pub fn year_month(year: i32, month: u32) -> Self {
        Self { year: Some(year), month: Some(month), day: None }
    }

    pub fn full(year: i32, month: u32, day: u32) -> Self {
        Self { year: Some(year), month: Some(month), day: Some(day) }
    }

    /// Number of defined leading components: 0 (nothing) to 3 (full date).
    pub fn precision(&self) -> u8 {
        match (self.year, self.month, self.day) {
            (Some(_), Some(_), Some(_)) => 3,
            (Some(_), Some(_), None) => 2,
            (Some(_), None, _) => 1,
            (None, _, _) => 0,
        }
    }

    /// Agreement score in [0, 1] over the components both sides define.
    ///
    /// Components are compared from year down to day, stopping at the
    /// first disagreement; the score is matched / compared. Two dates
    /// with no shared precision score 0.0 — the caller treats that as
    /// a missing comparison, not as evidence either way.
    pub fn agreement(&self, other: &PartialDate) -> f64 {
        let shared = self.precision().min(other.precision());
        if shared == 0 {
            return 0.0;
        }

        let lhs = [
            self.year.map(|y| y as i64),
            self.month.map(|m| m as i64),
            self.day.map(|d| d as i64),
        ];
        let rhs = [
            other.year.map(|y| y as i64),
            other.month.map(|m| m as i64),
            other.day.map(|d| d as i64),
        ];

        let mut matched = 0u8;
        for i in 0..shared as usize {
            if lhs[i] == rhs[i] {
                matched += 1;
            } else {
                break;
            }
        }

        matched as f64 / shared as f64
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => write!(f, "{y:04}-{m:02}-{d:02}"),
            (Some(y), Some(m), None) => write!(f, "{y:04}-{m:02}"),
            (Some(y), None, _) => write!(f, "{y:04}"),
            (None, _, _) => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Typed attribute payload. Multi-valued by construction: a person can
/// have aliases, several homepage URLs, several stated birth dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "values")]
pub enum AttributeValue {
    /// Name strings (labels, aliases, birth names).
    Names(Vec<String>),
    /// Dates with partial precision (birth, death).
    Dates(Vec<PartialDate>),
    /// External links / URL identifiers.
    Links(Vec<String>),
    /// Free token sets (occupations, genres).
    Tokens(Vec<String>),
}

impl AttributeValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Names(v) | Self::Links(v) | Self::Tokens(v) => v.is_empty(),
            Self::Dates(v) => v.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// One record from either collection. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub collection: Collection,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Entity {
    pub fn new(id: impl Into<String>, collection: Collection) -> Self {
        Self {
            id: EntityId::new(id),
            collection,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn names(&self, attribute: &str) -> Option<&[String]> {
        match self.attributes.get(attribute) {
            Some(AttributeValue::Names(v)) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub fn dates(&self, attribute: &str) -> Option<&[PartialDate]> {
        match self.attributes.get(attribute) {
            Some(AttributeValue::Dates(v)) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub fn links(&self, attribute: &str) -> Option<&[String]> {
        match self.attributes.get(attribute) {
            Some(AttributeValue::Links(v)) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub fn tokens(&self, attribute: &str) -> Option<&[String]> {
        match self.attributes.get(attribute) {
            Some(AttributeValue::Tokens(v)) if !v.is_empty() => Some(v),
            _ => None,
        }
    }
}
