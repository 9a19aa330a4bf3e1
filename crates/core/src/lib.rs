//! `corefer-core` — Entity records and attribute normalization.
//!
//! Pure types crate: no IO, no matching logic. Entities are immutable
//! once loaded; the importing side owns their lifecycle.

pub mod entity;
pub mod normalize;

pub use entity::{AttributeValue, Collection, Entity, EntityId, PartialDate};
