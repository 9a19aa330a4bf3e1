//! `corefer-engine` — Entity-resolution engine.
//!
//! Pure engine crate: receives pre-loaded [`Entity`](corefer_core::Entity)
//! records from both collections, returns link decisions. No IO, no
//! persistence; the importer and ingester live elsewhere.
//!
//! Pipeline: blocking → feature extraction → {rule-based linker |
//! supervised classifier} → decision layer. Training is a separate
//! offline flow producing an immutable [`Model`](model::Model).

pub mod baseline;
pub mod block;
pub mod classify;
pub mod config;
pub mod decide;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod model;

pub use config::ResolutionConfig;
pub use engine::{evaluate, run, train, ResolutionInput};
pub use evaluate::EvaluationReport;
pub use error::EngineError;
pub use model::{CandidatePair, LinkDecision, Model, ResolutionResult};
