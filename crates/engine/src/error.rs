use corefer_core::EntityId;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad threshold, empty feature set, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// Feature vector shape disagrees with the model's schema.
    /// Fatal to that scoring call, never corrupts other pairs.
    #[error("feature schema mismatch: model expects {expected} features, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// Degenerate training set: empty, single-class, or inconsistent
    /// vector shapes. Fatal to the training run, no partial model.
    #[error("training failed: {0}")]
    Training(String),

    /// Classifier algorithm not recognized by this build.
    #[error("unknown classifier algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Model artifact load/save failure, including schema-hash mismatch.
    #[error("model artifact error: {0}")]
    ModelArtifact(String),
}

/// Recoverable per-entity problem: the entity is excluded from the run
/// and reported, never fatal.
#[derive(Debug, Clone, Serialize)]
pub struct EntityError {
    pub entity: EntityId,
    pub reason: String,
}

/// Per-pair scoring failure collected during batch classification.
/// The rest of the batch keeps going.
#[derive(Debug, Clone, Serialize)]
pub struct PairError {
    pub source: EntityId,
    pub target: EntityId,
    pub reason: String,
}
