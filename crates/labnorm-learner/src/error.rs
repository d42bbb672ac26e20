use std::io;

/// Error type shared by every stage of the learner.
///
/// `InvariantViolation`, `SchemaMismatch`, `UnresolvableTransfer` and
/// `CacheCorruption` are fatal to the stage that raised them; nothing in the
/// crate retries or repairs. Re-running after deleting the offending cache
/// artifact is the recovery path.
#[derive(Debug, thiserror::Error)]
pub enum LearnerError {
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("schema mismatch on feature '{feature}': {reason}")]
    SchemaMismatch { feature: String, reason: String },

    #[error("cannot transfer feature '{feature}': {reason}")]
    UnresolvableTransfer { feature: String, reason: String },

    #[error("corrupt cache artifact {artifact}: {reason}")]
    CacheCorruption { artifact: String, reason: String },

    #[error("missing cache artifact {0}")]
    MissingArtifact(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("delimited text error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LearnerError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        LearnerError::InvariantViolation(msg.into())
    }

    pub fn schema_mismatch(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        LearnerError::SchemaMismatch {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        LearnerError::CacheCorruption {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, LearnerError>;
