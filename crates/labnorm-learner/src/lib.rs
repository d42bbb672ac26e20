//! labnorm-learner: patient-grouped feature matrices and cross-institution
//! model transfer for lab normality prediction.
//!
//! A raw matrix is split by patient into train and eval partitions, turned
//! into processed matrices through a mean-imputation schema derived on the
//! train side, and scored with a classifier. The same schema and model can
//! then be transplanted onto another institution's raw data through
//! feature-name correspondence tables.
//!
//! Every intermediate lives behind the [`cache::ArtifactCache`] port; the
//! presence of an artifact is what lets a stage skip recomputation.
pub mod cache;
pub mod config;
pub mod error;
pub mod feature_selection;
pub mod models;
pub mod partition;
pub mod pipeline;
pub mod preprocessing;
pub mod processing;
pub mod schema;
pub mod stats;
pub mod store;
pub mod table;
pub mod transfer;

pub use error::{LearnerError, Result};
