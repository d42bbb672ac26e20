pub mod classifier_trait;
pub mod factory;
pub mod gbdt;
pub mod logistic;

use std::collections::HashSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{LearnerError, Result};

pub use classifier_trait::ClassifierModel;
pub use factory::{build_model, restore_model};

/// Persisted model, tagged by algorithm.
#[derive(Serialize)]
#[serde(tag = "algorithm")]
pub(crate) enum SavedModelRef<'a> {
    #[serde(rename = "gbdt")]
    Gbdt {
        params: &'a ModelConfig,
        model: &'a self::gbdt::FittedGbdt,
    },
    #[serde(rename = "logistic-regression")]
    Logistic {
        params: &'a ModelConfig,
        model: &'a logistic::FittedLogistic,
    },
}

/// Owned counterpart of [`SavedModelRef`].
#[derive(Deserialize)]
#[serde(tag = "algorithm")]
pub(crate) enum SavedModel {
    #[serde(rename = "gbdt")]
    Gbdt {
        params: ModelConfig,
        model: self::gbdt::FittedGbdt,
    },
    #[serde(rename = "logistic-regression")]
    Logistic {
        params: ModelConfig,
        model: logistic::FittedLogistic,
    },
}

pub(crate) fn check_training_input(x: &Array2<f64>, y: &[f64], groups: &[String]) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(LearnerError::Model(format!(
            "cannot train on a {}x{} feature matrix",
            x.nrows(),
            x.ncols()
        )));
    }
    if y.len() != x.nrows() || groups.len() != x.nrows() {
        return Err(LearnerError::Model(format!(
            "{} rows but {} labels and {} group values",
            x.nrows(),
            y.len(),
            groups.len()
        )));
    }
    let positives = y.iter().filter(|&&v| v > 0.5).count();
    if positives == 0 || positives == y.len() {
        return Err(LearnerError::Model("training labels contain a single class".into()));
    }
    let distinct: HashSet<&str> = groups.iter().map(String::as_str).collect();
    log::debug!(
        "Training on {} rows from {} groups ({} positive)",
        y.len(),
        distinct.len(),
        positives
    );
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(LearnerError::Model(format!(
            "model expects {} features, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}
