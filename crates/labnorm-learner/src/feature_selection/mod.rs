//! Feature ranking used by the feature processor in fit mode.
//!
//! The processor only depends on the [`FeatureRanker`] contract; the
//! univariate rankers in [`univariate_selection`] are the built-in
//! implementations.
pub mod univariate_selection;

use ndarray::{Array1, Array2};

use crate::error::Result;

pub use univariate_selection::UnivariateRanker;

/// Ranks candidate columns against a label.
pub trait FeatureRanker: Send + Sync {
    /// One rank per column of `x`, 1 = best. Must be deterministic.
    fn rank(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<usize>>;

    fn name(&self) -> &str {
        "ranker"
    }
}
