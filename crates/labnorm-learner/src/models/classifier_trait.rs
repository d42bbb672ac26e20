use ndarray::Array2;

use crate::error::Result;

/// Train / predict-probability contract shared by every classifier.
///
/// Labels follow the processed-matrix convention: 1.0 for the positive
/// class, 0.0 otherwise. Implementations convert internally when their
/// backend expects something else.
pub trait ClassifierModel: Send {
    /// Fit on `x` (rows are observations). `groups` carries the grouping
    /// key of every row.
    fn fit(&mut self, x: &Array2<f64>, y: &[f64], groups: &[String]) -> Result<()>;

    /// Probability of the positive class, one value per row.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>>;

    /// Stable algorithm name used in artifact keys.
    fn name(&self) -> &str;

    /// Opaque serialized form, restorable with `factory::restore_model`.
    fn save(&self) -> Result<Vec<u8>>;
}
