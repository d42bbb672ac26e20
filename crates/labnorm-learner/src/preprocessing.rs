//! Column standardization for models that are sensitive to feature scale.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LearnerError, Result};

/// Simple standard scaler (per-column mean/std).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Scaler {
    /// Minimum stddev to avoid division by zero when transforming.
    const MIN_STD: f64 = 1e-6;

    /// Fit from a matrix where rows are samples and columns are features.
    pub fn fit(x: &Array2<f64>) -> Result<Scaler> {
        let (nrows, ncols) = x.dim();
        if nrows == 0 || ncols == 0 {
            return Err(LearnerError::Model(format!(
                "cannot fit a scaler on a {}x{} matrix",
                nrows, ncols
            )));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| LearnerError::Model("empty matrix".into()))?;
        let std = x
            .var_axis(Axis(0), 0.0)
            .mapv(|v| v.sqrt().max(Self::MIN_STD));

        Ok(Scaler {
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }

    /// Standardize all rows. The column count must match the fitted one.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(LearnerError::Model(format!(
                "scaler fitted on {} columns, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        Ok(Array2::from_shape_fn(x.dim(), |(r, c)| {
            (x[(r, c)] - self.mean[c]) / self.std[c]
        }))
    }
}

/// Fit a scaler and return the transformed matrix alongside it.
pub fn fit_transform(x: &Array2<f64>) -> Result<(Scaler, Array2<f64>)> {
    let scaler = Scaler::fit(x)?;
    let transformed = scaler.transform(x)?;
    Ok((scaler, transformed))
}
