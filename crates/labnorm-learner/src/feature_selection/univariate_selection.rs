//! Univariate feature scoring following scikit-learn's API.
//!
//! See: https://scikit-learn.org/stable/modules/feature_selection.html#univariate-feature-selection

use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::config::SelectionAlgorithm;
use crate::error::{LearnerError, Result};
use crate::feature_selection::FeatureRanker;

/// Compute row-wise (squared) Euclidean norms of a 2D array.
///
/// # Parameters
///
/// * `x` - A 2D array of shape (n_samples, n_features).
/// * `squared` - Return squared norms instead of norms.
///
/// # Returns
///
/// An array of shape (n_samples,) containing the row-wise (squared) Euclidean norms.
pub fn row_norms<S>(x: &ArrayBase<S, Ix2>, squared: bool) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    x.axis_iter(Axis(0))
        .map(|row| {
            let sum_of_squares: f64 = row.iter().map(|&val| val.powi(2)).sum();
            if squared {
                sum_of_squares
            } else {
                sum_of_squares.sqrt()
            }
        })
        .collect()
}

/// Compute Pearson's r for each feature and the target.
///
/// # Parameters
///
/// * `x` - A 2D array of shape (n_samples, n_features).
/// * `y` - A 1D array of shape (n_samples,) representing the target vector.
/// * `center` - Center both `x` and `y` by subtracting their means.
/// * `force_finite` - Replace non-finite coefficients (e.g. constant
///   features) with 0.0.
///
/// # Returns
///
/// An array of shape (n_features,) with one correlation coefficient per feature.
pub fn r_regression(x: &Array2<f64>, y: &Array1<f64>, center: bool, force_finite: bool) -> Array1<f64> {
    let n_samples = x.nrows() as f64;
    let n_features = x.ncols();

    let (x_means, y_centered) = if center {
        let x_means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        (x_means, y.mapv(|v| v - y_mean))
    } else {
        (Array1::zeros(n_features), y.to_owned())
    };

    // Scaled standard deviations via moments
    let x_norms = if center {
        let x_squared_norms = row_norms(&x.t(), true);
        (&x_squared_norms - &x_means.mapv(|m| n_samples * m.powi(2))).mapv(|v| v.max(0.0).sqrt())
    } else {
        row_norms(&x.t(), false)
    };

    let y_norm = y_centered.dot(&y_centered).sqrt();

    let mut correlation_coefficient = Array1::zeros(n_features);
    for (i, col) in x.columns().into_iter().enumerate() {
        let centered_col = col.mapv(|v| v - x_means[i]);
        correlation_coefficient[i] = centered_col.dot(&y_centered) / x_norms[i] / y_norm;
    }

    if force_finite {
        correlation_coefficient.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    }

    correlation_coefficient
}

/// Univariate linear regression tests returning F-statistic and p-values.
///
/// A quick linear model test of the effect of each single regressor on the
/// target, sequentially for many regressors.
///
/// # Returns
///
/// A tuple of arrays of shape (n_features,): the F-statistics and their
/// p-values. With fewer samples than degrees of freedom the p-values are NaN.
pub fn f_regression(x: &Array2<f64>, y: &Array1<f64>, center: bool, force_finite: bool) -> (Array1<f64>, Array1<f64>) {
    let correlation_coefficient = r_regression(x, y, center, force_finite);
    let deg_of_freedom = y.len() as f64 - if center { 2.0 } else { 1.0 };

    let corr_coef_squared = correlation_coefficient.mapv(|r| r.powi(2));
    let mut f_statistic = corr_coef_squared.mapv(|r2| r2 / (1.0 - r2) * deg_of_freedom);

    let mut p_values = match FisherSnedecor::new(1.0, deg_of_freedom) {
        Ok(f_dist) => f_statistic.mapv(|f| 1.0 - f_dist.cdf(f)),
        Err(_) => Array1::from_elem(f_statistic.len(), f64::NAN),
    };

    if force_finite {
        for i in 0..f_statistic.len() {
            if f_statistic[i].is_infinite() {
                f_statistic[i] = f64::MAX;
                p_values[i] = 0.0;
            } else if f_statistic[i].is_nan() {
                f_statistic[i] = 0.0;
                p_values[i] = 1.0;
            }
        }
    }

    (f_statistic, p_values)
}

/// Convert scores (higher is better) into ranks (1 is best).
///
/// Ties and NaN scores keep column order: the earlier column ranks first.
pub fn scores_to_ranks(scores: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    let key = |i: usize| if scores[i].is_nan() { f64::NEG_INFINITY } else { scores[i] };
    order.sort_by(|&a, &b| key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0; scores.len()];
    for (position, &idx) in order.iter().enumerate() {
        ranks[idx] = position + 1;
    }
    ranks
}

/// Ranks features by a univariate statistic against the label.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnivariateRanker {
    algorithm: SelectionAlgorithm,
}

impl UnivariateRanker {
    pub fn new(algorithm: SelectionAlgorithm) -> Self {
        UnivariateRanker { algorithm }
    }
}

impl FeatureRanker for UnivariateRanker {
    fn rank(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<usize>> {
        if x.nrows() != y.len() {
            return Err(LearnerError::invariant(format!(
                "feature matrix has {} rows but label has {}",
                x.nrows(),
                y.len()
            )));
        }

        let scores = match self.algorithm {
            SelectionAlgorithm::FRegression => {
                let (f_scores, p_values) = f_regression(x, y, true, true);
                log::debug!(
                    "F-test over {} features, smallest p-value {:.3e}",
                    f_scores.len(),
                    p_values.iter().cloned().fold(f64::INFINITY, f64::min)
                );
                f_scores
            }
            SelectionAlgorithm::Correlation => r_regression(x, y, true, true).mapv(f64::abs),
        };

        Ok(scores_to_ranks(&scores))
    }

    fn name(&self) -> &str {
        match self.algorithm {
            SelectionAlgorithm::FRegression => "f_regression",
            SelectionAlgorithm::Correlation => "correlation",
        }
    }
}
