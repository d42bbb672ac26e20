//! L2-regularized logistic regression (linfa-logistic) on standardized
//! features.
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::error::{LearnerError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::{check_features, check_training_input, SavedModelRef};
use crate::preprocessing::{fit_transform, Scaler};

pub struct LogisticClassifier {
    model: Option<FittedLogistic>,
    params: ModelConfig,
}

/// Targets are `true` for the positive class, so the fitted model's
/// probabilities are those of the positive class.
#[derive(Serialize, Deserialize)]
pub struct FittedLogistic {
    pub scaler: Scaler,
    pub regression: FittedLogisticRegression<f64, bool>,
}

impl LogisticClassifier {
    pub fn new(params: ModelConfig) -> Self {
        LogisticClassifier {
            model: None,
            params,
        }
    }

    pub fn from_fitted(params: ModelConfig, fitted: FittedLogistic) -> Self {
        LogisticClassifier {
            model: Some(fitted),
            params,
        }
    }

    fn fitted(&self) -> Result<&FittedLogistic> {
        self.model
            .as_ref()
            .ok_or_else(|| LearnerError::Model("logistic regression has not been fitted".into()))
    }
}

impl ClassifierModel for LogisticClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64], groups: &[String]) -> Result<()> {
        check_training_input(x, y, groups)?;

        let ModelType::Logistic { epochs, l2 } = &self.params.model_type else {
            return Err(LearnerError::Model(format!(
                "expected logistic-regression parameters, got {}",
                self.params.name()
            )));
        };

        let (scaler, z) = fit_transform(x)?;
        let targets: Array1<bool> = y.iter().map(|&v| v > 0.5).collect();
        let dataset = Dataset::new(z, targets);

        let regression = LogisticRegression::default()
            .alpha(*l2)
            .max_iterations(*epochs as u64)
            .fit(&dataset)
            .map_err(|e| LearnerError::Model(format!("logistic regression failed to fit: {}", e)))?;

        log::debug!(
            "Fitted logistic regression: {} rows, {} features, intercept {:.4}",
            x.nrows(),
            x.ncols(),
            regression.intercept()
        );
        self.model = Some(FittedLogistic { scaler, regression });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let fitted = self.fitted()?;
        check_features(fitted.regression.params().len(), x)?;
        let z = fitted.scaler.transform(x)?;
        Ok(fitted.regression.predict_probabilities(&z).to_vec())
    }

    fn name(&self) -> &str {
        self.params.name()
    }

    fn save(&self) -> Result<Vec<u8>> {
        let saved = SavedModelRef::Logistic {
            params: &self.params,
            model: self.fitted()?,
        };
        Ok(serde_json::to_vec(&saved)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ModelConfig {
        ModelConfig::new(0.5, ModelType::Logistic { epochs: 300, l2: 1.0 })
    }

    #[test]
    fn separates_linearly_separable_data() {
        let x = Array2::from_shape_vec((6, 1), vec![-3.0, -2.0, -1.0, 1.0, 2.0, 3.0]).unwrap();
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let groups: Vec<String> = (0..6).map(|i| i.to_string()).collect();

        let mut model = LogisticClassifier::new(params());
        model.fit(&x, &y, &groups).unwrap();
        let proba = model.predict_proba(&x).unwrap();

        assert!(proba[..3].iter().all(|p| *p < 0.5));
        assert!(proba[3..].iter().all(|p| *p > 0.5));
    }

    #[test]
    fn stronger_penalty_pulls_probabilities_to_half() {
        let x = Array2::from_shape_vec((6, 1), vec![-3.0, -2.0, -0.5, 0.5, 2.0, 3.0]).unwrap();
        let y = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let groups: Vec<String> = (0..6).map(|i| i.to_string()).collect();

        let top = |l2: f64| {
            let mut model =
                LogisticClassifier::new(ModelConfig::new(0.1, ModelType::Logistic { epochs: 200, l2 }));
            model.fit(&x, &y, &groups).unwrap();
            model.predict_proba(&x).unwrap()[5]
        };
        let loose = top(0.1);
        let tight = top(50.0);
        assert!(loose > tight);
        assert!(tight > 0.5);
    }

    #[test]
    fn wrong_parameters_are_rejected() {
        let x = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();
        let mut model = LogisticClassifier::new(ModelConfig::default());
        let err = model
            .fit(&x, &[0.0, 1.0], &["a".to_string(), "b".to_string()])
            .unwrap_err();
        assert!(matches!(err, LearnerError::Model(_)));
    }
}
