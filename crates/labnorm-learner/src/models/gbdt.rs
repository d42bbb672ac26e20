use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::error::{LearnerError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::{check_features, check_training_input, SavedModelRef};

/// Gradient Boosting Decision Tree (GBDT) classifier
pub struct GBDTClassifier {
    model: Option<FittedGbdt>,
    params: ModelConfig,
}

#[derive(Serialize, Deserialize)]
pub struct FittedGbdt {
    pub n_features: usize,
    pub booster: GBDT,
}

fn to_data(x: &Array2<f64>, labels: Option<&[f64]>) -> DataVec {
    let mut data = DataVec::with_capacity(x.nrows());
    for (i, row) in x.rows().into_iter().enumerate() {
        let features: Vec<f32> = row.iter().map(|&v| v as f32).collect();
        // LogLikelyhood loss expects labels in {-1, 1}
        let label = match labels {
            Some(y) if y[i] > 0.5 => 1.0,
            Some(_) => -1.0,
            None => 0.0,
        };
        data.push(Data::new_training_data(features, 1.0, label, None));
    }
    data
}

impl GBDTClassifier {
    pub fn new(params: ModelConfig) -> Self {
        GBDTClassifier {
            model: None,
            params,
        }
    }

    pub fn from_fitted(params: ModelConfig, fitted: FittedGbdt) -> Self {
        GBDTClassifier {
            model: Some(fitted),
            params,
        }
    }

    fn fitted(&self) -> Result<&FittedGbdt> {
        self.model
            .as_ref()
            .ok_or_else(|| LearnerError::Model("gbdt model has not been fitted".into()))
    }
}

impl ClassifierModel for GBDTClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64], groups: &[String]) -> Result<()> {
        check_training_input(x, y, groups)?;

        let ModelType::Gbdt {
            max_depth,
            num_boost_round,
            training_optimization_level,
        } = &self.params.model_type
        else {
            return Err(LearnerError::Model(format!(
                "expected gbdt parameters, got {}",
                self.params.name()
            )));
        };

        let mut config = Config::new();
        config.set_feature_size(x.ncols());
        config.set_shrinkage(self.params.learning_rate);
        config.set_max_depth(*max_depth);
        config.set_iterations(*num_boost_round as usize);
        config.set_debug(false);
        config.set_training_optimization_level(*training_optimization_level);
        config.set_loss("LogLikelyhood");

        let mut booster = GBDT::new(&config);
        let mut train_x = to_data(x, Some(y));
        booster.fit(&mut train_x);

        log::debug!(
            "Fitted gbdt: {} rows, {} features, {} rounds",
            x.nrows(),
            x.ncols(),
            num_boost_round
        );
        self.model = Some(FittedGbdt {
            n_features: x.ncols(),
            booster,
        });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let fitted = self.fitted()?;
        check_features(fitted.n_features, x)?;
        let test_x = to_data(x, None);
        // predict() already maps LogLikelyhood margins to probabilities
        Ok(fitted.booster.predict(&test_x).into_iter().map(f64::from).collect())
    }

    fn name(&self) -> &str {
        self.params.name()
    }

    fn save(&self) -> Result<Vec<u8>> {
        let saved = SavedModelRef::Gbdt {
            params: &self.params,
            model: self.fitted()?,
        };
        Ok(serde_json::to_vec(&saved)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::factory::restore_model;

    fn toy() -> (Array2<f64>, Vec<f64>, Vec<String>) {
        // Second feature separates the classes
        let x = Array2::from_shape_vec(
            (10, 3),
            vec![
                0.1, 1.0, 5.0, 0.4, -1.0, 5.0, 0.6, 1.0, 5.0, 0.9, -1.0, 5.0, 1.2, 1.0, 5.0, 1.5,
                -1.0, 5.0, 1.8, 1.0, 5.0, 2.1, -1.0, 5.0, 2.4, 1.0, 5.0, 2.7, -1.0, 5.0,
            ],
        )
        .unwrap();
        let y = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let groups = (0..10).map(|i| i.to_string()).collect();
        (x, y, groups)
    }

    fn params() -> ModelConfig {
        ModelConfig::new(
            0.1,
            ModelType::Gbdt {
                max_depth: 3,
                num_boost_round: 10,
                training_optimization_level: 2,
            },
        )
    }

    #[test]
    fn learns_separable_signal() {
        let (x, y, groups) = toy();
        let mut classifier = GBDTClassifier::new(params());
        classifier.fit(&x, &y, &groups).unwrap();

        let proba = classifier.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 10);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[0] > proba[1]);
    }

    #[test]
    fn saved_model_predicts_identically() {
        let (x, y, groups) = toy();
        let mut classifier = GBDTClassifier::new(params());
        classifier.fit(&x, &y, &groups).unwrap();

        let restored = restore_model(&classifier.save().unwrap(), "gbdt-model.json").unwrap();
        assert_eq!(restored.name(), "gbdt");
        assert_eq!(
            restored.predict_proba(&x).unwrap(),
            classifier.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn unfitted_model_refuses_to_predict() {
        let (x, _, _) = toy();
        assert!(GBDTClassifier::new(params()).predict_proba(&x).is_err());
    }
}
