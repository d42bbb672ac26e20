use crate::config::{ModelConfig, ModelType};
use crate::error::{LearnerError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::gbdt::GBDTClassifier;
use crate::models::logistic::LogisticClassifier;
use crate::models::SavedModel;

/// Build an unfitted classifier from a `ModelConfig`.
pub fn build_model(params: ModelConfig) -> Box<dyn ClassifierModel> {
    match params.model_type {
        ModelType::Gbdt { .. } => Box::new(GBDTClassifier::new(params)),
        ModelType::Logistic { .. } => Box::new(LogisticClassifier::new(params)),
    }
}

/// Rebuild a fitted classifier from the bytes produced by
/// [`ClassifierModel::save`]. `artifact` names the source in errors.
pub fn restore_model(bytes: &[u8], artifact: &str) -> Result<Box<dyn ClassifierModel>> {
    let saved: SavedModel =
        serde_json::from_slice(bytes).map_err(|e| LearnerError::corrupt(artifact, e.to_string()))?;
    Ok(match saved {
        SavedModel::Gbdt { params, model } => Box::new(GBDTClassifier::from_fitted(params, model)),
        SavedModel::Logistic { params, model } => {
            Box::new(LogisticClassifier::from_fitted(params, model))
        }
    })
}
