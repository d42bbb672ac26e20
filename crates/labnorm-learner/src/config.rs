use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{LearnerError, Result};

/// Placeholder substituted with the entity name in feature lists.
pub const ENTITY_PLACEHOLDER: &str = "{entity}";

/// Central configuration for one classifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    #[serde(flatten)]
    pub model_type: ModelType,
}

/// Supported classifiers and their hyper-parameters.
///
/// Each variant is bound to exactly one implementation in `models`; an
/// unknown `algorithm` tag fails when the configuration is parsed.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "algorithm")]
pub enum ModelType {
    #[serde(rename = "gbdt")]
    Gbdt {
        #[serde(default = "default_max_depth")]
        max_depth: u32,
        #[serde(default = "default_num_boost_round")]
        num_boost_round: u32,
        #[serde(default = "default_optimization_level")]
        training_optimization_level: u8,
    },
    #[serde(rename = "logistic-regression")]
    Logistic {
        /// Solver iteration cap.
        #[serde(default = "default_epochs")]
        epochs: usize,
        /// L2 penalty, passed to linfa-logistic as `alpha`.
        #[serde(default = "default_l2")]
        l2: f64,
    },
}

fn default_learning_rate() -> f32 {
    0.1
}

fn default_max_depth() -> u32 {
    6
}

fn default_num_boost_round() -> u32 {
    50
}

fn default_optimization_level() -> u8 {
    2
}

fn default_epochs() -> usize {
    500
}

fn default_l2() -> f64 {
    1.0
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::Gbdt {
            max_depth: default_max_depth(),
            num_boost_round: default_num_boost_round(),
            training_optimization_level: default_optimization_level(),
        }
    }
}

impl ModelType {
    /// Stable name used in artifact file names.
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::Gbdt { .. } => "gbdt",
            ModelType::Logistic { .. } => "logistic-regression",
        }
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gbdt" => Ok(ModelType::default()),
            "logistic-regression" | "logistic" => Ok(ModelType::Logistic {
                epochs: default_epochs(),
                l2: default_l2(),
            }),
            _ => Err(format!(
                "Unknown model type: {}. Supported: gbdt, logistic-regression",
                s
            )),
        }
    }
}

impl ModelConfig {
    pub fn new(learning_rate: f32, model_type: ModelType) -> Self {
        Self {
            learning_rate,
            model_type,
        }
    }

    pub fn name(&self) -> &'static str {
        self.model_type.name()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            model_type: ModelType::default(),
        }
    }
}

/// How candidate features are ranked during fit.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAlgorithm {
    /// Univariate linear regression F-test.
    #[default]
    FRegression,
    /// Absolute Pearson correlation with the label.
    Correlation,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SelectParams {
    /// Share of the raw matrix's column count to retain through selection.
    pub fraction: f64,
    pub algorithm: SelectionAlgorithm,
}

impl Default for SelectParams {
    fn default() -> Self {
        Self {
            fraction: 0.05,
            algorithm: SelectionAlgorithm::FRegression,
        }
    }
}

/// Roles of raw columns during processing.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FeatureSpec {
    /// Carried through unmodified; never imputed or selected.
    pub info: Vec<String>,
    /// Binary outcome column.
    pub ylabel: String,
    /// Dropped before imputation and selection.
    pub remove: Vec<String>,
    /// Retained after imputation without going through selection.
    pub keep: Vec<String>,
    pub select: SelectParams,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        let remove = [
            "order_time",
            "order_proc_id",
            "proc_code",
            "num_components",
            "num_normal_components",
            "abnormal_panel",
            "Birth.pre",
            "Male.preTimeDays",
            "Female.preTimeDays",
            "RaceWhiteHispanicLatino.preTimeDays",
            "RaceWhiteNonHispanicLatino.preTimeDays",
            "RaceHispanicLatino.preTimeDays",
            "RaceAsian.preTimeDays",
            "RaceBlack.preTimeDays",
            "RacePacificIslander.preTimeDays",
            "RaceNativeAmerican.preTimeDays",
            "RaceOther.preTimeDays",
            "RaceUnknown.preTimeDays",
            "Death.post",
            "Death.postTimeDays",
        ];
        Self {
            info: vec!["pat_id".to_string()],
            ylabel: "all_components_normal".to_string(),
            remove: remove.iter().map(|s| s.to_string()).collect(),
            keep: vec![format!("{ENTITY_PLACEHOLDER}.pre")],
            select: SelectParams::default(),
        }
    }
}

impl FeatureSpec {
    /// Copy with `{entity}` expanded in every column name.
    pub fn for_entity(&self, entity: &str) -> FeatureSpec {
        let expand = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .map(|n| n.replace(ENTITY_PLACEHOLDER, entity))
                .collect()
        };
        FeatureSpec {
            info: expand(&self.info),
            ylabel: self.ylabel.replace(ENTITY_PLACEHOLDER, entity),
            remove: expand(&self.remove),
            keep: expand(&self.keep),
            select: self.select.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ylabel.is_empty() {
            return Err(LearnerError::Config("ylabel must be set".into()));
        }
        for (set, names) in [("info", &self.info), ("remove", &self.remove), ("keep", &self.keep)] {
            if names.iter().any(|n| n == &self.ylabel) {
                return Err(LearnerError::Config(format!(
                    "ylabel '{}' must not be listed in {}",
                    self.ylabel, set
                )));
            }
        }
        let info: HashSet<&str> = self.info.iter().map(String::as_str).collect();
        let remove: HashSet<&str> = self.remove.iter().map(String::as_str).collect();
        if let Some(name) = self
            .keep
            .iter()
            .find(|k| info.contains(k.as_str()) || remove.contains(k.as_str()))
        {
            return Err(LearnerError::Config(format!(
                "keep feature '{}' is also listed as info or remove",
                name
            )));
        }
        if !(0.0..=1.0).contains(&self.select.fraction) {
            return Err(LearnerError::Config(format!(
                "select.fraction must be within [0, 1], got {}",
                self.select.fraction
            )));
        }
        Ok(())
    }
}

/// Parameters for the train/eval pipeline over a dataset folder.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_root: PathBuf,
    pub entities: Vec<String>,
    pub group_column: String,
    pub train_fraction: f64,
    pub seed: u64,
    pub features: FeatureSpec,
    pub models: Vec<ModelConfig>,
    /// Run entities on a thread pool; each entity owns its own cache folder.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("data"),
            entities: Vec::new(),
            group_column: "pat_id".to_string(),
            train_fraction: 0.75,
            seed: 123456789,
            features: FeatureSpec::default(),
            models: vec![ModelConfig::default()],
            parallel: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_split(&self.group_column, self.train_fraction)?;
        self.features.validate()?;
        // the grouping key must never reach the numeric block
        if !self.features.info.contains(&self.group_column) {
            return Err(LearnerError::Config(format!(
                "features.info must include the group column '{}'",
                self.group_column
            )));
        }
        if self.models.is_empty() {
            return Err(LearnerError::Config("at least one model is required".into()));
        }
        let mut names = HashSet::new();
        for model in &self.models {
            if !names.insert(model.name()) {
                return Err(LearnerError::Config(format!(
                    "model '{}' configured more than once",
                    model.name()
                )));
            }
        }
        Ok(())
    }
}

/// One institution's dataset folder. `name` is also the column header that
/// holds this institution's tokens in every correspondence table.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InstitutionConfig {
    pub name: String,
    pub dataset_root: PathBuf,
}

/// The same lab under each institution's own naming.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EntityPair {
    pub source: String,
    pub destination: String,
}

/// Parameters for applying a source institution's model to a destination.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    pub source: InstitutionConfig,
    pub destination: InstitutionConfig,
    pub entities: Vec<EntityPair>,
    /// The source model that is transplanted.
    pub model: ModelConfig,
    pub correspondence_tables: Vec<PathBuf>,
    pub output_root: PathBuf,
    pub group_column: String,
    pub ylabel: String,
    pub info: Vec<String>,
    /// Used only when the destination has no cached partition assignment.
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            source: InstitutionConfig {
                name: "Stanford".to_string(),
                dataset_root: PathBuf::from("data-Stanford"),
            },
            destination: InstitutionConfig {
                name: "UCSF".to_string(),
                dataset_root: PathBuf::from("data-UCSF"),
            },
            entities: Vec::new(),
            model: ModelConfig::default(),
            correspondence_tables: Vec::new(),
            output_root: PathBuf::from("transfer-Stanford-UCSF"),
            group_column: "pat_id".to_string(),
            ylabel: "all_components_normal".to_string(),
            info: vec!["pat_id".to_string()],
            train_fraction: 0.75,
            seed: 123456789,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        validate_split(&self.group_column, self.train_fraction)?;
        if self.source.name == self.destination.name {
            return Err(LearnerError::Config(
                "source and destination institutions must differ".into(),
            ));
        }
        if !self.info.contains(&self.group_column) {
            return Err(LearnerError::Config(format!(
                "info columns must include the group column '{}'",
                self.group_column
            )));
        }
        Ok(())
    }

    /// Feature roles used when processing the destination matrix.
    pub fn feature_spec(&self) -> FeatureSpec {
        FeatureSpec {
            info: self.info.clone(),
            ylabel: self.ylabel.clone(),
            remove: Vec::new(),
            keep: Vec::new(),
            select: SelectParams::default(),
        }
    }
}

fn validate_split(group_column: &str, train_fraction: f64) -> Result<()> {
    if group_column.is_empty() {
        return Err(LearnerError::Config("group_column must be set".into()));
    }
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(LearnerError::Config(format!(
            "train_fraction must be within (0, 1), got {}",
            train_fraction
        )));
    }
    Ok(())
}

/// Load a pipeline configuration from a JSON file.
pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let content = fs::read_to_string(&path)?;
    let config: PipelineConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load a transfer configuration from a JSON file.
pub fn load_transfer_config<P: AsRef<Path>>(path: P) -> Result<TransferConfig> {
    let content = fs::read_to_string(&path)?;
    let config: TransferConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
