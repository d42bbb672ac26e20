//! Stage sequencing over the artifact cache.
//!
//! Every stage first asks the store whether its output exists; a present
//! artifact is reused as-is. Deleting an artifact is the only way to force a
//! stage to run again.
use std::path::PathBuf;

use rayon::prelude::*;

use crate::cache::{ArtifactKey, Role};
use crate::config::{EntityPair, FeatureSpec, ModelConfig, PipelineConfig, TransferConfig};
use crate::error::{LearnerError, Result};
use crate::models::{build_model, restore_model, ClassifierModel};
use crate::partition::Partitioner;
use crate::processing::{FeatureProcessor, ProcessedMatrix};
use crate::stats::roc_auc;
use crate::store::MatrixStore;
use crate::transfer::{CorrespondenceTable, TransferEngine, TransferReport};

/// Outcome of one model on one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub algorithm: String,
    /// `None` when predictions were already cached or the eval set holds a
    /// single class.
    pub auc: Option<f64>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub entity: String,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub features: usize,
    pub models: Vec<ModelSummary>,
}

/// Train/eval pipeline over one dataset root.
pub struct Pipeline {
    config: PipelineConfig,
    store: MatrixStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let store = MatrixStore::on_disk(config.dataset_root.clone());
        Self::with_store(config, store)
    }

    pub fn with_store(config: PipelineConfig, store: MatrixStore) -> Self {
        Pipeline { config, store }
    }

    pub fn store(&self) -> &MatrixStore {
        &self.store
    }

    /// Run every configured entity. With `parallel` set, entities run on the
    /// rayon pool; each writes only under its own entity namespace.
    pub fn run_all(&self) -> Result<Vec<EntitySummary>> {
        if self.config.parallel {
            self.config
                .entities
                .par_iter()
                .map(|entity| self.run_entity(entity))
                .collect()
        } else {
            self.config
                .entities
                .iter()
                .map(|entity| self.run_entity(entity))
                .collect()
        }
    }

    /// Partition, process, train and score one entity.
    pub fn run_entity(&self, entity: &str) -> Result<EntitySummary> {
        log::info!("[{}] Starting pipeline", entity);
        let spec = self.config.features.for_entity(entity);
        spec.validate()?;

        let (train, eval) = self.processed_matrices(entity, &spec)?;

        let mut models = Vec::with_capacity(self.config.models.len());
        for params in &self.config.models {
            models.push(self.run_model(entity, params, &train, &eval)?);
        }

        Ok(EntitySummary {
            entity: entity.to_string(),
            train_rows: train.nrows(),
            eval_rows: eval.nrows(),
            features: train.feature_names().len(),
            models,
        })
    }

    fn processed_matrices(&self, entity: &str, spec: &FeatureSpec) -> Result<(ProcessedMatrix, ProcessedMatrix)> {
        let cached = [Role::ProcessedTrain, Role::ProcessedEval, Role::ImputationSchema]
            .iter()
            .all(|role| self.store.contains(entity, role));

        let (train, eval) = if cached {
            log::info!("[{}] Using cached processed matrices", entity);
            let train = self.store.load_processed(entity, &Role::ProcessedTrain, spec)?;
            let eval = self.store.load_processed(entity, &Role::ProcessedEval, spec)?;
            if train.feature_names() != eval.feature_names() {
                return Err(LearnerError::corrupt(
                    format!("{}/processed matrices", entity),
                    "train and eval feature columns differ",
                ));
            }
            let schema = self.store.load_schema(entity, spec)?;
            if schema.features() != train.feature_names() {
                return Err(LearnerError::corrupt(
                    ArtifactKey::new(entity, Role::ImputationSchema).to_string(),
                    format!(
                        "schema features {:?} do not match processed columns {:?}",
                        schema.features(),
                        train.feature_names()
                    ),
                ));
            }
            (train, eval)
        } else {
            let raw = self.store.load_raw(entity)?;
            let partitioner = Partitioner::new(
                self.config.group_column.clone(),
                self.config.train_fraction,
                self.config.seed,
            );
            let split = partitioner.split_cached(&self.store, entity, &raw)?;

            let processor = FeatureProcessor::for_spec(spec);
            let (train, schema) = processor.derive(&split.train, spec)?;
            let eval = processor.apply(&split.eval, spec, &schema)?;
            let full = processor.apply(&raw, spec, &schema)?;

            self.store.save_schema(entity, &schema)?;
            self.store.save_processed(entity, &Role::ProcessedFull, &full)?;
            self.store.save_processed(entity, &Role::ProcessedTrain, &train)?;
            self.store.save_processed(entity, &Role::ProcessedEval, &eval)?;
            (train, eval)
        };

        for feature in &spec.keep {
            let in_train = train.feature_names().contains(feature);
            let in_eval = eval.feature_names().contains(feature);
            if in_train != in_eval {
                return Err(LearnerError::invariant(format!(
                    "keep feature '{}' present in only one of train/eval",
                    feature
                )));
            }
            if !in_train {
                log::warn!("[{}] Keep feature '{}' is not in the processed matrices", entity, feature);
            }
        }

        Ok((train, eval))
    }

    fn run_model(
        &self,
        entity: &str,
        params: &ModelConfig,
        train: &ProcessedMatrix,
        eval: &ProcessedMatrix,
    ) -> Result<ModelSummary> {
        let algorithm = params.name();
        let predictions = Role::Predictions(algorithm.to_string());
        if self.store.contains(entity, &predictions) {
            log::info!("[{}] {} predictions cached, skipping", entity, algorithm);
            return Ok(ModelSummary {
                algorithm: algorithm.to_string(),
                auc: None,
                cached: true,
            });
        }

        let model = self.trained_model(entity, params, train)?;
        let proba = model.predict_proba(eval.features())?;
        self.store.save_predictions(entity, &predictions, eval.label(), &proba)?;

        let auc = roc_auc(&eval.label_values()?, &proba);
        match auc {
            Some(auc) => log::info!("[{}] {} eval AUC {:.4}", entity, algorithm, auc),
            None => log::warn!("[{}] {} eval set has a single class; AUC undefined", entity, algorithm),
        }

        Ok(ModelSummary {
            algorithm: algorithm.to_string(),
            auc,
            cached: false,
        })
    }

    fn trained_model(
        &self,
        entity: &str,
        params: &ModelConfig,
        train: &ProcessedMatrix,
    ) -> Result<Box<dyn ClassifierModel>> {
        let algorithm = params.name();
        if self.store.contains(entity, &Role::Model(algorithm.to_string())) {
            log::info!("[{}] Loading cached {} model", entity, algorithm);
            let bytes = self.store.load_model_bytes(entity, algorithm)?;
            let key = ArtifactKey::new(entity, Role::Model(algorithm.to_string()));
            return restore_model(&bytes, &key.to_string());
        }

        let groups: Vec<String> = match train.info_column(&self.config.group_column) {
            Some(column) => column.cells.iter().map(|c| c.clone().unwrap_or_default()).collect(),
            None => vec![String::new(); train.nrows()],
        };

        log::info!(
            "[{}] Training {} on {} rows x {} features",
            entity,
            algorithm,
            train.nrows(),
            train.feature_names().len()
        );
        let mut model = build_model(params.clone());
        model.fit(train.features(), &train.label_values()?, &groups)?;
        self.store.save_model_bytes(entity, algorithm, &model.save()?)?;
        Ok(model)
    }
}

/// Outcome of transferring one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub source: String,
    pub destination: String,
    pub rows: usize,
    pub auc: Option<f64>,
    pub report: TransferReport,
}

/// Applies source-institution models to destination-institution data.
pub struct TransferRunner {
    config: TransferConfig,
    source: MatrixStore,
    destination: MatrixStore,
    output: MatrixStore,
    engine: TransferEngine,
}

impl TransferRunner {
    /// Open the on-disk stores named by `config` and load its correspondence
    /// tables.
    pub fn new(config: TransferConfig) -> Result<Self> {
        let tables = config
            .correspondence_tables
            .iter()
            .map(|path| CorrespondenceTable::load(path, &config.source.name, &config.destination.name))
            .collect::<Result<Vec<_>>>()?;
        let source = MatrixStore::on_disk(config.source.dataset_root.clone());
        let destination = MatrixStore::on_disk(config.destination.dataset_root.clone());
        let output = MatrixStore::on_disk(config.output_root.clone());
        Ok(Self::with_stores(config, tables, source, destination, output))
    }

    pub fn with_stores(
        config: TransferConfig,
        tables: Vec<CorrespondenceTable>,
        source: MatrixStore,
        destination: MatrixStore,
        output: MatrixStore,
    ) -> Self {
        let engine = TransferEngine::new(tables, config.group_column.clone(), config.feature_spec());
        TransferRunner {
            config,
            source,
            destination,
            output,
            engine,
        }
    }

    pub fn output_path(&self, pair: &EntityPair) -> PathBuf {
        self.config
            .output_root
            .join(&pair.source)
            .join(Role::TransferPredictions.file_name(&pair.source))
    }

    pub fn run_all(&self) -> Result<Vec<Option<TransferSummary>>> {
        self.config.entities.iter().map(|pair| self.run_entity(pair)).collect()
    }

    /// Transfer one entity. Returns `None` when its output already exists.
    pub fn run_entity(&self, pair: &EntityPair) -> Result<Option<TransferSummary>> {
        if self.output.contains(&pair.source, &Role::TransferPredictions) {
            log::info!("[{}] Transfer output exists, skipping", pair.source);
            return Ok(None);
        }
        log::info!(
            "[{}] Transferring {} model to {} ({})",
            pair.source,
            self.config.source.name,
            self.config.destination.name,
            pair.destination
        );

        let dest_raw = self.destination.load_raw(&pair.destination)?;
        if !dest_raw.has_column(&self.config.group_column) {
            return Err(LearnerError::UnresolvableTransfer {
                feature: self.config.group_column.clone(),
                reason: format!("destination matrix for '{}' lacks the grouping key", pair.destination),
            });
        }
        let partitioner = Partitioner::new(
            self.config.group_column.clone(),
            self.config.train_fraction,
            self.config.seed,
        );
        let split = partitioner.split_cached(&self.destination, &pair.destination, &dest_raw)?;

        let spec = self.config.feature_spec();
        let source_schema = self.source.load_schema(&pair.source, &spec)?;
        let source_features = self.source.processed_feature_names(&pair.source, &spec)?;
        let algorithm = self.config.model.name();
        let model_key = ArtifactKey::new(pair.source.as_str(), Role::Model(algorithm.to_string()));
        let model = restore_model(
            &self.source.load_model_bytes(&pair.source, algorithm)?,
            &model_key.to_string(),
        )?;

        let outcome = self.engine.transfer(&source_schema, &source_features, &split.eval)?;
        let proba = self.engine.score(&outcome, model.as_ref())?;
        self.output
            .save_predictions(&pair.source, &Role::TransferPredictions, outcome.matrix.label(), &proba)?;

        let auc = roc_auc(&outcome.matrix.label_values()?, &proba);
        if let Some(auc) = auc {
            log::info!("[{}] Transferred AUC {:.4}", pair.source, auc);
        }

        Ok(Some(TransferSummary {
            source: pair.source.clone(),
            destination: pair.destination.clone(),
            rows: outcome.matrix.nrows(),
            auc,
            report: outcome.report,
        }))
    }
}
