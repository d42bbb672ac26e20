//! Typed gateway to every persisted artifact of a dataset.
//!
//! Matrices are tab-delimited, partition assignments and predictions are
//! comma-delimited, schemas and models are JSON. Anything read back that
//! fails to parse or fails a structural check is reported as
//! [`LearnerError::CacheCorruption`].
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{ArtifactCache, ArtifactKey, FsCache, MemoryCache, Role};
use crate::config::FeatureSpec;
use crate::error::{LearnerError, Result};
use crate::partition::PartitionAssignment;
use crate::processing::ProcessedMatrix;
use crate::schema::ImputationSchema;
use crate::table::{format_number, Column, Table};

const MATRIX_DELIMITER: u8 = b'\t';
const PREDICTION_DELIMITER: u8 = b',';

#[derive(Clone)]
pub struct MatrixStore {
    cache: Arc<dyn ArtifactCache>,
}

impl MatrixStore {
    pub fn new(cache: Arc<dyn ArtifactCache>) -> Self {
        MatrixStore { cache }
    }

    /// Store rooted at a dataset folder on disk.
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsCache::new(root)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    pub fn cache(&self) -> &dyn ArtifactCache {
        self.cache.as_ref()
    }

    pub fn contains(&self, entity: &str, role: &Role) -> bool {
        self.cache.exists(&ArtifactKey::new(entity, role.clone()))
    }

    fn read(&self, entity: &str, role: &Role) -> Result<(ArtifactKey, Vec<u8>)> {
        let key = ArtifactKey::new(entity, role.clone());
        let bytes = self.cache.read(&key)?;
        Ok((key, bytes))
    }

    fn write(&self, entity: &str, role: &Role, bytes: &[u8]) -> Result<()> {
        self.cache.write(&ArtifactKey::new(entity, role.clone()), bytes)
    }

    fn load_table(&self, entity: &str, role: &Role, delimiter: u8) -> Result<Table> {
        let (key, bytes) = self.read(entity, role)?;
        Table::from_bytes(&bytes, delimiter).map_err(|e| LearnerError::corrupt(key.to_string(), e.to_string()))
    }

    pub fn load_raw(&self, entity: &str) -> Result<Table> {
        let raw = self.load_table(entity, &Role::Raw, MATRIX_DELIMITER)?;
        log::debug!("[{}] Loaded raw matrix: {} rows x {} columns", entity, raw.nrows(), raw.ncols());
        Ok(raw)
    }

    pub fn save_raw(&self, entity: &str, raw: &Table) -> Result<()> {
        self.write(entity, &Role::Raw, &raw.to_bytes(MATRIX_DELIMITER)?)
    }

    /// Load one of the processed roles, splitting columns by `spec`'s label
    /// and info names.
    pub fn load_processed(&self, entity: &str, role: &Role, spec: &FeatureSpec) -> Result<ProcessedMatrix> {
        let table = self.load_table(entity, role, MATRIX_DELIMITER)?;
        let artifact = ArtifactKey::new(entity, role.clone()).to_string();
        ProcessedMatrix::from_table(table, &spec.ylabel, &spec.info, &artifact)
    }

    pub fn save_processed(&self, entity: &str, role: &Role, matrix: &ProcessedMatrix) -> Result<()> {
        self.write(entity, role, &matrix.to_table()?.to_bytes(MATRIX_DELIMITER)?)
    }

    /// Numeric feature names of the entity's processed matrices.
    ///
    /// Read from the full processed matrix when present, else from the
    /// processed train matrix. Label and info columns are excluded.
    pub fn processed_feature_names(&self, entity: &str, spec: &FeatureSpec) -> Result<Vec<String>> {
        let role = if self.contains(entity, &Role::ProcessedFull) {
            Role::ProcessedFull
        } else {
            Role::ProcessedTrain
        };
        let table = self.load_table(entity, &role, MATRIX_DELIMITER)?;
        Ok(table
            .column_names()
            .into_iter()
            .filter(|name| *name != spec.ylabel && !spec.info.iter().any(|i| i == name))
            .map(str::to_string)
            .collect())
    }

    pub fn load_assignment(&self, entity: &str, group_column: &str) -> Result<PartitionAssignment> {
        let (key, bytes) = self.read(entity, &Role::PartitionAssignment)?;
        PartitionAssignment::from_bytes(&bytes, group_column, &key.to_string())
    }

    pub fn save_assignment(&self, entity: &str, assignment: &PartitionAssignment) -> Result<()> {
        self.write(entity, &Role::PartitionAssignment, &assignment.to_bytes()?)
    }

    /// Load the entity's imputation schema.
    ///
    /// A legacy schema file holding a plain `feature -> mean` object is
    /// upgraded using the column order of the processed matrix, which is why
    /// `spec` is needed.
    pub fn load_schema(&self, entity: &str, spec: &FeatureSpec) -> Result<ImputationSchema> {
        let (key, bytes) = self.read(entity, &Role::ImputationSchema)?;
        let artifact = key.to_string();

        match ImputationSchema::from_json(&bytes, &artifact) {
            Ok(schema) => Ok(schema),
            Err(err) => {
                let Ok(means) = serde_json::from_slice::<HashMap<String, f64>>(&bytes) else {
                    return Err(err);
                };
                log::warn!("[{}] Upgrading unordered legacy schema {}", entity, artifact);
                let ordered = self.processed_feature_names(entity, spec)?;
                ImputationSchema::from_unordered(&means, &ordered)
            }
        }
    }

    pub fn save_schema(&self, entity: &str, schema: &ImputationSchema) -> Result<()> {
        self.write(entity, &Role::ImputationSchema, &schema.to_json()?)
    }

    pub fn load_model_bytes(&self, entity: &str, algorithm: &str) -> Result<Vec<u8>> {
        Ok(self.read(entity, &Role::Model(algorithm.to_string()))?.1)
    }

    pub fn save_model_bytes(&self, entity: &str, algorithm: &str, bytes: &[u8]) -> Result<()> {
        self.write(entity, &Role::Model(algorithm.to_string()), bytes)
    }

    /// Write `actual,predict` pairs, one row per scored observation.
    pub fn save_predictions(&self, entity: &str, role: &Role, actual: &Column, predicted: &[f64]) -> Result<()> {
        if actual.len() != predicted.len() {
            return Err(LearnerError::invariant(format!(
                "{} labels but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        let table = Table::new(vec![
            Column::new("actual", actual.cells.clone()),
            Column::new(
                "predict",
                predicted.iter().map(|&p| Some(format_number(p))).collect(),
            ),
        ])?;
        self.write(entity, role, &table.to_bytes(PREDICTION_DELIMITER)?)
    }

    pub fn load_predictions(&self, entity: &str, role: &Role) -> Result<Table> {
        self.load_table(entity, role, PREDICTION_DELIMITER)
    }
}
