//! Imputation schema: the ordered record of kept features and their imputed values.
//!
//! The position of an entry is a first-class field. It fixes the column order
//! of the numeric block of every processed matrix derived from the schema, so
//! nothing downstream depends on map iteration order.
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LearnerError, Result};

/// Version of the on-disk schema layout.
pub const SCHEMA_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub feature: String,
    pub position: usize,
    pub value: f64,
}

/// Entries are held sorted by position and positions are exactly `0..len`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationSchema {
    entries: Vec<SchemaEntry>,
}

#[derive(Serialize, Deserialize)]
struct SchemaFile {
    format_version: u32,
    created: DateTime<Utc>,
    entries: Vec<SchemaEntry>,
}

impl ImputationSchema {
    /// Build a schema from entries in any order.
    pub fn new(mut entries: Vec<SchemaEntry>) -> Result<Self> {
        entries.sort_by_key(|e| e.position);

        let mut names = HashSet::with_capacity(entries.len());
        for (expected, entry) in entries.iter().enumerate() {
            if entry.position != expected {
                return Err(LearnerError::invariant(format!(
                    "schema positions must be 0..{}, found position {} for '{}'",
                    entries.len(),
                    entry.position,
                    entry.feature
                )));
            }
            if !names.insert(entry.feature.as_str()) {
                return Err(LearnerError::invariant(format!(
                    "feature '{}' appears twice in schema",
                    entry.feature
                )));
            }
            if !entry.value.is_finite() {
                return Err(LearnerError::invariant(format!(
                    "imputed value for '{}' is not finite",
                    entry.feature
                )));
            }
        }

        Ok(ImputationSchema { entries })
    }

    /// Assign positions in iteration order.
    pub fn from_ordered<I, S>(features: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let entries = features
            .into_iter()
            .enumerate()
            .map(|(position, (feature, value))| SchemaEntry {
                feature: feature.into(),
                position,
                value,
            })
            .collect();
        Self::new(entries)
    }

    /// Upgrade an unordered feature -> mean map, taking the order from the
    /// numeric columns of a processed matrix. Means recorded for features not
    /// in `ordered_features` are ignored.
    pub fn from_unordered(means: &HashMap<String, f64>, ordered_features: &[String]) -> Result<Self> {
        let mut pairs = Vec::with_capacity(ordered_features.len());
        for feature in ordered_features {
            let value = means.get(feature).copied().ok_or_else(|| {
                LearnerError::schema_mismatch(feature.clone(), "no imputed value recorded")
            })?;
            pairs.push((feature.clone(), value));
        }
        Self::from_ordered(pairs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in position order.
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Feature names in position order.
    pub fn features(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.feature.as_str()).collect()
    }

    pub fn get(&self, feature: &str) -> Option<&SchemaEntry> {
        self.entries.iter().find(|e| e.feature == feature)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let file = SchemaFile {
            format_version: SCHEMA_FORMAT_VERSION,
            created: Utc::now(),
            entries: self.entries.clone(),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    /// Parse a persisted schema. `artifact` names the source in errors.
    pub fn from_json(bytes: &[u8], artifact: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_slice(bytes)
            .map_err(|e| LearnerError::corrupt(artifact, e.to_string()))?;
        if file.format_version != SCHEMA_FORMAT_VERSION {
            return Err(LearnerError::corrupt(
                artifact,
                format!(
                    "unsupported schema format version {} (expected {})",
                    file.format_version, SCHEMA_FORMAT_VERSION
                ),
            ));
        }
        log::debug!(
            "Loaded imputation schema {} ({} features, created {})",
            artifact,
            file.entries.len(),
            file.created
        );
        ImputationSchema::new(file.entries).map_err(|e| LearnerError::corrupt(artifact, e.to_string()))
    }
}
