//! Cross-institution transfer of a trained model and its imputation schema.
//!
//! Source feature names are rewritten into the destination's vocabulary
//! through correspondence tables. Features with no destination column get a
//! zero-filled placeholder so the destination schema keeps the exact width
//! and order the source model was trained on.
//!
//! The destination schema reuses the source population's means. That is a
//! modelling assumption about the two populations, not something this module
//! can verify.
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;

use crate::config::FeatureSpec;
use crate::error::{LearnerError, Result};
use crate::models::ClassifierModel;
use crate::processing::{apply_schema, ProcessedMatrix};
use crate::schema::ImputationSchema;
use crate::table::{Column, Table};

/// Value written into synthesized placeholder columns.
const PLACEHOLDER_VALUE: f64 = 0.0;

/// Token pairs from one vocabulary mapping file.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceTable {
    name: String,
    entries: Vec<(String, String)>,
}

impl CorrespondenceTable {
    pub fn new(name: impl Into<String>, entries: Vec<(String, String)>) -> Self {
        CorrespondenceTable {
            name: name.into(),
            entries,
        }
    }

    /// Read the `source_column` and `destination_column` columns of a
    /// delimited file. Cells are taken verbatim: `NA` is a token here, not a
    /// missing value.
    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        source_column: &str,
        destination_column: &str,
        name: &str,
    ) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let index_of = |column: &str| {
            headers.iter().position(|h| h == column).ok_or_else(|| {
                LearnerError::Config(format!(
                    "correspondence table {} has no '{}' column",
                    name, column
                ))
            })
        };
        let src_idx = index_of(source_column)?;
        let dst_idx = index_of(destination_column)?;

        let mut entries = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let src = record.get(src_idx).unwrap_or_default().trim();
            let dst = record.get(dst_idx).unwrap_or_default().trim();
            if src.is_empty() || dst.is_empty() {
                continue;
            }
            entries.push((src.to_string(), dst.to_string()));
        }

        log::debug!("Loaded {} correspondences from {}", entries.len(), name);
        Ok(CorrespondenceTable::new(name, entries))
    }

    /// Load a mapping file; `.tab`/`.tsv` files are tab-delimited, anything
    /// else comma-delimited.
    pub fn load<P: AsRef<Path>>(path: P, source_column: &str, destination_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("tab") | Some("tsv") => b'\t',
            _ => b',',
        };
        let file = File::open(path)?;
        Self::from_reader(
            file,
            delimiter,
            source_column,
            destination_column,
            &path.display().to_string(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the leading dotted segment of `feature` when it matches a
    /// source token. The longest matching token wins.
    pub fn substitute(&self, feature: &str) -> Option<String> {
        self.entries
            .iter()
            .filter(|(src, _)| {
                feature.len() > src.len()
                    && feature.starts_with(src.as_str())
                    && feature.as_bytes()[src.len()] == b'.'
            })
            .max_by_key(|(src, _)| src.len())
            .map(|(src, dst)| format!("{}{}", dst, &feature[src.len()..]))
    }
}

/// Rewrite `feature` through every table in order. `None` when no table
/// applies.
pub fn map_feature(tables: &[CorrespondenceTable], feature: &str) -> Option<String> {
    let mut current = feature.to_string();
    let mut changed = false;
    for table in tables {
        if let Some(next) = table.substitute(&current) {
            current = next;
            changed = true;
        }
    }
    changed.then_some(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The source name exists verbatim in the destination.
    Exact,
    /// The mapped name exists in the destination.
    Mapped,
    /// Neither exists; a placeholder column was created.
    Synthesized,
    /// The destination column was already taken by an earlier feature.
    Disambiguated,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Resolution::Exact => "exact",
            Resolution::Mapped => "mapped",
            Resolution::Synthesized => "synthesized",
            Resolution::Disambiguated => "disambiguated",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureResolution {
    pub source: String,
    pub destination: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferReport {
    pub features: Vec<FeatureResolution>,
}

impl TransferReport {
    pub fn count(&self, resolution: Resolution) -> usize {
        self.features.iter().filter(|f| f.resolution == resolution).count()
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} features: {} exact, {} mapped, {} synthesized, {} disambiguated",
            self.features.len(),
            self.count(Resolution::Exact),
            self.count(Resolution::Mapped),
            self.count(Resolution::Synthesized),
            self.count(Resolution::Disambiguated)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Destination eval rows in the source model's feature layout.
    pub matrix: ProcessedMatrix,
    /// Destination-side schema with the source means.
    pub schema: ImputationSchema,
    pub report: TransferReport,
}

pub struct TransferEngine {
    tables: Vec<CorrespondenceTable>,
    group_column: String,
    spec: FeatureSpec,
}

impl TransferEngine {
    /// `spec` supplies the label and info columns of the destination matrix.
    pub fn new(tables: Vec<CorrespondenceTable>, group_column: impl Into<String>, spec: FeatureSpec) -> Self {
        TransferEngine {
            tables,
            group_column: group_column.into(),
            spec,
        }
    }

    /// Build the destination schema and processed matrix for `dest_raw`.
    ///
    /// `source_features` are the numeric columns the source model was trained
    /// on; they are walked in the source schema's ordinal order.
    pub fn transfer(
        &self,
        source_schema: &ImputationSchema,
        source_features: &[String],
        dest_raw: &Table,
    ) -> Result<TransferOutcome> {
        if !dest_raw.has_column(&self.group_column) {
            return Err(LearnerError::UnresolvableTransfer {
                feature: self.group_column.clone(),
                reason: "destination matrix lacks the grouping key".into(),
            });
        }

        let mut ordered = Vec::with_capacity(source_features.len());
        for feature in source_features {
            let entry = source_schema.get(feature).ok_or_else(|| LearnerError::UnresolvableTransfer {
                feature: feature.clone(),
                reason: "no imputed value in the source schema".into(),
            })?;
            ordered.push(entry);
        }
        ordered.sort_by_key(|e| e.position);

        let nrows = dest_raw.nrows();
        let mut working = dest_raw.clone();
        let mut taken: HashSet<String> = HashSet::new();
        let mut entries = Vec::with_capacity(ordered.len());
        let mut report = TransferReport::default();

        for entry in ordered {
            let source = entry.feature.as_str();
            let mapped = map_feature(&self.tables, source);

            let (mut destination, mut resolution) = if dest_raw.has_column(source) {
                (source.to_string(), Resolution::Exact)
            } else {
                match mapped {
                    Some(m) if dest_raw.has_column(&m) => (m, Resolution::Mapped),
                    other => (other.unwrap_or_else(|| source.to_string()), Resolution::Synthesized),
                }
            };

            if taken.contains(&destination) {
                let previous = destination;
                destination = unique_dummy_name(&working, entry.position);
                resolution = Resolution::Disambiguated;
                log::warn!(
                    "'{}' resolves to '{}', already used; placeholder '{}'",
                    source,
                    previous,
                    destination
                );
            } else if resolution == Resolution::Synthesized {
                log::warn!("'{}' has no destination column; placeholder '{}'", source, destination);
            } else {
                log::debug!("'{}' -> '{}' ({})", source, destination, resolution);
            }

            if !working.has_column(&destination) {
                working = working.with_column(Column::constant(destination.clone(), PLACEHOLDER_VALUE, nrows))?;
            }

            taken.insert(destination.clone());
            entries.push((destination.clone(), entry.value));
            report.features.push(FeatureResolution {
                source: source.to_string(),
                destination,
                resolution,
            });
        }

        let schema = ImputationSchema::from_ordered(entries)?;
        let matrix = apply_schema(&working, &self.spec, &schema)?;
        log::info!("Transferred {}", report);

        Ok(TransferOutcome { matrix, schema, report })
    }

    /// Score the transferred matrix with the source-trained model.
    pub fn score(&self, outcome: &TransferOutcome, model: &dyn ClassifierModel) -> Result<Vec<f64>> {
        let proba = model.predict_proba(outcome.matrix.features())?;
        if proba.len() != outcome.matrix.nrows() {
            return Err(LearnerError::invariant(format!(
                "model returned {} probabilities for {} rows",
                proba.len(),
                outcome.matrix.nrows()
            )));
        }
        Ok(proba)
    }
}

fn unique_dummy_name(table: &Table, ordinal: usize) -> String {
    let base = format!("dummy_{}", ordinal);
    let mut name = base.clone();
    let mut suffix = 1;
    while table.has_column(&name) {
        name = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    name
}
