//! Raw to processed matrix transformation.
//!
//! Fit mode ([`FeatureProcessor::derive`]) removes columns, mean-imputes,
//! selects and records an [`ImputationSchema`]. Apply mode ([`apply_schema`])
//! only ever uses the recorded means and ordinals, so a train-derived schema
//! produces the same numeric layout on eval and transferred matrices.
use std::collections::{HashMap, HashSet};
use std::fmt;

use ndarray::{Array1, Array2};

use crate::config::FeatureSpec;
use crate::error::{LearnerError, Result};
use crate::feature_selection::{FeatureRanker, UnivariateRanker};
use crate::schema::ImputationSchema;
use crate::table::{Column, Table};

/// Columns ordered as `[label, info..., numeric block in schema order]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedMatrix {
    label: Column,
    info: Vec<Column>,
    feature_names: Vec<String>,
    features: Array2<f64>,
}

impl ProcessedMatrix {
    pub fn new(label: Column, info: Vec<Column>, feature_names: Vec<String>, features: Array2<f64>) -> Result<Self> {
        let nrows = label.len();
        if let Some(col) = info.iter().find(|c| c.len() != nrows) {
            return Err(LearnerError::invariant(format!(
                "info column '{}' has {} rows, label has {}",
                col.name,
                col.len(),
                nrows
            )));
        }
        if features.nrows() != nrows || features.ncols() != feature_names.len() {
            return Err(LearnerError::invariant(format!(
                "feature block is {}x{}, expected {}x{}",
                features.nrows(),
                features.ncols(),
                nrows,
                feature_names.len()
            )));
        }
        if features.iter().any(|v| v.is_nan()) {
            return Err(LearnerError::invariant("feature block contains missing values"));
        }
        Ok(ProcessedMatrix {
            label,
            info,
            feature_names,
            features,
        })
    }

    pub fn nrows(&self) -> usize {
        self.label.len()
    }

    pub fn label(&self) -> &Column {
        &self.label
    }

    pub fn info(&self) -> &[Column] {
        &self.info
    }

    pub fn info_column(&self, name: &str) -> Option<&Column> {
        self.info.iter().find(|c| c.name == name)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Label as 0.0 / 1.0 per row.
    pub fn label_values(&self) -> Result<Vec<f64>> {
        parse_binary_label(&self.label)
    }

    pub fn to_table(&self) -> Result<Table> {
        let mut columns = Vec::with_capacity(1 + self.info.len() + self.feature_names.len());
        columns.push(self.label.clone());
        columns.extend(self.info.iter().cloned());
        for (idx, name) in self.feature_names.iter().enumerate() {
            let values: Vec<f64> = self.features.column(idx).to_vec();
            columns.push(Column::from_numbers(name.clone(), &values));
        }
        Table::new(columns)
    }

    /// Rebuild from a persisted table. Every column other than the label and
    /// info columns belongs to the numeric block and must be fully numeric.
    pub fn from_table(table: Table, ylabel: &str, info: &[String], artifact: &str) -> Result<Self> {
        let corrupt = |reason: String| LearnerError::corrupt(artifact, reason);

        let label = table
            .column(ylabel)
            .cloned()
            .ok_or_else(|| corrupt(format!("label column '{}' is absent", ylabel)))?;
        let info_columns = info
            .iter()
            .map(|name| {
                table
                    .column(name)
                    .cloned()
                    .ok_or_else(|| corrupt(format!("info column '{}' is absent", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let nrows = table.nrows();
        let mut feature_names = Vec::new();
        let mut values = Vec::new();
        for column in table.columns() {
            if column.name == ylabel || info.contains(&column.name) {
                continue;
            }
            let parsed = column
                .parse_numeric()
                .map_err(|cell| corrupt(format!("non-numeric value '{}' in '{}'", cell, column.name)))?;
            let dense = parsed
                .into_iter()
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| corrupt(format!("missing value in feature '{}'", column.name)))?;
            feature_names.push(column.name.clone());
            values.push(dense);
        }

        let features = Array2::from_shape_fn((nrows, feature_names.len()), |(r, c)| values[c][r]);
        ProcessedMatrix::new(label, info_columns, feature_names, features).map_err(|e| corrupt(e.to_string()))
    }
}

/// Parse a binary outcome column. Accepts `0`/`1` in any numeric spelling
/// and `True`/`False`.
pub fn parse_binary_label(column: &Column) -> Result<Vec<f64>> {
    column
        .cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            let raw = cell.as_deref().ok_or_else(|| {
                LearnerError::invariant(format!("label '{}' is missing at row {}", column.name, row + 1))
            })?;
            match raw.trim() {
                t if t.eq_ignore_ascii_case("true") => Ok(1.0),
                t if t.eq_ignore_ascii_case("false") => Ok(0.0),
                t => match t.parse::<f64>() {
                    Ok(v) if v == 0.0 || v == 1.0 => Ok(v),
                    _ => Err(LearnerError::invariant(format!(
                        "label '{}' has non-binary value '{}' at row {}",
                        column.name,
                        raw,
                        row + 1
                    ))),
                },
            }
        })
        .collect()
}

fn require_column<'a>(raw: &'a Table, name: &str, role: &str) -> Result<&'a Column> {
    raw.column(name)
        .ok_or_else(|| LearnerError::schema_mismatch(name, format!("{} column absent from input matrix", role)))
}

/// Transform `raw` with a previously derived schema.
///
/// Missing cells take the schema's recorded mean and the numeric block
/// follows the schema's ordinals, whatever the column order of `raw`.
pub fn apply_schema(raw: &Table, spec: &FeatureSpec, schema: &ImputationSchema) -> Result<ProcessedMatrix> {
    let label = require_column(raw, &spec.ylabel, "label")?.clone();
    let info = spec
        .info
        .iter()
        .map(|name| require_column(raw, name, "info").cloned())
        .collect::<Result<Vec<_>>>()?;

    let nrows = raw.nrows();
    let mut values = Vec::with_capacity(schema.len());
    for entry in schema.entries() {
        if entry.feature == spec.ylabel || spec.info.contains(&entry.feature) {
            return Err(LearnerError::invariant(format!(
                "schema feature '{}' is also the label or an info column",
                entry.feature
            )));
        }
        let column = require_column(raw, &entry.feature, "schema")?;
        let parsed = column.parse_numeric().map_err(|cell| {
            LearnerError::schema_mismatch(entry.feature.clone(), format!("non-numeric value '{}'", cell))
        })?;
        values.push(
            parsed
                .into_iter()
                .map(|v| v.unwrap_or(entry.value))
                .collect::<Vec<f64>>(),
        );
    }

    let feature_names = schema.features().into_iter().map(str::to_string).collect();
    let features = Array2::from_shape_fn((nrows, values.len()), |(r, c)| values[c][r]);
    ProcessedMatrix::new(label, info, feature_names, features)
}

/// Fit-mode processing with a pluggable ranker.
pub struct FeatureProcessor {
    ranker: Box<dyn FeatureRanker>,
}

struct Imputed {
    name: String,
    mean: f64,
    values: Vec<f64>,
}

impl FeatureProcessor {
    pub fn new(ranker: Box<dyn FeatureRanker>) -> Self {
        FeatureProcessor { ranker }
    }

    /// Processor using the ranker named by `spec.select.algorithm`.
    pub fn for_spec(spec: &FeatureSpec) -> Self {
        Self::new(Box::new(UnivariateRanker::new(spec.select.algorithm)))
    }

    /// Derive a schema from `raw` and return the processed matrix it yields.
    ///
    /// The numeric block is the selected features in raw column order
    /// followed by the `keep` features in `spec` order.
    pub fn derive(&self, raw: &Table, spec: &FeatureSpec) -> Result<(ProcessedMatrix, ImputationSchema)> {
        if raw.nrows() == 0 {
            return Err(LearnerError::invariant("cannot derive a schema from an empty matrix"));
        }
        let label = require_column(raw, &spec.ylabel, "label")?;
        for name in &spec.info {
            require_column(raw, name, "info")?;
        }
        for name in &spec.keep {
            require_column(raw, name, "keep")?;
        }

        let set_aside: HashSet<&str> = spec
            .info
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(spec.ylabel.as_str()))
            .collect();
        let removed: HashSet<&str> = spec.remove.iter().map(String::as_str).collect();
        for name in &spec.remove {
            if !raw.has_column(name) {
                log::debug!("Remove column '{}' not in matrix", name);
            }
        }

        let mut imputed: Vec<Imputed> = Vec::new();
        let mut dropped: HashMap<&str, DropReason> = HashMap::new();
        for column in raw
            .columns()
            .iter()
            .filter(|c| !set_aside.contains(c.name.as_str()) && !removed.contains(c.name.as_str()))
        {
            match impute_mean(column) {
                Ok(c) => imputed.push(c),
                Err(reason) => {
                    log::warn!("Dropping column '{}': {}", column.name, reason);
                    dropped.insert(column.name.as_str(), reason);
                }
            }
        }

        let keep: HashSet<&str> = spec.keep.iter().map(String::as_str).collect();
        let (kept, candidates): (Vec<&Imputed>, Vec<&Imputed>) =
            imputed.iter().partition(|c| keep.contains(c.name.as_str()));

        let k = ((spec.select.fraction * raw.ncols() as f64) + 1e-9).floor() as usize;
        let selected = self.select(&candidates, label, k)?;

        let mut ordered: Vec<(String, f64)> = selected.iter().map(|c| (c.name.clone(), c.mean)).collect();
        // keep block follows the selected block, in configured order
        for name in &spec.keep {
            match kept.iter().find(|c| &c.name == name) {
                Some(c) => ordered.push((c.name.clone(), c.mean)),
                None => match dropped.get(name.as_str()) {
                    Some(reason) => log::warn!("Keep feature '{}' was dropped: {}", name, reason),
                    None => log::warn!("Keep feature '{}' was dropped", name),
                },
            }
        }

        let schema = ImputationSchema::from_ordered(ordered)?;
        log::info!(
            "Derived schema with {} features ({} selected of {} candidates, {} kept) using {}",
            schema.len(),
            selected.len(),
            candidates.len(),
            schema.len() - selected.len(),
            self.ranker.name()
        );

        let processed = apply_schema(raw, spec, &schema)?;
        Ok((processed, schema))
    }

    /// Apply a schema. Never recomputes statistics from `raw`.
    pub fn apply(&self, raw: &Table, spec: &FeatureSpec, schema: &ImputationSchema) -> Result<ProcessedMatrix> {
        apply_schema(raw, spec, schema)
    }

    /// Top `k` candidates by rank, returned in their original order.
    fn select<'a>(&self, candidates: &[&'a Imputed], label: &Column, k: usize) -> Result<Vec<&'a Imputed>> {
        let k = k.min(candidates.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if k == candidates.len() {
            return Ok(candidates.to_vec());
        }

        let y = Array1::from_vec(parse_binary_label(label)?);
        let x = Array2::from_shape_fn((y.len(), candidates.len()), |(r, c)| candidates[c].values[r]);
        let ranks = self.ranker.rank(&x, &y)?;
        if ranks.len() != candidates.len() {
            return Err(LearnerError::invariant(format!(
                "ranker returned {} ranks for {} columns",
                ranks.len(),
                candidates.len()
            )));
        }

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by_key(|&i| (ranks[i], i));
        let mut chosen: Vec<usize> = order.into_iter().take(k).collect();
        chosen.sort_unstable();

        for &i in &chosen {
            log::debug!("Selected '{}' (rank {})", candidates[i].name, ranks[i]);
        }
        Ok(chosen.into_iter().map(|i| candidates[i]).collect())
    }
}

/// Why a candidate column cannot be mean-imputed.
#[derive(Debug, Clone, PartialEq)]
enum DropReason {
    NonNumeric(String),
    AllMissing,
    NonFiniteMean,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NonNumeric(cell) => write!(f, "non-numeric value '{}'", cell),
            DropReason::AllMissing => f.write_str("every value is missing"),
            DropReason::NonFiniteMean => f.write_str("mean is not finite"),
        }
    }
}

/// Mean-impute one candidate column.
fn impute_mean(column: &Column) -> std::result::Result<Imputed, DropReason> {
    let parsed = column.parse_numeric().map_err(DropReason::NonNumeric)?;

    let present: Vec<f64> = parsed.iter().flatten().copied().collect();
    if present.is_empty() {
        return Err(DropReason::AllMissing);
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    if !mean.is_finite() {
        return Err(DropReason::NonFiniteMean);
    }

    Ok(Imputed {
        name: column.name.clone(),
        mean,
        values: parsed.into_iter().map(|v| v.unwrap_or(mean)).collect(),
    })
}
