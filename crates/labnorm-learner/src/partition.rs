//! Patient-grouped train/eval partitioning.
//!
//! The split is drawn over the distinct values of the group column, never
//! over rows, so a patient's rows land on one side only. Once persisted, the
//! assignment is reused verbatim and the seed is ignored.
use std::collections::{BTreeMap, BTreeSet};

use csv::{ReaderBuilder, WriterBuilder};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cache::Role;
use crate::error::{LearnerError, Result};
use crate::store::MatrixStore;
use crate::table::Table;

/// Header of the train flag column in the assignment file.
const TRAIN_FLAG_COLUMN: &str = "in_train";

/// Group value -> is-train flag, one entry per distinct group value.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionAssignment {
    group_column: String,
    flags: BTreeMap<String, bool>,
}

/// Train and eval rows of one raw matrix.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Table,
    pub eval: Table,
    pub assignment: PartitionAssignment,
}

/// Group value of every row. Missing values violate the raw matrix contract.
pub fn group_values(raw: &Table, group_column: &str) -> Result<Vec<String>> {
    let column = raw.column(group_column).ok_or_else(|| {
        LearnerError::invariant(format!("group column '{}' is absent", group_column))
    })?;
    column
        .cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.clone().ok_or_else(|| {
                LearnerError::invariant(format!(
                    "group column '{}' is missing at row {}",
                    group_column,
                    row + 1
                ))
            })
        })
        .collect()
}

impl PartitionAssignment {
    pub fn new(group_column: impl Into<String>, flags: BTreeMap<String, bool>) -> Self {
        PartitionAssignment {
            group_column: group_column.into(),
            flags,
        }
    }

    pub fn group_column(&self) -> &str {
        &self.group_column
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_train(&self, group: &str) -> Option<bool> {
        self.flags.get(group).copied()
    }

    pub fn train_groups(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().filter(|&(_, &t)| t).map(|(g, _)| g.as_str())
    }

    pub fn eval_groups(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().filter(|&(_, &t)| !t).map(|(g, _)| g.as_str())
    }

    /// Row indices of `raw` on the train and eval sides.
    ///
    /// The assignment must cover exactly the group values present in `raw`.
    pub fn row_indices(&self, raw: &Table) -> Result<(Vec<usize>, Vec<usize>)> {
        let groups = group_values(raw, &self.group_column)?;

        let present: BTreeSet<&str> = groups.iter().map(String::as_str).collect();
        if let Some(unknown) = present.iter().find(|g| !self.flags.contains_key(**g)) {
            return Err(LearnerError::invariant(format!(
                "group '{}' has no partition assignment",
                unknown
            )));
        }
        if let Some(stale) = self.flags.keys().find(|g| !present.contains(g.as_str())) {
            return Err(LearnerError::invariant(format!(
                "assigned group '{}' does not occur in the matrix",
                stale
            )));
        }

        let mut train = Vec::new();
        let mut eval = Vec::new();
        for (row, group) in groups.iter().enumerate() {
            if self.flags[group.as_str()] {
                train.push(row);
            } else {
                eval.push(row);
            }
        }

        if train.len() + eval.len() != raw.nrows() {
            return Err(LearnerError::invariant(format!(
                "partition covers {} of {} rows",
                train.len() + eval.len(),
                raw.nrows()
            )));
        }
        Ok((train, eval))
    }

    pub fn split(&self, raw: &Table) -> Result<Split> {
        let (train_rows, eval_rows) = self.row_indices(raw)?;
        Ok(Split {
            train: raw.select_rows(&train_rows),
            eval: raw.select_rows(&eval_rows),
            assignment: self.clone(),
        })
    }

    /// Two columns: group value and a 0/1 train flag.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut wtr = WriterBuilder::new().from_writer(&mut buf);
            wtr.write_record([self.group_column.as_str(), TRAIN_FLAG_COLUMN])?;
            for (group, &train) in &self.flags {
                wtr.write_record([group.as_str(), if train { "1" } else { "0" }])?;
            }
            wtr.flush()?;
        }
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8], group_column: &str, artifact: &str) -> Result<Self> {
        let corrupt = |reason: String| LearnerError::corrupt(artifact, reason);

        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(bytes);
        let headers = rdr.headers().map_err(|e| corrupt(e.to_string()))?.clone();
        let group_idx = headers
            .iter()
            .position(|h| h == group_column)
            .ok_or_else(|| corrupt(format!("missing '{}' column", group_column)))?;
        let flag_idx = headers
            .iter()
            .position(|h| h == TRAIN_FLAG_COLUMN)
            .ok_or_else(|| corrupt(format!("missing '{}' column", TRAIN_FLAG_COLUMN)))?;

        let mut flags = BTreeMap::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| corrupt(e.to_string()))?;
            let group = record.get(group_idx).unwrap_or_default().to_string();
            let train = match record.get(flag_idx).map(str::trim) {
                Some("1") => true,
                Some("0") => false,
                other => {
                    return Err(corrupt(format!(
                        "invalid train flag {:?} at row {}",
                        other,
                        row + 1
                    )))
                }
            };
            if flags.insert(group.clone(), train).is_some() {
                return Err(corrupt(format!("group '{}' assigned twice", group)));
            }
        }

        Ok(PartitionAssignment::new(group_column, flags))
    }
}

/// Draws and caches group-level train/eval assignments.
#[derive(Debug, Clone)]
pub struct Partitioner {
    pub group_column: String,
    pub train_fraction: f64,
    pub seed: u64,
}

impl Partitioner {
    pub fn new(group_column: impl Into<String>, train_fraction: f64, seed: u64) -> Self {
        Partitioner {
            group_column: group_column.into(),
            train_fraction,
            seed,
        }
    }

    /// Seeded draw over the sorted distinct group values.
    ///
    /// The train side receives `floor(train_fraction * groups)` groups,
    /// clamped so that both sides are non-empty.
    pub fn assign(&self, raw: &Table) -> Result<PartitionAssignment> {
        let groups: BTreeSet<String> = group_values(raw, &self.group_column)?.into_iter().collect();
        let n_groups = groups.len();
        if n_groups < 2 {
            return Err(LearnerError::invariant(format!(
                "need at least two distinct '{}' values to split, found {}",
                self.group_column, n_groups
            )));
        }

        let mut shuffled: Vec<String> = groups.into_iter().collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        shuffled.shuffle(&mut rng);

        let raw_train = (self.train_fraction * n_groups as f64 + 1e-9).floor() as usize;
        let n_train = raw_train.clamp(1, n_groups - 1);
        if n_train != raw_train {
            log::warn!(
                "train fraction {} over {} groups leaves one side empty; using {} train groups",
                self.train_fraction,
                n_groups,
                n_train
            );
        }

        let flags = shuffled
            .into_iter()
            .enumerate()
            .map(|(i, group)| (group, i < n_train))
            .collect();
        Ok(PartitionAssignment::new(self.group_column.clone(), flags))
    }

    /// Uncached split.
    pub fn split(&self, raw: &Table) -> Result<Split> {
        self.assign(raw)?.split(raw)
    }

    /// Split `raw`, reusing the entity's persisted assignment when present
    /// and persisting a fresh one otherwise.
    pub fn split_cached(&self, store: &MatrixStore, entity: &str, raw: &Table) -> Result<Split> {
        let assignment = if store.contains(entity, &Role::PartitionAssignment) {
            log::debug!("[{}] Reusing cached partition assignment", entity);
            store.load_assignment(entity, &self.group_column)?
        } else {
            let assignment = self.assign(raw)?;
            store.save_assignment(entity, &assignment)?;
            log::info!(
                "[{}] Partitioned {} groups ({} train / {} eval) with seed {}",
                entity,
                assignment.len(),
                assignment.train_groups().count(),
                assignment.eval_groups().count(),
                self.seed
            );
            assignment
        };

        let split = assignment.split(raw)?;
        log::info!(
            "[{}] {} train rows, {} eval rows",
            entity,
            split.train.nrows(),
            split.eval.nrows()
        );
        Ok(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn raw_matrix(groups: &[&str]) -> Table {
        Table::new(vec![
            Column::new("pat_id", groups.iter().map(|g| Some(g.to_string())).collect()),
            Column::new("x", (0..groups.len()).map(|i| Some(i.to_string())).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn same_seed_same_assignment() {
        let raw = raw_matrix(&["a", "b", "c", "d", "e", "a", "b"]);
        let p = Partitioner::new("pat_id", 0.6, 42);
        assert_eq!(p.assign(&raw).unwrap(), p.assign(&raw).unwrap());
    }

    #[test]
    fn missing_group_value_is_rejected() {
        let raw = Table::new(vec![Column::new("pat_id", vec![Some("a".into()), None])]).unwrap();
        let err = Partitioner::new("pat_id", 0.5, 1).assign(&raw).unwrap_err();
        assert!(matches!(err, LearnerError::InvariantViolation(_)));
    }

    #[test]
    fn assignment_file_round_trip() {
        let raw = raw_matrix(&["10", "11", "12", "13"]);
        let assignment = Partitioner::new("pat_id", 0.5, 3).assign(&raw).unwrap();
        let bytes = assignment.to_bytes().unwrap();
        assert!(String::from_utf8(bytes.clone()).unwrap().starts_with("pat_id,in_train\n"));
        let back = PartitionAssignment::from_bytes(&bytes, "pat_id", "pat_split.csv").unwrap();
        assert_eq!(back, assignment);
    }

    #[test]
    fn bad_flag_is_cache_corruption() {
        let err = PartitionAssignment::from_bytes(b"pat_id,in_train\n1,yes\n", "pat_id", "pat_split.csv")
            .unwrap_err();
        assert!(matches!(err, LearnerError::CacheCorruption { .. }));
    }

    #[test]
    fn stale_assignment_is_invariant_violation() {
        let raw = raw_matrix(&["a", "b", "c"]);
        let assignment = Partitioner::new("pat_id", 0.5, 3).assign(&raw).unwrap();
        let changed = raw_matrix(&["a", "b", "z"]);
        assert!(matches!(
            assignment.split(&changed).unwrap_err(),
            LearnerError::InvariantViolation(_)
        ));
    }
}
