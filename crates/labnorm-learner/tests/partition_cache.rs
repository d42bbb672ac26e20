mod common;

use std::collections::{BTreeMap, HashSet};

use labnorm_learner::cache::Role;
use labnorm_learner::partition::{group_values, PartitionAssignment, Partitioner};
use labnorm_learner::store::MatrixStore;
use labnorm_learner::LearnerError;

#[test]
fn train_and_eval_partition_rows_by_group() {
    let raw = common::raw_matrix();
    let split = Partitioner::new("pat_id", 0.75, 123456789).split(&raw).unwrap();

    assert_eq!(split.train.nrows() + split.eval.nrows(), raw.nrows());

    let train: HashSet<String> = group_values(&split.train, "pat_id").unwrap().into_iter().collect();
    let eval: HashSet<String> = group_values(&split.eval, "pat_id").unwrap().into_iter().collect();
    assert!(train.is_disjoint(&eval));
    assert_eq!(train.len() + eval.len(), 10);
}

#[test]
fn hundred_rows_ten_groups_gives_seven_train_groups() {
    let raw = common::raw_matrix();
    for seed in [0, 1, 42, 123456789] {
        let assignment = Partitioner::new("pat_id", 0.75, seed).assign(&raw).unwrap();
        assert_eq!(assignment.train_groups().count(), 7);
        assert_eq!(assignment.eval_groups().count(), 3);
    }
}

#[test]
fn cached_assignment_wins_over_new_seed() {
    let raw = common::raw_matrix();
    let dir = tempfile::tempdir().unwrap();
    let store = MatrixStore::on_disk(dir.path());

    let first = Partitioner::new("pat_id", 0.75, 1)
        .split_cached(&store, "LABX", &raw)
        .unwrap();
    assert!(dir.path().join("LABX/pat_split.csv").is_file());

    let again = Partitioner::new("pat_id", 0.75, 2)
        .split_cached(&store, "LABX", &raw)
        .unwrap();
    assert_eq!(again.assignment, first.assignment);
    assert_eq!(again.train, first.train);
    assert_eq!(again.eval, first.eval);
}

#[test]
fn hand_edited_assignment_is_used_verbatim() {
    let raw = common::raw_matrix();
    let store = MatrixStore::in_memory();

    // Two train groups, which no 0.75 draw over ten groups can produce
    let flags: BTreeMap<String, bool> = (0..10).map(|i| (format!("P{:02}", i), i < 2)).collect();
    store
        .save_assignment("LABX", &PartitionAssignment::new("pat_id", flags))
        .unwrap();

    let split = Partitioner::new("pat_id", 0.75, 7)
        .split_cached(&store, "LABX", &raw)
        .unwrap();
    assert_eq!(split.train.nrows(), 20);
    assert_eq!(split.eval.nrows(), 80);
    assert_eq!(split.assignment.train_groups().collect::<Vec<_>>(), vec!["P00", "P01"]);
}

#[test]
fn assignment_from_changed_matrix_is_rejected() {
    let raw = common::raw_matrix();
    let store = MatrixStore::in_memory();
    Partitioner::new("pat_id", 0.75, 1)
        .split_cached(&store, "LABX", &raw)
        .unwrap();

    let fewer_patients = raw.select_rows(&(0..50).collect::<Vec<_>>());
    let err = Partitioner::new("pat_id", 0.75, 1)
        .split_cached(&store, "LABX", &fewer_patients)
        .unwrap_err();
    assert!(matches!(err, LearnerError::InvariantViolation(_)));
    assert!(store.contains("LABX", &Role::PartitionAssignment));
}
