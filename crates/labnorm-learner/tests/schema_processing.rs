mod common;

use labnorm_learner::config::FeatureSpec;
use labnorm_learner::processing::{apply_schema, FeatureProcessor};
use labnorm_learner::schema::{ImputationSchema, SchemaEntry};
use labnorm_learner::store::MatrixStore;
use labnorm_learner::table::Table;
use labnorm_learner::LearnerError;
use ndarray::array;

use common::text;

fn two_feature_spec() -> FeatureSpec {
    FeatureSpec {
        info: vec![],
        ylabel: "y".to_string(),
        remove: vec![],
        keep: vec![],
        ..FeatureSpec::default()
    }
}

#[test]
fn schema_means_and_order_are_applied_verbatim() {
    let schema = ImputationSchema::new(vec![
        SchemaEntry { feature: "B".into(), position: 1, value: 2.0 },
        SchemaEntry { feature: "A".into(), position: 0, value: 5.0 },
    ])
    .unwrap();
    let raw = Table::new(vec![
        text("B", &[Some("1"), None]),
        text("A", &[None, Some("3")]),
        text("y", &[Some("0"), Some("1")]),
    ])
    .unwrap();

    let processed = apply_schema(&raw, &two_feature_spec(), &schema).unwrap();
    assert_eq!(processed.feature_names(), &["A".to_string(), "B".to_string()]);
    assert_eq!(processed.features(), &array![[5.0, 1.0], [3.0, 2.0]]);
    assert_eq!(
        processed.to_table().unwrap().column_names(),
        vec!["y", "A", "B"]
    );
}

#[test]
fn numeric_block_order_ignores_raw_column_order() {
    let raw = common::raw_matrix();
    let spec = common::feature_spec(0.3);
    let (processed, schema) = FeatureProcessor::for_spec(&spec).derive(&raw, &spec).unwrap();

    let expected: Vec<String> = schema.features().into_iter().map(str::to_string).collect();
    assert_eq!(processed.feature_names(), expected.as_slice());

    let from_reversed = apply_schema(&common::reversed(&raw), &spec, &schema).unwrap();
    assert_eq!(from_reversed.feature_names(), expected.as_slice());
    assert_eq!(from_reversed.features(), processed.features());
}

#[test]
fn applying_twice_is_bit_identical() {
    let raw = common::raw_matrix();
    let spec = common::feature_spec(0.3);
    let (_, schema) = FeatureProcessor::for_spec(&spec).derive(&raw, &spec).unwrap();

    let once = apply_schema(&raw, &spec, &schema).unwrap();
    let twice = apply_schema(&raw, &spec, &schema).unwrap();
    assert_eq!(
        once.to_table().unwrap().to_bytes(b'\t').unwrap(),
        twice.to_table().unwrap().to_bytes(b'\t').unwrap()
    );
}

#[test]
fn all_missing_and_removed_columns_are_absent() {
    let raw = common::raw_matrix();
    let spec = common::feature_spec(1.0);
    let (processed, schema) = FeatureProcessor::for_spec(&spec).derive(&raw, &spec).unwrap();

    assert!(schema.get("Empty.pre").is_none());
    assert!(schema.get("order_time").is_none());
    let table = processed.to_table().unwrap();
    assert!(!table.has_column("Empty.pre"));
    assert!(!table.has_column("order_time"));
    assert_eq!(table.nrows(), raw.nrows());
}

#[test]
fn keep_block_follows_selected_block() {
    let raw = common::raw_matrix();
    // 7 raw columns * 0.3 -> two selected features
    let spec = common::feature_spec(0.3);
    let (_, schema) = FeatureProcessor::for_spec(&spec).derive(&raw, &spec).unwrap();

    assert_eq!(schema.features(), vec!["Foo.preTimeDays", "Bar.pre", "LABX.pre"]);
    let keep = schema.get("LABX.pre").unwrap();
    assert_eq!(keep.position, 2);
}

#[test]
fn eval_side_uses_train_means() {
    let raw = common::raw_matrix();
    let spec = common::feature_spec(0.3);
    let train = raw.select_rows(&(0..70).collect::<Vec<_>>());
    let eval = raw.select_rows(&(70..100).collect::<Vec<_>>());

    let processor = FeatureProcessor::for_spec(&spec);
    let (_, schema) = processor.derive(&train, &spec).unwrap();
    let processed = processor.apply(&eval, &spec, &schema).unwrap();

    // row 70 is a missing Foo.preTimeDays cell
    let train_mean = schema.get("Foo.preTimeDays").unwrap().value;
    let foo = processed.feature_names().iter().position(|f| f == "Foo.preTimeDays").unwrap();
    assert_eq!(processed.features()[(0, foo)], train_mean);
}

#[test]
fn schema_survives_the_store() {
    let raw = common::raw_matrix();
    let spec = common::feature_spec(0.3);
    let (_, schema) = FeatureProcessor::for_spec(&spec).derive(&raw, &spec).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = MatrixStore::on_disk(dir.path());
    store.save_schema("LABX", &schema).unwrap();
    assert!(dir.path().join("LABX/feat2imputed.json").is_file());
    let loaded = store.load_schema("LABX", &spec).unwrap();
    assert_eq!(loaded.features(), schema.features());
    for (a, b) in loaded.entries().iter().zip(schema.entries()) {
        assert_eq!(a.position, b.position);
        assert!((a.value - b.value).abs() < 1e-12);
    }
}

#[test]
fn missing_schema_feature_is_a_mismatch() {
    let raw = common::raw_matrix();
    let spec = common::feature_spec(0.3);
    let schema = ImputationSchema::from_ordered(vec![("LABX.pre", 1.0), ("Baz.pre", 0.5)]).unwrap();
    match apply_schema(&raw, &spec, &schema) {
        Err(LearnerError::SchemaMismatch { feature, .. }) => assert_eq!(feature, "Baz.pre"),
        other => panic!("expected schema mismatch, got {:?}", other.map(|m| m.nrows())),
    }
}
