mod common;

use labnorm_learner::config::{FeatureSpec, ModelConfig};
use labnorm_learner::models::build_model;
use labnorm_learner::processing::apply_schema;
use labnorm_learner::schema::ImputationSchema;
use labnorm_learner::table::{Column, Table};
use labnorm_learner::transfer::{map_feature, CorrespondenceTable, Resolution, TransferEngine};
use labnorm_learner::LearnerError;

use common::text;

fn spec() -> FeatureSpec {
    FeatureSpec {
        info: vec!["pat_id".to_string()],
        ylabel: "y".to_string(),
        remove: vec![],
        keep: vec![],
        ..FeatureSpec::default()
    }
}

fn logistic() -> ModelConfig {
    ModelConfig::new(0.1, "logistic-regression".parse().unwrap())
}

fn destination(extra: Vec<Column>) -> Table {
    let mut columns = vec![
        text("pat_id", &[Some("a"), Some("a"), Some("b"), Some("c")]),
        text("y", &[Some("0"), Some("1"), Some("0"), Some("1")]),
    ];
    columns.extend(extra);
    Table::new(columns).unwrap()
}

#[test]
fn unmatched_feature_gets_zero_column_and_source_mean() {
    let source_schema =
        ImputationSchema::from_ordered(vec![("Foo.preTimeDays", 4.2), ("LABX.pre", 1.0)]).unwrap();
    let features = vec!["Foo.preTimeDays".to_string(), "LABX.pre".to_string()];

    // source model trained on the same two columns
    let source = Table::new(vec![
        text("pat_id", &[Some("s1"), Some("s2"), Some("s3"), Some("s4")]),
        text("y", &[Some("0"), Some("1"), Some("0"), Some("1")]),
        text("Foo.preTimeDays", &[Some("3"), Some("5"), None, Some("4")]),
        text("LABX.pre", &[Some("0.1"), Some("2.0"), Some("0.2"), Some("1.9")]),
    ])
    .unwrap();
    let train = apply_schema(&source, &spec(), &source_schema).unwrap();
    let mut model = build_model(logistic());
    let groups: Vec<String> = (0..4).map(|i| format!("s{}", i)).collect();
    model.fit(train.features(), &train.label_values().unwrap(), &groups).unwrap();

    let dest = destination(vec![text("LABX.pre", &[Some("0.3"), None, Some("0.1"), Some("2.2")])]);
    let engine = TransferEngine::new(vec![], "pat_id", spec());
    let outcome = engine.transfer(&source_schema, &features, &dest).unwrap();

    assert_eq!(outcome.schema.features(), vec!["Foo.preTimeDays", "LABX.pre"]);
    assert_eq!(outcome.schema.get("Foo.preTimeDays").unwrap().value, 4.2);
    assert_eq!(outcome.matrix.features().column(0).to_vec(), vec![0.0; 4]);
    // missing destination cell takes the source mean
    assert_eq!(outcome.matrix.features()[(1, 1)], 1.0);
    assert_eq!(outcome.report.count(Resolution::Synthesized), 1);
    assert_eq!(outcome.report.count(Resolution::Exact), 1);

    let proba = engine.score(&outcome, model.as_ref()).unwrap();
    assert_eq!(proba.len(), dest.nrows());
    assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn mapped_name_is_used_when_exact_is_absent() {
    let tables = vec![CorrespondenceTable::from_reader(
        "Stanford,UCSF\nNA,Sodium\nK,Potassium\n".as_bytes(),
        b',',
        "Stanford",
        "UCSF",
        "lab_names.csv",
    )
    .unwrap()];
    assert_eq!(map_feature(&tables, "NA.pre"), Some("Sodium.pre".to_string()));
    assert_eq!(map_feature(&tables, "NAx.pre"), None);

    let schema = ImputationSchema::from_ordered(vec![("NA.pre", 140.0), ("K.preTimeDays", 2.0)]).unwrap();
    let features: Vec<String> = schema.features().into_iter().map(str::to_string).collect();
    let dest = destination(vec![
        text("Sodium.pre", &[Some("139"), Some("141"), None, Some("138")]),
        text("Potassium.preTimeDays", &[Some("1"), Some("3"), Some("2"), Some("2")]),
    ]);

    let outcome = TransferEngine::new(tables, "pat_id", spec())
        .transfer(&schema, &features, &dest)
        .unwrap();
    assert_eq!(outcome.schema.features(), vec!["Sodium.pre", "Potassium.preTimeDays"]);
    assert_eq!(outcome.report.count(Resolution::Mapped), 2);
    assert_eq!(outcome.matrix.features()[(2, 0)], 140.0);
}

#[test]
fn colliding_features_get_distinct_dummy_columns() {
    let tables = vec![CorrespondenceTable::new(
        "names",
        vec![("Na".to_string(), "Sodium".to_string())],
    )];
    let schema = ImputationSchema::from_ordered(vec![("Na.pre", 140.0), ("Sodium.pre", 139.0)]).unwrap();
    let features: Vec<String> = schema.features().into_iter().map(str::to_string).collect();
    let dest = destination(vec![
        text("Sodium.pre", &[Some("139"), Some("141"), Some("140"), Some("138")]),
        text("dummy_1", &[Some("9"), Some("9"), Some("9"), Some("9")]),
    ]);

    let outcome = TransferEngine::new(tables, "pat_id", spec())
        .transfer(&schema, &features, &dest)
        .unwrap();

    assert_eq!(outcome.schema.features(), vec!["Sodium.pre", "dummy_1_1"]);
    assert_eq!(outcome.report.features[0].resolution, Resolution::Mapped);
    assert_eq!(outcome.report.features[1].resolution, Resolution::Disambiguated);
    assert_eq!(outcome.matrix.features().column(1).to_vec(), vec![0.0; 4]);
    assert_eq!(outcome.matrix.feature_names().len(), schema.len());
}

#[test]
fn collision_dummy_is_named_after_schema_position() {
    let tables = vec![CorrespondenceTable::new(
        "names",
        vec![("Na".to_string(), "Sodium".to_string())],
    )];
    let schema = ImputationSchema::from_ordered(vec![
        ("Glucose.pre", 95.0),
        ("Na.pre", 140.0),
        ("Sodium.pre", 139.0),
    ])
    .unwrap();
    // the model was trained on the last two features only
    let features = vec!["Na.pre".to_string(), "Sodium.pre".to_string()];
    let dest = destination(vec![text("Sodium.pre", &[Some("139"), Some("141"), Some("140"), Some("138")])]);

    let outcome = TransferEngine::new(tables, "pat_id", spec())
        .transfer(&schema, &features, &dest)
        .unwrap();

    assert_eq!(outcome.schema.features(), vec!["Sodium.pre", "dummy_2"]);
    assert_eq!(outcome.report.features[1].resolution, Resolution::Disambiguated);
}

#[test]
fn exact_source_name_beats_mapping() {
    let tables = vec![CorrespondenceTable::new(
        "names",
        vec![("LABX".to_string(), "LABY".to_string())],
    )];
    let schema = ImputationSchema::from_ordered(vec![("LABX.pre", 1.0)]).unwrap();
    let dest = destination(vec![
        text("LABX.pre", &[Some("1"), Some("2"), Some("3"), Some("4")]),
        text("LABY.pre", &[Some("5"), Some("6"), Some("7"), Some("8")]),
    ]);

    let outcome = TransferEngine::new(tables, "pat_id", spec())
        .transfer(&schema, &["LABX.pre".to_string()], &dest)
        .unwrap();
    assert_eq!(outcome.report.features[0].resolution, Resolution::Exact);
    assert_eq!(outcome.matrix.features().column(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn destination_without_group_key_is_unresolvable() {
    let schema = ImputationSchema::from_ordered(vec![("LABX.pre", 1.0)]).unwrap();
    let dest = Table::new(vec![
        text("y", &[Some("0"), Some("1")]),
        text("LABX.pre", &[Some("1"), Some("2")]),
    ])
    .unwrap();

    let err = TransferEngine::new(vec![], "pat_id", spec())
        .transfer(&schema, &["LABX.pre".to_string()], &dest)
        .err()
        .unwrap();
    assert!(matches!(err, LearnerError::UnresolvableTransfer { ref feature, .. } if feature == "pat_id"));
}

#[test]
fn feature_absent_from_source_schema_is_unresolvable() {
    let schema = ImputationSchema::from_ordered(vec![("LABX.pre", 1.0)]).unwrap();
    let dest = destination(vec![]);
    let err = TransferEngine::new(vec![], "pat_id", spec())
        .transfer(&schema, &["Other.pre".to_string()], &dest)
        .err()
        .unwrap();
    assert!(matches!(err, LearnerError::UnresolvableTransfer { .. }));
}
