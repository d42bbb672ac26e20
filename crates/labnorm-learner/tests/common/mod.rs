#![allow(dead_code)]

use labnorm_learner::config::{FeatureSpec, SelectParams};
use labnorm_learner::table::{Column, Table};

pub fn text(name: &str, values: &[Option<&str>]) -> Column {
    Column::new(name, values.iter().map(|v| v.map(str::to_string)).collect())
}

/// 100 rows over 10 patients (10 rows each) with alternating outcome.
///
/// Columns: pat_id, order_time, all_components_normal, LABX.pre (tracks the
/// outcome), Foo.preTimeDays (every 7th row missing), Bar.pre (noise) and
/// Empty.pre (always missing).
pub fn raw_matrix() -> Table {
    let n = 100;
    let mut pat = Vec::with_capacity(n);
    let mut time = Vec::with_capacity(n);
    let mut label = Vec::with_capacity(n);
    let mut signal = Vec::with_capacity(n);
    let mut foo = Vec::with_capacity(n);
    let mut bar = Vec::with_capacity(n);
    for i in 0..n {
        let y = i % 2;
        pat.push(Some(format!("P{:02}", i / 10)));
        time.push(Some(format!("2014-01-{:02}", i % 28 + 1)));
        label.push(Some(y.to_string()));
        signal.push(Some(format!("{}", y as f64 * 2.0 + (i % 5) as f64 * 0.1)));
        foo.push(if i % 7 == 0 { None } else { Some(format!("{}", i % 11)) });
        bar.push(Some(format!("{}", (i * 37 % 13) as f64 / 4.0)));
    }
    Table::new(vec![
        Column::new("pat_id", pat),
        Column::new("order_time", time),
        Column::new("all_components_normal", label),
        Column::new("LABX.pre", signal),
        Column::new("Foo.preTimeDays", foo),
        Column::new("Bar.pre", bar),
        Column::new("Empty.pre", vec![None; n]),
    ])
    .unwrap()
}

pub fn feature_spec(fraction: f64) -> FeatureSpec {
    FeatureSpec {
        info: vec!["pat_id".to_string()],
        ylabel: "all_components_normal".to_string(),
        remove: vec!["order_time".to_string()],
        keep: vec!["LABX.pre".to_string()],
        select: SelectParams {
            fraction,
            ..SelectParams::default()
        },
    }
}

/// Same table with its columns in reverse order.
pub fn reversed(table: &Table) -> Table {
    let mut columns = table.clone().into_columns();
    columns.reverse();
    Table::new(columns).unwrap()
}
