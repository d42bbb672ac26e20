//! `labnorm transfer`: apply one institution's models to another's data.
use std::path::Path;

use anyhow::{bail, Context, Result};

use labnorm_learner::config::{load_transfer_config, TransferConfig};
use labnorm_learner::pipeline::{TransferRunner, TransferSummary};

pub fn load_transfer_run_config<P: AsRef<Path>>(path: P) -> Result<TransferConfig> {
    load_transfer_config(&path)
        .with_context(|| format!("Failed to load config: {}", path.as_ref().display()))
}

/// Keep the entity pairs whose source or destination name is in `selected`.
pub fn select_pairs(config: &mut TransferConfig, selected: &[String]) -> Result<()> {
    if selected.is_empty() {
        return Ok(());
    }
    for name in selected {
        if !config
            .entities
            .iter()
            .any(|p| &p.source == name || &p.destination == name)
        {
            bail!("Entity '{}' is not listed in the configuration", name);
        }
    }
    config
        .entities
        .retain(|p| selected.contains(&p.source) || selected.contains(&p.destination));
    Ok(())
}

pub fn run_transfer(config: TransferConfig) -> Result<Vec<Option<TransferSummary>>> {
    if config.entities.is_empty() {
        bail!("No entity pairs to transfer");
    }
    let label = format!("{} -> {}", config.source.name, config.destination.name);
    let runner = TransferRunner::new(config).context("Failed to prepare transfer")?;
    runner
        .run_all()
        .with_context(|| format!("Transfer {} failed", label))
}

pub fn format_summaries(summaries: &[Option<TransferSummary>]) -> String {
    let mut out = String::new();
    for summary in summaries.iter().flatten() {
        let auc = summary
            .auc
            .map(|a| format!("{:.4}", a))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "{}\t{}\trows={}\tauc={}\t{}\n",
            summary.source, summary.destination, summary.rows, auc, summary.report
        ));
    }
    out
}
