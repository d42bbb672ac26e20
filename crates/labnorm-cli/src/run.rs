//! `labnorm run`: train/eval pipeline over a dataset folder.
use std::path::Path;

use anyhow::{bail, Context, Result};

use labnorm_learner::config::{load_pipeline_config, PipelineConfig};
use labnorm_learner::pipeline::{EntitySummary, Pipeline};

/// Load and validate a pipeline configuration file.
pub fn load_run_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    load_pipeline_config(&path)
        .with_context(|| format!("Failed to load config: {}", path.as_ref().display()))
}

/// Restrict the configured entities to `selected`, keeping config order.
/// An empty selection keeps every entity.
pub fn select_entities(config: &mut PipelineConfig, selected: &[String]) -> Result<()> {
    if selected.is_empty() {
        return Ok(());
    }
    for name in selected {
        if !config.entities.contains(name) {
            bail!("Entity '{}' is not listed in the configuration", name);
        }
    }
    config.entities.retain(|e| selected.contains(e));
    Ok(())
}

pub fn run_pipeline(config: PipelineConfig) -> Result<Vec<EntitySummary>> {
    if config.entities.is_empty() {
        bail!("No entities to run");
    }
    let root = config.dataset_root.clone();
    Pipeline::new(config)
        .run_all()
        .with_context(|| format!("Pipeline failed under {}", root.display()))
}

/// One line per entity and model.
pub fn format_summaries(summaries: &[EntitySummary]) -> String {
    let mut out = String::new();
    for summary in summaries {
        for model in &summary.models {
            let auc = match (model.cached, model.auc) {
                (true, _) => "cached".to_string(),
                (false, Some(auc)) => format!("{:.4}", auc),
                (false, None) => "n/a".to_string(),
            };
            out.push_str(&format!(
                "{}\t{}\ttrain={}\teval={}\tfeatures={}\tauc={}\n",
                summary.entity,
                model.algorithm,
                summary.train_rows,
                summary.eval_rows,
                summary.features,
                auc
            ));
        }
    }
    out
}
