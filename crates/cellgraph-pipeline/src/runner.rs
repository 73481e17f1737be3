//! End-to-end run: annotate, save, reload, score, save.

use crate::annotate::{AnnotationEngine, AnnotationReport};
use crate::error::PipelineError;
use crate::registry::Method;
use crate::score::{ScoringEngine, ScoringReport, DEFAULT_WEIGHT};
use crate::strategy::Collaborators;
use crate::table::{ResultTable, RowFilter};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_RAG_K: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Input table with identities and curated references.
    pub input_path: PathBuf,
    pub method: String,
    pub species: String,
    pub dataset: Option<String>,
    pub tissue: Option<String>,
    pub default_rag_k: usize,
    pub weight: f64,
    /// Prior result table to extend; the input table when `None`.
    pub init_result_path: Option<PathBuf>,
    pub save_path: PathBuf,
}

impl PipelineConfig {
    pub fn new(input_path: &Path, method: &str, species: &str, save_path: &Path) -> Self {
        Self {
            input_path: input_path.to_path_buf(),
            method: method.to_string(),
            species: species.to_string(),
            dataset: None,
            tissue: None,
            default_rag_k: DEFAULT_RAG_K,
            weight: DEFAULT_WEIGHT,
            init_result_path: None,
            save_path: save_path.to_path_buf(),
        }
    }

    pub fn filter(&self) -> RowFilter {
        RowFilter::new(self.dataset.as_deref(), self.tissue.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub method: String,
    pub annotation: AnnotationReport,
    pub scoring: ScoringReport,
    pub save_path: PathBuf,
}

/// Run one method over the filtered input rows.
///
/// Configuration is checked before any row is touched: the method name, the
/// weight, and the collaborators the method's strategy needs.
pub fn run_pipeline(
    config: &PipelineConfig,
    collaborators: &Collaborators<'_>,
) -> Result<PipelineReport, PipelineError> {
    let method: Method = config.method.parse()?;
    let scorer = ScoringEngine::new(method, config.weight)?;
    let annotator = AnnotationEngine::new(method, collaborators, &config.species, config.default_rag_k)?;
    let filter = config.filter();

    let input = ResultTable::load(&config.input_path)?;
    let rows = input.marker_rows(&filter);
    tracing::info!(
        method = %method,
        input = %config.input_path.display(),
        rows = rows.len(),
        "starting annotation"
    );

    let mut table = match &config.init_result_path {
        Some(path) => ResultTable::load(path)?,
        None => input,
    };

    let annotation = annotator.run(&rows, &mut table);
    table.save(&config.save_path)?;

    let saved = ResultTable::load(&config.save_path)?;
    let scoring = scorer.run(saved.rows_matching(&filter), &mut table);
    table.save(&config.save_path)?;

    tracing::info!(save_path = %config.save_path.display(), "results saved");
    Ok(PipelineReport {
        method: method.to_string(),
        annotation,
        scoring,
        save_path: config.save_path.clone(),
    })
}

/// Re-score an existing result table in place.
pub fn score_table(
    path: &Path,
    method: &str,
    filter: &RowFilter,
    weight: f64,
    save_path: &Path,
) -> Result<ScoringReport, PipelineError> {
    let method: Method = method.parse()?;
    let scorer = ScoringEngine::new(method, weight)?;
    let mut table = ResultTable::load(path)?;
    let view = table.clone();
    let report = scorer.run(view.rows_matching(filter), &mut table);
    table.save(save_path)?;
    Ok(report)
}
