//! Row-wise annotation and upsert into the result table.

use crate::error::{AnnotationError, PipelineError};
use crate::registry::Method;
use crate::strategy::{build_strategy, AnnotationRequest, AnnotationStrategy, Collaborators};
use crate::table::{MarkerRow, MethodField, ResultTable};
use serde::Serialize;

/// Separates the fine label from the broad category in a model answer.
pub const OUTPUT_DELIMITER: char = '|';

/// Fine label and broad category parsed from one model answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationOutput {
    pub annotation: Option<String>,
    pub broadtype: Option<String>,
}

impl AnnotationOutput {
    /// Split the trimmed text on the first `|`. Segments are trimmed and an
    /// empty segment is absent; anything after a second `|` stays in the
    /// broad category.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.trim().splitn(2, OUTPUT_DELIMITER).map(str::trim);
        let segment = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        let annotation = segment(parts.next());
        let broadtype = segment(parts.next());
        Self {
            annotation,
            broadtype,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationReport {
    pub rows: usize,
    pub annotated: usize,
    pub failed: usize,
    /// Table rows written, counting every duplicate of an identity.
    pub rows_written: usize,
    /// Rows whose identity is not in the result table.
    pub unmatched: usize,
}

pub struct AnnotationEngine<'a> {
    method: Method,
    strategy: Box<dyn AnnotationStrategy + 'a>,
    species: String,
    k: usize,
}

impl<'a> AnnotationEngine<'a> {
    /// Fails when the method's strategy lacks a collaborator it needs.
    pub fn new(
        method: Method,
        collaborators: &Collaborators<'a>,
        species: &str,
        default_k: usize,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            method,
            strategy: build_strategy(method, collaborators)?,
            species: species.to_string(),
            k: method.k_or(default_k),
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn request_for(&self, row: &MarkerRow) -> AnnotationRequest {
        AnnotationRequest {
            marker_genes: vec![row.key.marker.clone()],
            species: self.species.clone(),
            tissue: row.key.tissue().map(str::to_string),
            model_name: self.method.spec().model.to_string(),
            k: self.k,
        }
    }

    pub fn annotate_row(&self, row: &MarkerRow) -> Result<AnnotationOutput, AnnotationError> {
        let raw = self.strategy.annotate(&self.request_for(row))?;
        if raw.trim().is_empty() {
            return Err(AnnotationError::EmptyResponse);
        }
        Ok(AnnotationOutput::parse(&raw))
    }

    /// Annotate every row in order. A failing row is written as absent and
    /// the loop continues.
    pub fn run(&self, rows: &[MarkerRow], table: &mut ResultTable) -> AnnotationReport {
        let prefix = self.method.prefix();
        table.ensure_annotation_columns(prefix);

        let mut report = AnnotationReport {
            rows: rows.len(),
            ..AnnotationReport::default()
        };

        for row in rows {
            tracing::info!(
                dataset = %row.key.dataset,
                tissue = %row.key.tissue,
                marker = %row.key.marker,
                "Annotating"
            );

            let output = match self.annotate_row(row) {
                Ok(output) => {
                    report.annotated += 1;
                    tracing::info!(
                        annotation = output.annotation.as_deref().unwrap_or("NA"),
                        broadtype = output.broadtype.as_deref().unwrap_or("NA"),
                        "Predicted cell type"
                    );
                    output
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(row = %row.key, error = %err, "Annotation failed");
                    AnnotationOutput::default()
                }
            };

            let written = table.upsert_with(&row.key, prefix, &MethodField::ANNOTATION_GROUP, |record| {
                record.annotation = output.annotation.clone();
                record.broadtype = output.broadtype.clone();
            });
            if written == 0 {
                report.unmatched += 1;
                tracing::warn!(row = %row.key, "row is not in the result table; nothing written");
            }
            report.rows_written += written;
        }

        tracing::info!(
            method = %self.method,
            rows = report.rows,
            annotated = report.annotated,
            failed = report.failed,
            "annotation finished"
        );
        report
    }
}
