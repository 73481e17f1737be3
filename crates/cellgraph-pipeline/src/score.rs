//! Row-wise BLEU scoring of stored annotations.
//!
//! ```text
//!   fine refs  ──┐                               ┌── BLEU-1, BLEU-2, BLEU-avg
//!   annotation ──┴── evaluate_bleu_score ────────┤
//!                                                │        fine_avg ──┐
//!   broad ref  ──┐                               │                   ├─► round2(w·fine + (1-w)·broad)
//!   broadtype  ──┴── evaluate_bleu_score ── broad_avg (0 if either   │
//!                                            side is missing) ───────┘
//! ```

use crate::error::{PipelineError, ScoringError};
use crate::registry::Method;
use crate::table::{MethodField, ResultTable, TableRow};
use cellgraph_metric::{evaluate_bleu_score, round2, BleuScores};
use serde::Serialize;

pub const DEFAULT_WEIGHT: f64 = 0.8;

/// The five score cells written for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowScores {
    pub fine: BleuScores,
    pub broad: BleuScores,
    pub final_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPrediction,
    NoReferences,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Scored(RowScores),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringReport {
    pub rows: usize,
    pub scored: usize,
    pub skipped_no_prediction: usize,
    pub skipped_no_references: usize,
    pub failed: usize,
    pub rows_written: usize,
}

/// `round2(weight * fine + (1 - weight) * broad)`.
pub fn blend(weight: f64, fine_avg: f64, broad_avg: f64) -> f64 {
    round2(weight * fine_avg + (1.0 - weight) * broad_avg)
}

pub struct ScoringEngine {
    method: Method,
    weight: f64,
}

impl ScoringEngine {
    /// `weight` must lie in `[0, 1]`.
    pub fn new(method: Method, weight: f64) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(PipelineError::InvalidWeight(weight));
        }
        Ok(Self { method, weight })
    }

    pub fn score_row(&self, row: &TableRow) -> Result<ScoreOutcome, ScoringError> {
        let references = row.references();
        let record = row.method(self.method.prefix());
        let Some(prediction) = record.and_then(|r| r.annotation.as_deref()) else {
            return Ok(ScoreOutcome::Skipped(SkipReason::NoPrediction));
        };
        if references.fine.is_empty() {
            return Ok(ScoreOutcome::Skipped(SkipReason::NoReferences));
        }

        let fine = evaluate_bleu_score(&references.fine, prediction).map_err(ScoringError::Fine)?;
        let broad = match (references.broad.as_deref(), record.and_then(|r| r.broadtype.as_deref())) {
            (Some(reference), Some(predicted)) => {
                evaluate_bleu_score(&[reference], predicted).map_err(ScoringError::Broad)?
            }
            _ => BleuScores::ZERO,
        };

        Ok(ScoreOutcome::Scored(RowScores {
            fine,
            broad,
            final_score: blend(self.weight, fine.bleu_avg, broad.bleu_avg),
        }))
    }

    /// Score `rows` and write the results into `table` by identity. Skipped
    /// and failed rows leave their score cells untouched.
    pub fn run<'r, I>(&self, rows: I, table: &mut ResultTable) -> ScoringReport
    where
        I: IntoIterator<Item = &'r TableRow>,
    {
        let prefix = self.method.prefix();
        table.ensure_annotation_columns(prefix);
        table.ensure_score_columns(prefix);

        let mut report = ScoringReport::default();
        for row in rows {
            report.rows += 1;
            let scores = match self.score_row(row) {
                Ok(ScoreOutcome::Scored(scores)) => scores,
                Ok(ScoreOutcome::Skipped(reason)) => {
                    match reason {
                        SkipReason::NoPrediction => report.skipped_no_prediction += 1,
                        SkipReason::NoReferences => report.skipped_no_references += 1,
                    }
                    tracing::debug!(row = %row.key, ?reason, "skipping row");
                    continue;
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(%prefix, row = %row.key, error = %err, "BLEU score calculation failed");
                    continue;
                }
            };

            tracing::info!(
                %prefix,
                row = %row.key,
                annotation = scores.fine.bleu_avg,
                broadtype = scores.broad.bleu_avg,
                final_avg = scores.final_score,
                "BLEU scores"
            );
            report.scored += 1;
            report.rows_written += table.upsert_with(&row.key, prefix, &MethodField::SCORE_GROUP, |record| {
                record.bleu_1 = Some(scores.fine.bleu_1);
                record.bleu_2 = Some(scores.fine.bleu_2);
                record.bleu_avg = Some(scores.fine.bleu_avg);
                record.broadtype_bleu_avg = Some(scores.broad.bleu_avg);
                record.bleu_avg_final = Some(scores.final_score);
            });
        }

        tracing::info!(
            method = %self.method,
            scored = report.scored,
            skipped = report.skipped_no_prediction + report.skipped_no_references,
            failed = report.failed,
            "scoring finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{RowKey, MANUAL_ANNOTATION_COLUMN, MANUAL_BROADTYPE_COLUMN, MANUAL_CLNAME_COLUMN};
    use approx::assert_relative_eq;

    const PREFIX: &str = "DeepSeek-R1";

    fn annotated(marker: &str, annotation: Option<&str>, broadtype: Option<&str>) -> ResultTable {
        let mut table = ResultTable::new();
        table.push_row(
            TableRow::new(RowKey::new("GTEx", "NA", marker))
                .with_field(MANUAL_ANNOTATION_COLUMN, "T cell")
                .with_field(MANUAL_CLNAME_COLUMN, "T-cell")
                .with_field(MANUAL_BROADTYPE_COLUMN, "Lymphocyte"),
        );
        let key = RowKey::new("GTEx", "NA", marker);
        table.upsert_with(&key, PREFIX, &MethodField::ANNOTATION_GROUP, |r| {
            r.annotation = annotation.map(str::to_string);
            r.broadtype = broadtype.map(str::to_string);
        });
        table
    }

    #[test]
    fn test_weight_is_validated() {
        assert!(ScoringEngine::new(Method::DeepseekR1, 0.0).is_ok());
        assert!(ScoringEngine::new(Method::DeepseekR1, 1.0).is_ok());
        assert!(matches!(
            ScoringEngine::new(Method::DeepseekR1, 1.5),
            Err(PipelineError::InvalidWeight(w)) if w == 1.5
        ));
        assert!(ScoringEngine::new(Method::DeepseekR1, f64::NAN).is_err());
    }

    #[test]
    fn test_full_scores() {
        let table = annotated("CD3E", Some("T cell, activated"), Some("Lymphocytes"));
        let engine = ScoringEngine::new(Method::DeepseekR1, DEFAULT_WEIGHT).unwrap();
        let ScoreOutcome::Scored(scores) = engine.score_row(&table.rows()[0]).unwrap() else {
            panic!("row should be scored");
        };
        assert_eq!(scores.fine.bleu_1, 100.0);
        assert_eq!(scores.fine.bleu_2, 100.0);
        assert_eq!(scores.broad.bleu_avg, 100.0);
        assert_eq!(scores.final_score, 100.0);
    }

    #[test]
    fn test_missing_broad_prediction_scores_zero() {
        let table = annotated("CD3E", Some("CD8 T cells"), None);
        let engine = ScoringEngine::new(Method::DeepseekR1, 0.8).unwrap();
        let ScoreOutcome::Scored(scores) = engine.score_row(&table.rows()[0]).unwrap() else {
            panic!("row should be scored");
        };
        assert_eq!(scores.broad, BleuScores::ZERO);
        assert_relative_eq!(scores.final_score, round2(0.8 * scores.fine.bleu_avg));
    }

    #[test]
    fn test_skip_on_missing_prediction() {
        let mut table = annotated("CD3E", None, Some("Lymphocyte"));
        let engine = ScoringEngine::new(Method::DeepseekR1, 0.8).unwrap();
        let view = table.clone();
        let report = engine.run(view.rows(), &mut table);

        assert_eq!(report.skipped_no_prediction, 1);
        assert_eq!(report.rows_written, 0);
        let record = table.rows()[0].method(PREFIX).unwrap();
        for field in MethodField::SCORE_GROUP {
            assert_eq!(record.score(field), None);
        }
        assert!(table.has_column(PREFIX, MethodField::BleuAvgFinal));
    }

    #[test]
    fn test_skip_on_missing_references() {
        let mut table = ResultTable::new();
        let key = RowKey::new("GTEx", "NA", "CD3E");
        table.push_row(TableRow::new(key.clone()).with_field(MANUAL_ANNOTATION_COLUMN, "  "));
        table.upsert_with(&key, PREFIX, &MethodField::ANNOTATION_GROUP, |r| {
            r.annotation = Some("T cell".to_string());
        });
        let engine = ScoringEngine::new(Method::DeepseekR1, 0.8).unwrap();
        assert_eq!(
            engine.score_row(&table.rows()[0]).unwrap(),
            ScoreOutcome::Skipped(SkipReason::NoReferences)
        );
    }

    #[test]
    fn test_untokenizable_prediction_fails_row() {
        let mut table = annotated("CD3E", Some(". unknown"), None);
        let engine = ScoringEngine::new(Method::DeepseekR1, 0.8).unwrap();
        assert!(matches!(engine.score_row(&table.rows()[0]), Err(ScoringError::Fine(_))));

        let view = table.clone();
        let report = engine.run(view.rows(), &mut table);
        assert_eq!(report.failed, 1);
        assert_eq!(table.rows()[0].method(PREFIX).unwrap().bleu_1, None);
    }

    #[test]
    fn test_run_writes_five_columns() {
        let mut table = annotated("CD3E", Some("T cell"), Some("Lymphocyte"));
        let engine = ScoringEngine::new(Method::DeepseekR1, 0.8).unwrap();
        let view = table.clone();
        let report = engine.run(view.rows(), &mut table);
        assert_eq!(report.scored, 1);
        assert_eq!(report.rows_written, 1);

        let record = table.rows()[0].method(PREFIX).unwrap();
        for field in MethodField::SCORE_GROUP {
            assert_eq!(record.score(field), Some(100.0), "{field:?}");
        }
    }

    #[test]
    fn test_blend() {
        assert_eq!(blend(0.8, 62.2, 0.0), 49.76);
        assert_eq!(blend(0.0, 62.2, 10.0), 10.0);
        assert_eq!(blend(1.0, 62.2, 10.0), 62.2);
    }
}
