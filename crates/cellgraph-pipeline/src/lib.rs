//! Cellgraph pipeline: annotate marker sets with a chosen method, then score
//! the annotations against curated references.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         ANNOTATION PIPELINE                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  method name ──parse──► Method ──spec──► {strategy, model, prefix}   │
//! │                                                                      │
//! │  input CSV ──filter──► MarkerRow*                                    │
//! │                            │                                         │
//! │                   AnnotationEngine ──► strategy.annotate(request)    │
//! │                            │             (direct | rag | kg-graph)   │
//! │                            ▼                                         │
//! │                  ResultTable upsert  ("<prefix> annotation", ...)    │
//! │                            │                                         │
//! │                  save ──► reload ──► filter                          │
//! │                            │                                         │
//! │                    ScoringEngine ──► BLEU-1/2/avg, blend             │
//! │                            │                                         │
//! │                  ResultTable upsert  ("<prefix> BLEU-1", ...)        │
//! │                            │                                         │
//! │                          save                                        │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row failures never stop a run: a failed annotation is written as empty
//! cells and a row that cannot be scored keeps its score cells untouched.
//! Only configuration problems (unknown method, weight outside `[0, 1]`, a
//! strategy without its retrieval source, an unreadable table) are errors.

pub mod annotate;
pub mod error;
pub mod prompts;
pub mod registry;
pub mod runner;
pub mod score;
pub mod strategy;
pub mod table;

pub use annotate::{AnnotationEngine, AnnotationOutput, AnnotationReport};
pub use error::{AnnotationError, PipelineError, ScoringError};
pub use registry::{known_prefixes, Method, MethodSpec, StrategyKind, UnknownMethod};
pub use runner::{run_pipeline, score_table, PipelineConfig, PipelineReport, DEFAULT_RAG_K};
pub use score::{blend, RowScores, ScoreOutcome, ScoringEngine, ScoringReport, SkipReason, DEFAULT_WEIGHT};
pub use strategy::{build_strategy, AnnotationRequest, AnnotationStrategy, Collaborators, GraphContext};
pub use table::{
    MarkerRow, MethodField, MethodRecord, ReferenceAnnotation, ResultTable, RowFilter, RowKey,
    TableError, TableRow,
};
