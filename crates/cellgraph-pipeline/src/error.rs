use crate::registry::UnknownMethod;
use crate::table::TableError;
use cellgraph_metric::MetricError;
use cellgraph_retrieval::{LlmError, RetrievalError};

/// Errors that stop a run before or between its phases.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethod),
    #[error("weight must lie in [0, 1], got {0}")]
    InvalidWeight(f64),
    #[error("method {method} needs a {collaborator}")]
    MissingCollaborator {
        method: String,
        collaborator: &'static str,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Why one row could not be annotated.
#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Why one row could not be scored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("fine label: {0}")]
    Fine(#[source] MetricError),
    #[error("broad label: {0}")]
    Broad(#[source] MetricError),
}
