//! Annotation strategies behind one typed request.
//!
//! The engine builds a single [`AnnotationRequest`] per row and every
//! strategy reads the fields it cares about: the direct strategy ignores `k`,
//! the retrieval strategies use it as their retrieval depth.

use crate::error::{AnnotationError, PipelineError};
use crate::prompts;
use crate::registry::{Method, StrategyKind};
use cellgraph_retrieval::{
    DocumentRetriever, GraphRetriever, GraphStore, LanguageModel, ModelProvider,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRequest {
    pub marker_genes: Vec<String>,
    pub species: String,
    pub tissue: Option<String>,
    pub model_name: String,
    pub k: usize,
}

pub trait AnnotationStrategy {
    fn kind(&self) -> StrategyKind;

    /// Raw model text for one request.
    fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError>;
}

/// Graph store plus the prompt material the text-to-query step needs.
#[derive(Clone, Copy)]
pub struct GraphContext<'a> {
    pub store: &'a dyn GraphStore,
    pub schema: &'a str,
    pub examples: &'a [String],
}

/// External services a strategy may call. Only the model provider is
/// required; each retrieval strategy checks for its own source.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub models: &'a dyn ModelProvider,
    pub documents: Option<&'a dyn DocumentRetriever>,
    pub graph: Option<GraphContext<'a>>,
}

impl<'a> Collaborators<'a> {
    pub fn new(models: &'a dyn ModelProvider) -> Self {
        Self {
            models,
            documents: None,
            graph: None,
        }
    }

    pub fn with_documents(mut self, documents: &'a dyn DocumentRetriever) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_graph(mut self, graph: GraphContext<'a>) -> Self {
        self.graph = Some(graph);
        self
    }
}

/// Build the strategy for `method` from what is available.
pub fn build_strategy<'a>(
    method: Method,
    collaborators: &Collaborators<'a>,
) -> Result<Box<dyn AnnotationStrategy + 'a>, PipelineError> {
    let models = collaborators.models;
    let missing = |collaborator| PipelineError::MissingCollaborator {
        method: method.to_string(),
        collaborator,
    };
    let strategy: Box<dyn AnnotationStrategy + 'a> = match method.spec().kind {
        StrategyKind::Direct => Box::new(DirectStrategy { models }),
        StrategyKind::Rag => Box::new(RagStrategy {
            models,
            documents: collaborators.documents.ok_or_else(|| missing("document corpus"))?,
        }),
        StrategyKind::KgGraphRag => Box::new(GraphRagStrategy {
            models,
            graph: collaborators.graph.ok_or_else(|| missing("graph store"))?,
        }),
    };
    Ok(strategy)
}

fn invoke(model: &dyn LanguageModel, prompt: &str) -> Result<String, AnnotationError> {
    Ok(model.invoke(prompt)?.content)
}

pub struct DirectStrategy<'a> {
    models: &'a dyn ModelProvider,
}

impl AnnotationStrategy for DirectStrategy<'_> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError> {
        let model = self.models.language_model(&request.model_name);
        invoke(model.as_ref(), &prompts::direct_prompt(request))
    }
}

pub struct RagStrategy<'a> {
    models: &'a dyn ModelProvider,
    documents: &'a dyn DocumentRetriever,
}

impl AnnotationStrategy for RagStrategy<'_> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rag
    }

    fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError> {
        let passages = self
            .documents
            .retrieve(&prompts::passage_query(request), request.k)?;
        tracing::debug!(passages = passages.len(), "retrieved passages");
        let model = self.models.language_model(&request.model_name);
        invoke(model.as_ref(), &prompts::rag_prompt(request, &passages))
    }
}

pub struct GraphRagStrategy<'a> {
    models: &'a dyn ModelProvider,
    graph: GraphContext<'a>,
}

impl AnnotationStrategy for GraphRagStrategy<'_> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::KgGraphRag
    }

    fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError> {
        let model = self.models.language_model(&request.model_name);
        let retriever = GraphRetriever::new(model.as_ref(), self.graph.store)
            .with_schema(self.graph.schema)
            .with_examples(self.graph.examples.to_vec())
            .with_prompt_template(prompts::CELL_TYPE_TEXT2CYPHER_PROMPT);

        let mut params = BTreeMap::new();
        params.insert("k".to_string(), request.k.to_string());
        let retrieved = retriever.search(&prompts::graph_query_text(request), Some(&params))?;
        tracing::debug!(
            queries = retrieved.metadata.queries.len(),
            records = retrieved.records.len(),
            "retrieved graph context"
        );

        invoke(model.as_ref(), &prompts::graph_rag_prompt(request, &retrieved))
    }
}
