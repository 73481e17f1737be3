//! Prompt text for the annotation strategies.

use crate::strategy::AnnotationRequest;
use cellgraph_retrieval::{Passage, RetrievedRecordSet};

/// Text-to-Cypher prompt for knowledge-graph retrieval. Extra placeholder:
/// `{k}`, the number of candidate cell types wanted.
pub const CELL_TYPE_TEXT2CYPHER_PROMPT: &str = "\
Task: Generate Cypher statements that retrieve evidence for annotating a cell type from its marker genes.
Instructions:
Use only the node labels, relationship types and properties in the schema.
Match gene symbols case-insensitively.
Return at most {k} candidate cell types per statement, with the genes that support them.
If one statement is not enough, write several; put each in its own ```cypher fenced block.
Do not include any explanations or apologies.

Schema:
{schema}

Examples:
{examples}

Question:
{query_text}
";

fn subject(request: &AnnotationRequest) -> String {
    let genes = request.marker_genes.join(", ");
    match request.tissue.as_deref() {
        Some(tissue) => format!("{} {} tissue expressing the marker genes {genes}", request.species, tissue),
        None => format!("{} sample expressing the marker genes {genes}", request.species),
    }
}

const ANSWER_FORMAT: &str = "\
Answer with a single line of the form `<cell type> | <broad cell category>`, \
for example `CD8-positive, alpha-beta T cell | T cell`. Do not add any other text.";

pub fn direct_prompt(request: &AnnotationRequest) -> String {
    format!(
        "Identify the most likely cell type of a {}.\n{ANSWER_FORMAT}",
        subject(request)
    )
}

/// Query handed to the document retriever.
pub fn passage_query(request: &AnnotationRequest) -> String {
    let mut query = request.marker_genes.join(" ");
    if let Some(tissue) = request.tissue.as_deref() {
        query.push(' ');
        query.push_str(tissue);
    }
    query
}

pub fn rag_prompt(request: &AnnotationRequest, passages: &[Passage]) -> String {
    let context = if passages.is_empty() {
        "(no relevant passages found)".to_string()
    } else {
        passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{}] {}", i + 1, p.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Use the following reference passages where they are relevant.\n\nContext:\n{context}\n\n\
         Identify the most likely cell type of a {}.\n{ANSWER_FORMAT}",
        subject(request)
    )
}

/// Natural-language question the graph retriever turns into queries.
pub fn graph_query_text(request: &AnnotationRequest) -> String {
    format!(
        "Which cell types are marked by the genes {} in {}{}?",
        request.marker_genes.join(", "),
        request.species,
        request
            .tissue
            .as_deref()
            .map(|t| format!(" {t} tissue"))
            .unwrap_or_default()
    )
}

pub fn graph_rag_prompt(request: &AnnotationRequest, retrieved: &RetrievedRecordSet) -> String {
    let context = if retrieved.is_empty() {
        "(the knowledge graph returned no records)".to_string()
    } else {
        retrieved.render_context()
    };
    format!(
        "Knowledge graph evidence:\n{context}\n\n\
         Using this evidence together with your own knowledge, identify the most likely cell type of a {}.\n{ANSWER_FORMAT}",
        subject(request)
    )
}
