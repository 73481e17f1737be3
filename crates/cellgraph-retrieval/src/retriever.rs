//! Text-to-query retrieval that runs every block the model proposes.

use crate::extract::extract_queries;
use crate::graph::{GraphStore, Record};
use crate::llm::LanguageModel;
use crate::RetrievalError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Prompt used when the caller does not supply one.
///
/// Placeholders: `{schema}`, `{examples}`, `{query_text}`, plus any extra
/// prompt parameter passed to [`GraphRetriever::search`].
pub const DEFAULT_TEXT2CYPHER_PROMPT: &str = "\
Task: Generate Cypher statements to query a Neo4j graph database.
Instructions:
Use only the provided relationship types and properties in the schema.
Do not use any other relationship types or properties that are not provided.
You may return several statements when one is not enough; put each one in its own ```cypher fenced block.
Do not include any explanations or apologies.

Schema:
{schema}

Examples (optional):
{examples}

Input:
{query_text}

Cypher queries:
";

/// Records of one retrieval plus how they were obtained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedRecordSet {
    pub records: Vec<Record>,
    pub metadata: RetrievalMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalMetadata {
    /// The model response the queries were extracted from.
    pub full_text: String,
    /// Extracted statements, in execution order.
    pub queries: Vec<String>,
}

impl RetrievedRecordSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One line per record, suitable for splicing into a prompt.
    pub fn render_context(&self) -> String {
        self.records
            .iter()
            .map(Record::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Asks a model for graph queries, then runs them in one session.
pub struct GraphRetriever<'a> {
    llm: &'a dyn LanguageModel,
    store: &'a dyn GraphStore,
    schema: String,
    examples: Vec<String>,
    prompt_template: String,
}

impl<'a> GraphRetriever<'a> {
    pub fn new(llm: &'a dyn LanguageModel, store: &'a dyn GraphStore) -> Self {
        Self {
            llm,
            store,
            schema: String::new(),
            examples: Vec::new(),
            prompt_template: DEFAULT_TEXT2CYPHER_PROMPT.to_string(),
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn with_examples(mut self, examples: Vec<String>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_prompt_template(mut self, template: &str) -> Self {
        self.prompt_template = template.to_string();
        self
    }

    /// Fill the template. Named parameters are substituted after the
    /// built-in ones; unknown placeholders are left as written.
    pub fn format_prompt(
        &self,
        query_text: &str,
        prompt_params: Option<&BTreeMap<String, String>>,
    ) -> String {
        let mut prompt = self
            .prompt_template
            .replace("{schema}", &self.schema)
            .replace("{examples}", &self.examples.join("\n"))
            .replace("{query_text}", query_text);
        if let Some(params) = prompt_params {
            for (name, value) in params {
                prompt = prompt.replace(&format!("{{{name}}}"), value);
            }
        }
        prompt
    }

    pub fn search(
        &self,
        query_text: &str,
        prompt_params: Option<&BTreeMap<String, String>>,
    ) -> Result<RetrievedRecordSet, RetrievalError> {
        let prompt = self.format_prompt(query_text, prompt_params);
        let full_text = self.llm.invoke(&prompt)?.content;
        let queries = extract_queries(&full_text).into_blocks();

        let mut records = Vec::new();
        if queries.is_empty() {
            tracing::warn!("model returned no query text; continuing without graph context");
        } else {
            let mut session = self.store.open_session().map_err(RetrievalError::Session)?;
            for (block_index, query) in queries.iter().enumerate() {
                tracing::debug!(block_index, query = %query, "running query block");
                let rows = session
                    .run(query)
                    .map_err(|source| RetrievalError::Execution {
                        block_index,
                        query: query.clone(),
                        source,
                    })?;
                records.extend(rows);
            }
        }

        tracing::info!(
            blocks = queries.len(),
            records = records.len(),
            "graph retrieval finished"
        );
        Ok(RetrievedRecordSet {
            records,
            metadata: RetrievalMetadata { full_text, queries },
        })
    }
}
