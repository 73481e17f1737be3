//! Cellgraph retrieval: the model and graph-store seams used by annotation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     MULTI-QUERY GRAPH RETRIEVAL                      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  question ──► prompt(schema, examples, question) ──► LanguageModel   │
//! │                                                          │           │
//! │                                                   response text      │
//! │                                                          │           │
//! │                                                  extract_queries     │
//! │                                                          │           │
//! │                                        [block 0, block 1, ... ]      │
//! │                                                          │           │
//! │                     GraphStore::open_session ──► run each block      │
//! │                                                          │           │
//! │                          records (concatenated, in block order)      │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The model is untrusted: it proposes query text, the store executes it. A
//! failing block stops the remaining blocks of that call; blocks that already
//! ran are not rolled back.
//!
//! Everything here is blocking except `LanguageModel::ainvoke`, which the
//! chat client serves from an async transport. The language-model and
//! graph-store calls are the only places a caller waits on I/O.

pub mod documents;
pub mod extract;
pub mod graph;
pub mod llm;
pub mod neo4j;
pub mod retriever;

pub use documents::{CorpusError, DocumentRetriever, KeywordRetriever, Passage};
pub use extract::{extract_queries, Extraction};
pub use graph::{GraphSession, GraphStore, GraphStoreError, Record};
pub use llm::{ChatClient, ChatClientConfig, LanguageModel, LlmError, LlmResponse, ModelProvider};
pub use neo4j::{Neo4jConfig, Neo4jHttpStore};
pub use retriever::{GraphRetriever, RetrievalMetadata, RetrievedRecordSet};

/// Errors from one retrieval call.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("language model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("failed to open graph session: {0}")]
    Session(#[source] GraphStoreError),
    #[error("query block {block_index} failed: {source}")]
    Execution {
        block_index: usize,
        query: String,
        #[source]
        source: GraphStoreError,
    },
}
