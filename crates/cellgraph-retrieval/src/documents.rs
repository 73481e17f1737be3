//! Passage retrieval for plain retrieval-augmented prompting.

use crate::RetrievalError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
}

/// Top-`k` passages for a query, best first.
pub trait DocumentRetriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read corpus {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
    "what", "when", "where", "which", "who", "whose", "why", "how", "this", "that", "these",
    "those", "it", "its", "we", "they", "them", "their", "and", "or", "but", "if", "then", "than",
    "so", "as", "for", "with", "about", "to", "from", "in", "on", "at", "by", "of", "into", "cell",
    "cells", "type", "types", "gene", "genes", "marker", "markers", "expressed", "expression",
];

/// Lowercased content words; gene symbols such as `il7` survive.
pub fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Keyword-overlap retriever over an in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct KeywordRetriever {
    passages: Vec<Passage>,
    keyword_sets: Vec<HashSet<String>>,
}

impl KeywordRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        let keyword_sets = passages.iter().map(|p| keywords(&p.text)).collect();
        Self {
            passages,
            keyword_sets,
        }
    }

    /// Load a JSON Lines corpus of `{"id": ..., "text": ...}` objects.
    /// Blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self, CorpusError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_jsonl(&raw)
    }

    pub fn parse_jsonl(raw: &str) -> Result<Self, CorpusError> {
        let mut passages = Vec::new();
        for (i, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let passage: Passage = serde_json::from_str(line)
                .map_err(|source| CorpusError::Parse { line: i + 1, source })?;
            passages.push(passage);
        }
        tracing::info!(passages = passages.len(), "loaded document corpus");
        Ok(Self::new(passages))
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

impl DocumentRetriever for KeywordRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let query_keywords = keywords(query);
        let mut scored: Vec<(usize, f64)> = self
            .keyword_sets
            .iter()
            .enumerate()
            .map(|(i, set)| (i, jaccard(&query_keywords, set)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.passages[i].clone())
            .collect())
    }
}
