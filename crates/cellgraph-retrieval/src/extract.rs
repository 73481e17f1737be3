//! Pulling query statements out of free-form model output.
//!
//! Models are asked for fenced ```` ```cypher ```` blocks but do not always
//! comply, so the parse is two-stage: fenced blocks first, and if there are
//! none, the whole response is taken as a single statement.

use regex::Regex;
use std::sync::OnceLock;

/// How the blocks of one response were obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// One or more fenced blocks, in the order they appear.
    Fenced(Vec<String>),
    /// No non-empty fences: the trimmed response itself.
    Fallback(String),
    /// Nothing but whitespace.
    Empty,
}

impl Extraction {
    pub fn blocks(&self) -> Vec<&str> {
        match self {
            Extraction::Fenced(blocks) => blocks.iter().map(String::as_str).collect(),
            Extraction::Fallback(block) => vec![block.as_str()],
            Extraction::Empty => Vec::new(),
        }
    }

    pub fn into_blocks(self) -> Vec<String> {
        match self {
            Extraction::Fenced(blocks) => blocks,
            Extraction::Fallback(block) => vec![block],
            Extraction::Empty => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Extraction::Fenced(blocks) => blocks.len(),
            Extraction::Fallback(_) => 1,
            Extraction::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Extraction::Empty)
    }
}

/// Language tags accepted after an opening fence besides `cypher`.
const FENCE_TAGS: &str = "sql|text|txt|plaintext|neo4j|graphql|json|sh|bash";

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // An opening fence may carry a known language tag: `cypher` is recognised
    // even on the same line as the query, the others only before a newline.
    // Any other leading word belongs to the query.
    FENCE.get_or_init(|| {
        let pattern = format!(r"(?s)```(?:(?i:cypher)\b|(?i:{FENCE_TAGS})[ \t]*\r?\n)?(.*?)```");
        Regex::new(&pattern).expect("static regex")
    })
}

/// Split a model response into query blocks.
///
/// Never fails: a non-empty response always yields at least one block.
pub fn extract_queries(text: &str) -> Extraction {
    let whole = text.trim();
    if whole.is_empty() {
        return Extraction::Empty;
    }

    let blocks: Vec<String> = fence_regex()
        .captures_iter(whole)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect();

    // Only-empty fences count as "no fences".
    if blocks.is_empty() {
        Extraction::Fallback(whole.to_string())
    } else {
        Extraction::Fenced(blocks)
    }
}
