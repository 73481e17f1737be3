//! Graph-store seam: sessions that run query text and return records.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum GraphStoreError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("graph store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("query failed ({code}): {message}")]
    Query { code: String, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One result row: column name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// `key: value` pairs on one line; strings are written without quotes.
    pub fn to_line(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}: {s}"),
                other => format!("{k}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A database that can hand out query sessions.
pub trait GraphStore: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn GraphSession + '_>, GraphStoreError>;
}

/// A scoped query session. Implementations release it on drop, so every
/// exit path of the caller gives it back.
pub trait GraphSession {
    fn run(&mut self, query: &str) -> Result<Vec<Record>, GraphStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_lookup_and_line() {
        let record = Record::new(vec![
            ("cell".to_string(), json!("T cell")),
            ("score".to_string(), json!(3)),
            ("genes".to_string(), json!(["CD3E", "CD3D"])),
        ]);
        assert_eq!(record.get("score"), Some(&json!(3)));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["cell", "score", "genes"]);
        assert_eq!(record.to_line(), r#"cell: T cell, score: 3, genes: ["CD3E","CD3D"]"#);
    }
}
