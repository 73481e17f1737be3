//! Neo4j over its HTTP transactional endpoint.
//!
//! Each session is a sequence of auto-committed statements posted to
//! `{uri}/db/{database}/tx/commit`. There is no server-side session state to
//! hold open, so dropping a session only logs.

use crate::graph::{GraphSession, GraphStore, GraphStoreError, Record};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const NEO4J_URI_ENV: &str = "NEO4J_URI";
pub const NEO4J_USERNAME_ENV: &str = "NEO4J_USERNAME";
pub const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";
pub const NEO4J_DATABASE_ENV: &str = "NEO4J_DATABASE";

const DEFAULT_URI: &str = "http://localhost:7474";
const DEFAULT_USERNAME: &str = "neo4j";
const DEFAULT_DATABASE: &str = "neo4j";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl Neo4jConfig {
    /// Defaults overridden by `NEO4J_URI`, `NEO4J_USERNAME`,
    /// `NEO4J_PASSWORD` and `NEO4J_DATABASE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(uri) = env_nonempty(NEO4J_URI_ENV) {
            config.uri = uri;
        }
        if let Some(username) = env_nonempty(NEO4J_USERNAME_ENV) {
            config.username = username;
        }
        if let Some(password) = env_nonempty(NEO4J_PASSWORD_ENV) {
            config.password = password;
        }
        if let Some(database) = env_nonempty(NEO4J_DATABASE_ENV) {
            config.database = database;
        }
        config
    }

    pub fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            normalize_http_uri(&self.uri),
            self.database.trim()
        )
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Bolt URIs are mapped to the HTTP(S) port of the same host: plain schemes
/// to `http://host:7474`, `+s` and `+ssc` schemes to `https://host:7473`.
fn normalize_http_uri(uri: &str) -> String {
    let uri = uri.trim().trim_end_matches('/');
    for (scheme, base) in [
        ("bolt://", "http"),
        ("neo4j://", "http"),
        ("bolt+s://", "https"),
        ("neo4j+s://", "https"),
        ("bolt+ssc://", "https"),
        ("neo4j+ssc://", "https"),
    ] {
        if let Some(rest) = uri.strip_prefix(scheme) {
            let host = rest.split([':', '/']).next().unwrap_or(rest);
            let port = if base == "https" { 7473 } else { 7474 };
            return format!("{base}://{host}:{port}");
        }
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!("http://{uri}")
    }
}

// ============================================================================
// Store and session
// ============================================================================

pub struct Neo4jHttpStore {
    http: reqwest::blocking::Client,
    config: Neo4jConfig,
}

impl Neo4jHttpStore {
    pub fn new(config: Neo4jConfig) -> Result<Self, GraphStoreError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GraphStoreError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, GraphStoreError> {
        Self::new(Neo4jConfig::from_env())
    }

    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }
}

impl GraphStore for Neo4jHttpStore {
    fn open_session(&self) -> Result<Box<dyn GraphSession + '_>, GraphStoreError> {
        tracing::debug!(database = %self.config.database, "opening graph session");
        Ok(Box::new(Neo4jHttpSession {
            store: self,
            url: self.config.commit_url(),
            statements: 0,
        }))
    }
}

struct Neo4jHttpSession<'a> {
    store: &'a Neo4jHttpStore,
    url: String,
    statements: usize,
}

impl GraphSession for Neo4jHttpSession<'_> {
    fn run(&mut self, query: &str) -> Result<Vec<Record>, GraphStoreError> {
        self.statements += 1;
        let body = json!({
            "statements": [
                { "statement": query, "resultDataContents": ["row"] }
            ]
        });
        let config = &self.store.config;
        let resp = self
            .store
            .http
            .post(&self.url)
            .basic_auth(&config.username, Some(&config.password))
            .json(&body)
            .send()
            .map_err(|e| GraphStoreError::Transport(format!("failed to reach {}: {e}", self.url)))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| GraphStoreError::Transport(format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            return Err(GraphStoreError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        records_from_response(&text)
    }
}

impl Drop for Neo4jHttpSession<'_> {
    fn drop(&mut self) {
        tracing::debug!(statements = self.statements, "graph session released");
    }
}

// ============================================================================
// Response decoding
// ============================================================================

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Deserialize)]
struct RowData {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct StatementError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Records of a `tx/commit` response body; the first reported error wins.
pub fn records_from_response(body: &str) -> Result<Vec<Record>, GraphStoreError> {
    let parsed: CommitResponse = serde_json::from_str(body)
        .map_err(|e| GraphStoreError::InvalidResponse(format!("not a commit response: {e}")))?;

    if let Some(err) = parsed.errors.into_iter().next() {
        return Err(GraphStoreError::Query {
            code: err.code,
            message: err.message,
        });
    }

    let mut records = Vec::new();
    for result in parsed.results {
        for data in result.data {
            if data.row.len() != result.columns.len() {
                return Err(GraphStoreError::InvalidResponse(format!(
                    "row has {} values for {} columns",
                    data.row.len(),
                    result.columns.len()
                )));
            }
            let fields = result.columns.iter().cloned().zip(data.row).collect();
            records.push(Record::new(fields));
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_from_response() {
        let body = r#"{
            "results": [{
                "columns": ["cell", "markers"],
                "data": [
                    {"row": ["T cell", ["CD3E", "CD3D"]], "meta": [null, null]},
                    {"row": ["NK cell", ["NKG7"]], "meta": [null, null]}
                ]
            }],
            "errors": []
        }"#;
        let records = records_from_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("cell"), Some(&json!("T cell")));
        assert_eq!(records[1].get("markers"), Some(&json!(["NKG7"])));
    }

    #[test]
    fn test_query_error_is_reported() {
        let body = r#"{
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input 'MATC'"}]
        }"#;
        match records_from_response(body) {
            Err(GraphStoreError::Query { code, message }) => {
                assert_eq!(code, "Neo.ClientError.Statement.SyntaxError");
                assert!(message.contains("MATC"));
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_response() {
        assert!(matches!(
            records_from_response("not json"),
            Err(GraphStoreError::InvalidResponse(_))
        ));
        let ragged = r#"{"results": [{"columns": ["a", "b"], "data": [{"row": [1]}]}]}"#;
        assert!(matches!(
            records_from_response(ragged),
            Err(GraphStoreError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_empty_result() {
        let body = r#"{"results": [{"columns": ["n"], "data": []}], "errors": []}"#;
        assert!(records_from_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_commit_url() {
        let config = Neo4jConfig {
            uri: "bolt://graph.local:7687".to_string(),
            database: "cells".to_string(),
            ..Neo4jConfig::default()
        };
        assert_eq!(config.commit_url(), "http://graph.local:7474/db/cells/tx/commit");

        let config = Neo4jConfig {
            uri: "localhost:7474/".to_string(),
            ..Neo4jConfig::default()
        };
        assert_eq!(config.commit_url(), "http://localhost:7474/db/neo4j/tx/commit");
    }

    #[test]
    fn test_commit_url_for_tls_schemes() {
        let url = |uri: &str| {
            Neo4jConfig {
                uri: uri.to_string(),
                ..Neo4jConfig::default()
            }
            .commit_url()
        };
        assert_eq!(
            url("neo4j+s://abc.databases.neo4j.io"),
            "https://abc.databases.neo4j.io:7473/db/neo4j/tx/commit"
        );
        assert_eq!(
            url("bolt+s://graph.local:7687/"),
            "https://graph.local:7473/db/neo4j/tx/commit"
        );
        assert_eq!(
            url("neo4j+ssc://10.0.0.5"),
            "https://10.0.0.5:7473/db/neo4j/tx/commit"
        );
        assert_eq!(
            url("https://graph.local:7473"),
            "https://graph.local:7473/db/neo4j/tx/commit"
        );
    }
}
