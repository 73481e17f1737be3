//! The closed set of annotation methods.
//!
//! Each method fixes a strategy kind, the model it calls, and the column
//! prefix its results are stored under. Adding a method means adding a
//! variant here.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How a method obtains its context before asking for a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Prompt the model with the markers alone.
    Direct,
    /// Retrieve passages from a document corpus first.
    Rag,
    /// Have the model query a knowledge graph first.
    KgGraphRag,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Rag => "rag",
            StrategyKind::KgGraphRag => "kg-graph-rag",
        })
    }
}

/// Everything a method name determines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub kind: StrategyKind,
    pub model: &'static str,
    pub prefix: &'static str,
    /// Retrieval depth override; `None` uses the run's default.
    pub k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("method {0:?} is not supported")]
pub struct UnknownMethod(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    DeepseekR1,
    DeepseekV3,
    DeepseekR1Rag,
    DeepseekV3Rag,
    DeepseekR1KgGraphRag,
    DeepseekV3KgGraphRag,
}

const REASONER: &str = "deepseek-reasoner";
const CHAT: &str = "deepseek-chat";

impl Method {
    pub const ALL: [Method; 6] = [
        Method::DeepseekR1,
        Method::DeepseekV3,
        Method::DeepseekR1Rag,
        Method::DeepseekV3Rag,
        Method::DeepseekR1KgGraphRag,
        Method::DeepseekV3KgGraphRag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::DeepseekR1 => "deepseek-r1",
            Method::DeepseekV3 => "deepseek-v3",
            Method::DeepseekR1Rag => "deepseek-r1-rag",
            Method::DeepseekV3Rag => "deepseek-v3-rag",
            Method::DeepseekR1KgGraphRag => "deepseek-r1-kg-graph-rag",
            Method::DeepseekV3KgGraphRag => "deepseek-v3-kg-graph-rag",
        }
    }

    pub fn spec(self) -> MethodSpec {
        let (kind, model, prefix) = match self {
            Method::DeepseekR1 => (StrategyKind::Direct, REASONER, "DeepSeek-R1"),
            Method::DeepseekV3 => (StrategyKind::Direct, CHAT, "DeepSeek-V3"),
            Method::DeepseekR1Rag => (StrategyKind::Rag, REASONER, "DeepSeek-R1-RAG"),
            Method::DeepseekV3Rag => (StrategyKind::Rag, CHAT, "DeepSeek-V3-RAG"),
            Method::DeepseekR1KgGraphRag => {
                (StrategyKind::KgGraphRag, REASONER, "DeepSeek-R1-KG-Graph-RAG")
            }
            Method::DeepseekV3KgGraphRag => {
                (StrategyKind::KgGraphRag, CHAT, "DeepSeek-V3-KG-Graph-RAG")
            }
        };
        MethodSpec {
            kind,
            model,
            prefix,
            k: None,
        }
    }

    pub fn prefix(self) -> &'static str {
        self.spec().prefix
    }

    /// Retrieval depth for this method given the run's default.
    pub fn k_or(self, default_k: usize) -> usize {
        self.spec().k.unwrap_or(default_k)
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Method::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column prefixes of every registered method.
pub fn known_prefixes() -> Vec<&'static str> {
    Method::ALL.iter().map(|m| m.prefix()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>().unwrap(), method);
            assert_eq!(method.to_string(), method.name());
        }
    }

    #[test]
    fn test_unknown_method() {
        assert_eq!(
            "unknown-strategy".parse::<Method>(),
            Err(UnknownMethod("unknown-strategy".to_string()))
        );
        assert!("DeepSeek-R1".parse::<Method>().is_err());
    }

    #[test]
    fn test_prefixes_are_unique() {
        let prefixes: HashSet<_> = known_prefixes().into_iter().collect();
        assert_eq!(prefixes.len(), Method::ALL.len());
    }

    #[test]
    fn test_registry_entries() {
        let spec = Method::DeepseekV3KgGraphRag.spec();
        assert_eq!(spec.kind, StrategyKind::KgGraphRag);
        assert_eq!(spec.model, "deepseek-chat");
        assert_eq!(spec.prefix, "DeepSeek-V3-KG-Graph-RAG");
        assert_eq!(Method::DeepseekR1.spec().model, "deepseek-reasoner");
        assert_eq!(Method::DeepseekR1Rag.k_or(3), 3);
    }
}
