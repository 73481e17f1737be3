//! Property-based tests for query extraction.

use cellgraph_retrieval::{extract_queries, Extraction};
use proptest::prelude::*;

fn statement() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z0-9 (){}:'=.]{0,30}"
}

fn prose() -> impl Strategy<Value = String> {
    "[A-Za-z ,.\n]{0,20}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn nonblank_response_yields_a_block(text in "[ -~\n]{0,60}") {
        let extraction = extract_queries(&text);
        if text.trim().is_empty() {
            prop_assert_eq!(extraction, Extraction::Empty);
        } else {
            prop_assert!(extraction.len() >= 1);
            for block in extraction.blocks() {
                prop_assert!(!block.trim().is_empty());
            }
        }
    }

    #[test]
    fn well_formed_fences_are_all_found_in_order(
        statements in prop::collection::vec(statement(), 1..5),
        gaps in prop::collection::vec(prose(), 5),
    ) {
        let mut text = String::new();
        for (i, stmt) in statements.iter().enumerate() {
            text.push_str(&gaps[i]);
            text.push_str("\n```cypher\n");
            text.push_str(stmt);
            text.push_str("\n```\n");
        }
        let expected: Vec<String> = statements.iter().map(|s| s.trim().to_string()).collect();
        prop_assert_eq!(extract_queries(&text), Extraction::Fenced(expected));
    }
}
