//! Property-based tests for normalization and BLEU bounds.

use cellgraph_metric::*;
use proptest::prelude::*;

fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z]{1,10}( [A-Za-z]{1,10}){0,3}",
        "[A-Za-z]{1,10}( [A-Za-z]{1,10}){0,2}, [a-z ]{0,20}",
        Just("T cell".to_string()),
        Just("B cells".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normalize_is_idempotent(text in "[ -~\n]{0,40}") {
        let once = normalize(&text);
        prop_assert_eq!(normalize(&once), once.clone());
    }

    #[test]
    fn normalized_text_has_no_clause_boundaries(text in "[ -~\n]{0,40}") {
        let normalized = normalize(&text);
        prop_assert!(!normalized.contains(','));
        prop_assert!(!normalized.contains('.'));
        prop_assert!(!normalized.contains('\n'));
    }

    #[test]
    fn bleu_scores_are_bounded(
        references in prop::collection::vec(label_strategy(), 1..4),
        prediction in label_strategy(),
    ) {
        if let Ok(scores) = evaluate_bleu_score(&references, &prediction) {
            for value in [scores.bleu_1, scores.bleu_2, scores.bleu_avg] {
                prop_assert!((0.0..=100.0).contains(&value));
            }
        }
    }

    #[test]
    fn prediction_equal_to_a_reference_scores_full(
        references in prop::collection::vec(label_strategy(), 1..4),
        pick in any::<prop::sample::Index>(),
    ) {
        let prediction = pick.get(&references).clone();
        let scores = evaluate_bleu_score(&references, &prediction).unwrap();
        prop_assert_eq!(scores.bleu_1, 100.0);
        prop_assert_eq!(scores.bleu_2, 100.0);
        prop_assert_eq!(scores.bleu_avg, 100.0);
    }
}
