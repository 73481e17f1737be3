//! Canonical form of free-text cell-type labels.
//!
//! Models tend to append explanations ("B cells, based on CD19 and MS4A1"),
//! so only the leading clause survives normalization.

/// Words that end in `s` but are not plurals. Words ending in `-as` are
/// treated as uninflected unless listed in [`IRREGULAR`].
const UNINFLECTED: &[&str] = &[
    "bias", "corpus", "gas", "lens", "mucus", "news", "plus", "pus", "series", "species",
    "status", "virus",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("analyses", "analysis"),
    ("areas", "area"),
    ("bacteria", "bacterium"),
    ("children", "child"),
    ("cortices", "cortex"),
    ("criteria", "criterion"),
    ("feet", "foot"),
    ("fungi", "fungus"),
    ("geese", "goose"),
    ("halves", "half"),
    ("ideas", "idea"),
    ("indices", "index"),
    ("knives", "knife"),
    ("leaves", "leaf"),
    ("lives", "life"),
    ("matrices", "matrix"),
    ("men", "man"),
    ("mice", "mouse"),
    ("nuclei", "nucleus"),
    ("people", "person"),
    ("phenomena", "phenomenon"),
    ("teeth", "tooth"),
    ("vertices", "vertex"),
    ("women", "woman"),
];

/// Normalize a label for comparison.
///
/// Strips surrounding whitespace, keeps only the text before the first comma,
/// period or newline, lowercases it and singularizes the final word.
pub fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    let clause = trimmed
        .split(|c| matches!(c, ',' | '.' | '\n'))
        .next()
        .unwrap_or_default();
    let lowered = clause.trim().to_lowercase();
    singular_noun(&lowered).unwrap_or(lowered)
}

/// [`normalize`] for possibly-absent input; absent text becomes `""`.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Singular form of a lowercase phrase whose head noun is plural.
///
/// The head noun is the last word of the phrase, or the last word before
/// ` of ` in phrases like "cells of the corpus callosum". Returns `None` when
/// that word is not a recognizable plural, so callers can keep the original
/// text.
pub fn singular_noun(phrase: &str) -> Option<String> {
    if let Some(idx) = phrase.find(" of ") {
        let (head, tail) = phrase.split_at(idx);
        let singular = singular_last_word(head)?;
        return Some(format!("{singular}{tail}"));
    }
    singular_last_word(phrase)
}

fn singular_last_word(phrase: &str) -> Option<String> {
    let (head, last) = match phrase.rfind(char::is_whitespace) {
        Some(idx) => phrase.split_at(idx + 1),
        None => ("", phrase),
    };
    // "t-cells": only the part after the last hyphen is inflected.
    let (compound, word) = match last.rfind('-') {
        Some(idx) => last.split_at(idx + 1),
        None => ("", last),
    };

    let singular = singular_word(word)?;
    Some(format!("{head}{compound}{singular}"))
}

fn singular_word(word: &str) -> Option<String> {
    if word.is_empty() || !word.chars().all(char::is_alphabetic) {
        return None;
    }
    if UNINFLECTED.contains(&word) {
        return None;
    }
    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == word) {
        return Some((*singular).to_string());
    }

    let len = word.chars().count();
    if len <= 2 {
        return None;
    }
    if ["ss", "us", "is", "as"].iter().any(|suffix| word.ends_with(suffix)) {
        return None;
    }
    if word.ends_with("ies") && len > 4 {
        return Some(format!("{}y", &word[..word.len() - 3]));
    }
    if ["sses", "xes", "zes", "ches", "shes"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        return Some(word[..word.len() - 2].to_string());
    }
    if let Some(stem) = word.strip_suffix('s') {
        return Some(stem.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_at_first_clause_boundary() {
        assert_eq!(normalize("  T cell, activated  "), "t cell");
        assert_eq!(normalize("Hepatocyte. Liver parenchyma"), "hepatocyte");
        assert_eq!(normalize("Macrophage\nbecause CD68"), "macrophage");
    }

    #[test]
    fn test_singularizes_last_word() {
        assert_eq!(normalize("B cells"), "b cell");
        assert_eq!(normalize("T-cells"), "t-cell");
        assert_eq!(normalize("Fibroblasts"), "fibroblast");
        assert_eq!(normalize("Basal progenitor cells"), "basal progenitor cell");
        assert_eq!(normalize("Mast cells"), "mast cell");
    }

    #[test]
    fn test_leaves_singular_and_unknown_words() {
        assert_eq!(singular_noun("t cell"), None);
        assert_eq!(singular_noun("species"), None);
        assert_eq!(singular_noun("plexus"), None);
        assert_eq!(singular_noun("cd4+"), None);
        assert_eq!(singular_noun("nk"), None);
        assert_eq!(normalize("Schwann cell"), "schwann cell");
    }

    #[test]
    fn test_irregular_and_suffix_rules() {
        assert_eq!(singular_noun("nuclei"), Some("nucleus".to_string()));
        assert_eq!(singular_noun("progenies"), Some("progeny".to_string()));
        assert_eq!(singular_noun("matrices"), Some("matrix".to_string()));
        assert_eq!(singular_noun("branches"), Some("branch".to_string()));
        assert_eq!(singular_noun("classes"), Some("class".to_string()));
        assert_eq!(singular_noun("areas"), Some("area".to_string()));
    }

    #[test]
    fn test_words_ending_in_as_are_kept() {
        assert_eq!(normalize("Pancreas"), "pancreas");
        assert_eq!(normalize("Atlas"), "atlas");
        assert_eq!(singular_noun("canvas"), None);
    }

    #[test]
    fn test_head_noun_before_of() {
        assert_eq!(normalize("Acinar cell of pancreas"), "acinar cell of pancreas");
        assert_eq!(
            normalize("Cells of the corpus callosum"),
            "cell of the corpus callosum"
        );
        assert_eq!(normalize("Islets of Langerhans"), "islet of langerhans");
        assert_eq!(singular_noun("cell of the ducts"), None);
        let once = normalize("Epithelial cells of the renal tubules");
        assert_eq!(once, "epithelial cell of the renal tubules");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_absent_and_empty_input() {
        assert_eq!(normalize_opt(None), "");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(", only an explanation"), "");
    }
}
