//! Question normalization and token-set similarity.

use std::collections::HashSet;

/// Canonical form used for matching: trimmed, lowercased, punctuation
/// stripped, whitespace collapsed.
pub fn normalize(question: &str) -> String {
    let mut out = String::with_capacity(question.len());
    let mut last_was_space = true;
    for ch in question.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() || ch.is_ascii_punctuation() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn token_set(normalized: &str) -> HashSet<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Jaccard similarity of the token sets of two normalized questions.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let sa = token_set(a);
    let sb = token_set(b);
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_punctuation_and_whitespace() {
        assert_eq!(
            normalize("  What's your   FAVORITE color?? "),
            "what s your favorite color"
        );
    }

    #[test]
    fn normalize_of_empty_is_empty() {
        assert_eq!(normalize("  ?!  "), "");
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let n = normalize("What is your name?");
        assert_eq!(jaccard(&n, &n), 1.0);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        assert_eq!(jaccard("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn jaccard_counts_shared_tokens() {
        // {what, is, your, name} vs {what, is, your, age}: 3 of 5.
        let a = normalize("What is your name?");
        let b = normalize("What is your age?");
        assert!((jaccard(&a, &b) - 0.6).abs() < 1e-9);
    }
}
