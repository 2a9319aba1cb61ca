//! Text similarity for academic-integrity checks
//!
//! Word 3-shingles compared with Jaccard similarity. Text is lowercased and
//! stripped of punctuation first, so trivial reformatting does not hide a
//! copy.

use std::collections::HashSet;

pub const SHINGLE_SIZE: usize = 3;
/// Matches below this are not reported
pub const REPORT_THRESHOLD: f64 = 0.3;
/// Matches at or above this open a plagiarism report automatically
pub const AUTO_FLAG_THRESHOLD: f64 = 0.8;

fn normalize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn shingles(text: &str) -> HashSet<String> {
    let words = normalize(text);
    if words.is_empty() {
        return HashSet::new();
    }
    if words.len() < SHINGLE_SIZE {
        return std::iter::once(words.join(" ")).collect();
    }
    words
        .windows(SHINGLE_SIZE)
        .map(|w| w.join(" "))
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

pub fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&shingles(a), &shingles(b))
}

/// Score `target` against each candidate `(id, text)` and keep those at or
/// above [`REPORT_THRESHOLD`], best first.
pub fn rank_matches<'a, I>(target: &str, candidates: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let target_shingles = shingles(target);
    let mut matches: Vec<(String, f64)> = candidates
        .into_iter()
        .map(|(id, text)| (id.to_string(), jaccard(&target_shingles, &shingles(text))))
        .filter(|(_, score)| *score >= REPORT_THRESHOLD)
        .collect();
    matches.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    matches
}

/// Round for display and storage
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text() {
        let text = "The mitochondria is the powerhouse of the cell.";
        assert_eq!(similarity(text, text), 1.0);
    }

    #[test]
    fn test_formatting_is_ignored() {
        let a = "The mitochondria is the powerhouse of the cell.";
        let b = "the MITOCHONDRIA, is the powerhouse -- of the cell";
        assert_eq!(similarity(a, b), 1.0);
    }

    #[test]
    fn test_unrelated_text() {
        let a = "Photosynthesis converts light energy into chemical energy.";
        let b = "The French revolution began in seventeen eighty nine.";
        assert_eq!(similarity(a, b), 0.0);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("", "some words here"), 0.0);
    }

    #[test]
    fn test_short_text_single_shingle() {
        let s = shingles("Hello world");
        assert_eq!(s.len(), 1);
        assert!(s.contains("hello world"));
    }

    #[test]
    fn test_partial_overlap() {
        // 4 shingles each, 2 shared -> 2 / 6
        let a = "one two three four five six";
        let b = "one two three four seven eight";
        let score = similarity(a, b);
        assert!((score - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_matches_filters_and_sorts() {
        let target = "one two three four five six";
        let candidates = vec![
            ("low", "alpha beta gamma delta"),
            ("exact", "one two three four five six"),
            ("partial", "one two three four seven eight"),
        ];
        let ranked = rank_matches(target, candidates);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "exact");
        assert_eq!(ranked[1].0, "partial");
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(1.0 / 3.0), 0.333);
    }
}
