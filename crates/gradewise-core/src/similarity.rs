//! Sequence similarity between normalized answers.

use similar::{Algorithm, TextDiff};

/// Character-level similarity ratio in [0, 1].
///
/// Computed as `2 * M / T` where `M` is the number of characters in matching
/// blocks of a minimal diff and `T` the combined length of both strings.
/// Two empty strings are identical (1.0); an empty string against a
/// non-empty one shares nothing (0.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(a, b);
    f64::from(diff.ratio()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings() {
        assert_eq!(similarity("photosynthesis", "photosynthesis"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn empty_against_non_empty() {
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
    }

    #[test]
    fn disjoint_strings() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn symmetric() {
        let pairs = [
            ("kitten", "sitting"),
            ("the mitochondria", "mitochondria is the powerhouse"),
            ("光合作用", "光合反应"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a} vs {b}");
        }
    }

    #[test]
    fn shared_prefix_scores_between_bounds() {
        // 6 shared chars of 14 total.
        let score = similarity("abcdef", "abcdefgh");
        assert!((score - 12.0 / 14.0).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn more_overlap_scores_higher() {
        let close = similarity("newton second law", "newtons second law");
        let far = similarity("newton second law", "einstein relativity");
        assert!(close > far);
        assert!(close > 0.9);
    }

    #[test]
    fn unicode_is_compared_by_char() {
        let score = similarity("光合作用", "光合反应");
        assert!((score - 0.5).abs() < 1e-6, "got {score}");
    }
}
