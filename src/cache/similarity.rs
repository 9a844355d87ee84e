//! Key normalization and string similarity for fuzzy lookups.

/// Length ratio below which two strings are scored without computing
/// the edit distance.
const LENGTH_RATIO_CUTOFF: f64 = 0.5;

/// Normalize a lookup key: lower-case, punctuation stripped, whitespace
/// trimmed and collapsed to single spaces.
pub fn normalize_key(key: &str) -> String {
    let stripped: String = key
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity in `[0, 1]`: `1 - edit_distance / max(len_a, len_b)`.
///
/// When the shorter string is less than half the length of the longer one
/// the raw length ratio is returned instead; such pairs can never reach a
/// useful threshold and the edit distance is quadratic.
pub fn similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longer = len_a.max(len_b);
    if longer == 0 {
        return 1.0;
    }

    let ratio = len_a.min(len_b) as f64 / longer as f64;
    if ratio < LENGTH_RATIO_CUTOFF {
        return ratio;
    }

    1.0 - strsim::levenshtein(a, b) as f64 / longer as f64
}
