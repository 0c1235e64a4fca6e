//! Similarity scoring between a free-text query and a candidate name.
//!
//! Rules are evaluated in priority order and the first one that fires wins:
//! exact match (100), whole-word containment (90), prefix (80), word overlap
//! (up to 70), then a normalized Levenshtein fallback.

/// Highest possible score, awarded to case-insensitive exact matches.
pub const MAX_SCORE: u8 = 100;

const CONTAINS_SCORE: u8 = 90;
const PREFIX_SCORE: u8 = 80;
const WORD_OVERLAP_WEIGHT: usize = 70;

/// Score how well `candidate` matches `query`, in `0..=100`.
///
/// Deterministic and allocation-light; safe to call in tight ranking loops.
pub fn score(query: &str, candidate: &str) -> u8 {
    let query = query.to_lowercase();
    let candidate = candidate.to_lowercase();

    if query == candidate {
        return MAX_SCORE;
    }

    // An empty query trivially "contains" and "prefixes" everything, so only the
    // distance fallback applies to it.
    if !query.is_empty() {
        if contains_word_bounded(&candidate, &query) {
            return CONTAINS_SCORE;
        }
        if candidate.starts_with(&query) {
            return PREFIX_SCORE;
        }
        if let Some(overlap) = word_overlap(&query, &candidate) {
            return overlap;
        }
    }

    distance_score(&query, &candidate)
}

/// True if `needle` occurs in `haystack` with no alphanumeric character
/// immediately before or after it.
///
/// Every start position is tried, so an unbounded occurrence never hides an
/// overlapping bounded one (`"ab ab"` in `"xab ab ab"`).
fn contains_word_bounded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut pos = 0;
    while let Some(found) = haystack[pos..].find(needle) {
        let start = pos + found;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // Step one char, not the match length, so overlapping occurrences are seen.
        let step = haystack[start..].chars().next().map_or(1, char::len_utf8);
        pos = start + step;
    }
    false
}

/// Fraction of query words that overlap some candidate word, scaled to 70.
///
/// A query word overlaps when it is a substring of a candidate word or contains
/// one. Returns `None` when nothing overlaps so the caller can fall through.
fn word_overlap(query: &str, candidate: &str) -> Option<u8> {
    let query_words: Vec<&str> = query.split_whitespace().collect();
    if query_words.is_empty() {
        return None;
    }
    let candidate_words: Vec<&str> = candidate.split_whitespace().collect();

    let matched = query_words
        .iter()
        .filter(|qw| {
            candidate_words
                .iter()
                .any(|cw| cw.contains(**qw) || qw.contains(*cw))
        })
        .count();

    if matched == 0 {
        return None;
    }
    Some((matched * WORD_OVERLAP_WEIGHT / query_words.len()) as u8)
}

/// `100 - d * 100 / max_len`, clamped at zero. Two empty strings score 100.
fn distance_score(query: &str, candidate: &str) -> u8 {
    let max_len = query.chars().count().max(candidate.chars().count());
    if max_len == 0 {
        return MAX_SCORE;
    }
    let distance = levenshtein(query, candidate);
    let penalty = distance * 100 / max_len;
    100usize.saturating_sub(penalty) as u8
}

/// Classic two-row Levenshtein distance over Unicode scalar values.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_insensitive() {
        assert_eq!(score("Iron Sword", "iron sword"), 100);
        assert_eq!(score("IRON", "iron"), 100);
        assert_eq!(score("Ünïcode", "üNÏCODE"), 100);
    }

    #[test]
    fn self_score_is_always_max() {
        for s in ["", " ", "a", "Obsidian Greatsword", "Carrack", "x y z"] {
            assert_eq!(score(s, s), 100, "score({s:?}, {s:?})");
        }
    }

    #[test]
    fn both_empty_scores_max() {
        assert_eq!(score("", ""), 100);
    }

    #[test]
    fn one_side_empty_uses_distance() {
        // d = len, max_len = len → 100 - 100 = 0
        assert_eq!(score("", "iron"), 0);
        assert_eq!(score("iron", ""), 0);
    }

    #[test]
    fn whole_word_containment() {
        assert_eq!(score("iron", "Iron Sword"), 90);
        assert_eq!(score("sword", "Iron Sword"), 90);
        assert_eq!(score("iron sword", "Tempered Iron Sword"), 90);
        assert_eq!(score("iron", "Sword (Iron)"), 90);
    }

    #[test]
    fn whole_word_containment_finds_overlapping_occurrence() {
        // The first "ab ab" starts mid-word; the bounded one overlaps it.
        assert_eq!(score("ab ab", "xab ab ab"), 90);
        assert_eq!(score("aa", "baa aa"), 90);
        assert!(!contains_word_bounded("xab abx", "ab ab"));
    }

    #[test]
    fn prefix_inside_longer_word() {
        assert_eq!(score("iron", "Ironwood Shield"), 80);
        assert_eq!(score("car", "Carrack"), 80);
    }

    #[test]
    fn word_overlap_scales_with_matched_words() {
        // "wood" is inside "ironwood"; "bow" matches nothing → 1 * 70 / 2
        assert_eq!(score("wood bow", "Ironwood Shield"), 35);
        // both words overlap, but not as a contiguous phrase
        assert_eq!(score("shield ironwood", "Ironwood Shield"), 70);
        // candidate word contained in query word
        assert_eq!(score("swords", "Iron Sword"), 70);
    }

    #[test]
    fn distance_fallback() {
        // one substitution over four characters → 100 - 25
        assert_eq!(score("irnn", "iron"), 75);
        assert_eq!(score("abc", "xyz"), 0);
    }

    #[test]
    fn score_is_bounded() {
        let samples = ["", "a", "iron", "Iron Sword", "zzzzzzzzzzzzzzzz", "ü", "a b c d"];
        for q in samples {
            for c in samples {
                let s = score(q, c);
                assert!(s <= 100, "score({q:?}, {c:?}) = {s}");
            }
        }
    }

    #[test]
    fn levenshtein_known_values() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
