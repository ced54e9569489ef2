//! Token-overlap fuzzy matcher for Hebrew and English strings.
//!
//! Scores are deterministic for the same inputs. Callers apply their own
//! thresholds: 0.5 for destructive operations, 0.45 for searches.

use std::collections::BTreeSet;

/// Hebrew stop words, including common prefixed forms.
const STOP_WORDS_HE: &[&str] = &[
    "את", "עם", "של", "ב", "ל", "מ", "ה", "ו", "ביום", "לשעה", "בשעה", "על",
];

const STOP_WORDS_EN: &[&str] = &["the", "a", "with", "for", "to", "in", "on"];

/// Single-letter Hebrew prefixes stripped from tokens before comparison.
const HEBREW_PREFIXES: &[char] = &['ל', 'ב', 'ה', 'ו', 'מ', 'כ', 'ש'];

/// Threshold for destructive operations (delete, update targets).
pub const DESTRUCTIVE_THRESHOLD: f64 = 0.5;

/// Threshold for search-style lookups.
pub const SEARCH_THRESHOLD: f64 = 0.45;

/// Minimum lead over the runner-up for an automatic single pick.
pub const CLEAR_LEAD: f64 = 0.15;

/// A scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub index: usize,
    pub score: f64,
}

/// Lowercase, strip punctuation, collapse whitespace. Hebrew
/// geresh/gershayim vanish without splitting (they sit inside words like
/// אחה״צ); every other non-alphanumeric acts as a separator, which also
/// covers non-ASCII punctuation like the maqaf.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.chars() {
        let ch = if ch.is_ascii_uppercase() {
            ch.to_ascii_lowercase()
        } else {
            ch
        };
        if ch.is_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if ch == '״' || ch == '׳' {
            // Dropped entirely, keeping the word intact.
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS_HE.contains(&token) || STOP_WORDS_EN.contains(&token)
}

/// Strip a single leading Hebrew prefix letter, keeping the token viable.
fn strip_prefix(token: &str) -> &str {
    let mut chars = token.chars();
    if let Some(first) = chars.next() {
        if HEBREW_PREFIXES.contains(&first) {
            let rest = chars.as_str();
            if rest.chars().count() >= 2 {
                return rest;
            }
        }
    }
    token
}

fn tokenize(normalized: &str) -> BTreeSet<String> {
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !is_stop_word(t))
        .map(|t| strip_prefix(t).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Score `query` against one `candidate` in `[0, 1]`.
pub fn score(query: &str, candidate: &str) -> f64 {
    let q = normalize(query);
    let c = normalize(candidate);
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    if q == c {
        return 1.0;
    }
    if c.contains(&q) || q.contains(&c) {
        return 0.9;
    }

    let qt = tokenize(&q);
    let ct = tokenize(&c);
    if qt.is_empty() || ct.is_empty() {
        return 0.0;
    }
    let intersection = qt.intersection(&ct).count() as f64;
    let union = qt.union(&ct).count() as f64;
    let jaccard = intersection / union;
    if jaccard >= 0.5 {
        0.7 + 0.2 * jaccard
    } else {
        0.0
    }
}

/// Rank all candidates at or above `threshold`, best first. Ties keep the
/// original candidate order (stable sort), so results are deterministic.
pub fn rank(query: &str, candidates: &[String], threshold: f64) -> Vec<Match> {
    let mut matches: Vec<Match> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| Match {
            index,
            score: score(query, c),
        })
        .filter(|m| m.score >= threshold)
        .collect();
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

/// Pick a single winner: the top match when it leads the runner-up by at
/// least [`CLEAR_LEAD`], otherwise `None` (caller should disambiguate).
pub fn best_match(query: &str, candidates: &[String], threshold: f64) -> Option<Match> {
    let ranked = rank(query, candidates, threshold);
    match ranked.len() {
        0 => None,
        1 => Some(ranked[0].clone()),
        _ => {
            if ranked[0].score - ranked[1].score >= CLEAR_LEAD {
                Some(ranked[0].clone())
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(score("פגישה עם דני", "פגישה עם דני"), 1.0);
    }

    #[test]
    fn substring_scores_point_nine() {
        assert_eq!(score("פגישה", "פגישה עם דני"), 0.9);
        assert_eq!(score("dentist appointment", "dentist"), 0.9);
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(score("Dentist!", "dentist"), 1.0);
        assert_eq!(score("רופא־שיניים", "רופא שיניים"), 1.0);
    }

    #[test]
    fn hebrew_prefix_is_stripped() {
        // "לרופא" and "רופא" share the same stripped token.
        let s = score("תור לרופא שיניים", "תור רופא שיניים");
        assert!(s >= 0.7, "got {s}");
    }

    #[test]
    fn stop_words_do_not_count() {
        let s = score("פגישה עם דני", "פגישה דני");
        assert!(s >= 0.85, "got {s}");
    }

    #[test]
    fn unrelated_strings_score_zero() {
        assert_eq!(score("פגישה עם דני", "חדר כושר"), 0.0);
    }

    #[test]
    fn rank_orders_by_score() {
        let candidates = vec![
            "חדר כושר".to_string(),
            "פגישה עם דני".to_string(),
            "פגישה".to_string(),
        ];
        let ranked = rank("פגישה עם דני", &candidates, SEARCH_THRESHOLD);
        assert_eq!(ranked[0].index, 1);
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn best_match_requires_clear_lead() {
        let candidates = vec!["פגישה".to_string(), "פגישה".to_string()];
        assert!(best_match("פגישה", &candidates, DESTRUCTIVE_THRESHOLD).is_none());

        let candidates = vec!["פגישה עם דני".to_string(), "חדר כושר".to_string()];
        let m = best_match("פגישה עם דני", &candidates, DESTRUCTIVE_THRESHOLD).unwrap();
        assert_eq!(m.index, 0);
    }

    #[test]
    fn scoring_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                score("תור לרופא", "תור רופא שיניים"),
                score("תור לרופא", "תור רופא שיניים")
            );
        }
    }
}
