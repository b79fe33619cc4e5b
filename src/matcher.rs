//! Proximity Matcher (spec §4.2). Pure function over a normalized token
//! sequence and a keyword spec; no I/O.
//!
//! Grounded on the teacher's `relevance.rs` proximity primitives
//! (`tokenize_with_index`, `within_window`, `match_token_indices`) and
//! `analyze/rules.rs`'s phrase-containment style, generalized to the OR-group
//! + exclusion + stemming + ordering contract spec.md §4.2 defines.

use crate::model::Keyword;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static RE_TOKEN_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("token sep regex"));

/// Tokenize a phrase/exclusion string using the normalizer's tokenization
/// rule (lowercase + `\W+` split, empty tokens discarded).
pub fn tokenize_words(s: &str) -> Vec<String> {
    let lower = s.to_lowercase();
    RE_TOKEN_SEP
        .split(&lower)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

const STEM_SUFFIXES: &[&str] = &["ment", "tion", "ing", "est", "ed", "er", "es", "ly", "s"];

/// Deterministic suffix stemmer (§4.2): strips the longest matching suffix
/// among a fixed set when the remaining stem length is at least 3, then
/// normalizes a trailing silent `e` so inflected forms that drop it before
/// adding a suffix (e.g. "arbitrage" / "arbitraging") converge on the same
/// stem.
pub fn stem(word: &str) -> &str {
    let mut base = word;
    for suf in STEM_SUFFIXES {
        if base.len() > suf.len() && base.ends_with(suf) && base.len() - suf.len() >= 3 {
            base = &base[..base.len() - suf.len()];
            break;
        }
    }
    if base.len() >= 4 && base.ends_with('e') {
        base = &base[..base.len() - 1];
    }
    base
}

fn canon(word: &str, use_stemming: bool) -> &str {
    if use_stemming {
        stem(word)
    } else {
        word
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit {
    pub phrase: String,
    pub span_start: usize,
    pub span_end: usize,
    pub score: f32,
    pub also_matched: Vec<String>,
}

/// Find the minimal span `[start, end]` (inclusive token indices) within
/// `tokens` containing every token of `phrase_tokens` as a subsequence in
/// order, i.e. LeetCode 727 "minimum window subsequence". Used when
/// `require_order = true`.
fn min_window_ordered(tokens: &[String], phrase_tokens: &[String], use_stemming: bool) -> Option<(usize, usize)> {
    let n = tokens.len();
    let m = phrase_tokens.len();
    if m == 0 || n == 0 {
        return None;
    }
    let eq = |t: &str, p: &str| canon(t, use_stemming) == canon(p, use_stemming);

    let mut best: Option<(usize, usize)> = None;
    let mut i = 0usize;
    while i < n {
        // Forward match: find end such that tokens[i..=end] contains phrase as subsequence.
        let mut j = 0usize;
        let mut k = i;
        while k < n && j < m {
            if eq(&tokens[k], &phrase_tokens[j]) {
                j += 1;
            }
            k += 1;
        }
        if j < m {
            break; // no further full match possible
        }
        let end = k - 1;

        // Backward shrink: find the latest possible start for this end.
        let mut j2 = m - 1;
        let mut k2 = end;
        loop {
            if eq(&tokens[k2], &phrase_tokens[j2]) {
                if j2 == 0 {
                    break;
                }
                j2 -= 1;
            }
            if k2 == 0 {
                break;
            }
            k2 -= 1;
        }
        let start = k2;

        let better = match best {
            None => true,
            Some((bs, be)) => {
                let cur_w = end - start;
                let best_w = be - bs;
                cur_w < best_w || (cur_w == best_w && start < bs)
            }
        };
        if better {
            best = Some((start, end));
        }
        i = start + 1;
    }
    best
}

/// Find the minimal span `[start, end]` within `tokens` containing every
/// token of `phrase_tokens` as a multiset (order irrelevant), i.e. the
/// "minimum window substring" contract. Used for unordered phrase matching
/// and for all exclusion checks (which are always unordered, §4.2).
fn min_window_unordered(tokens: &[String], phrase_tokens: &[String], use_stemming: bool) -> Option<(usize, usize)> {
    let n = tokens.len();
    if phrase_tokens.is_empty() || n == 0 {
        return None;
    }

    let mut need: HashMap<&str, i32> = HashMap::new();
    for p in phrase_tokens {
        *need.entry(canon(p, use_stemming)).or_insert(0) += 1;
    }
    let required_distinct = need.len();

    let canon_toks: Vec<&str> = tokens.iter().map(|t| canon(t, use_stemming)).collect();

    let mut window: HashMap<&str, i32> = HashMap::new();
    let mut satisfied = 0usize;
    let mut left = 0usize;
    let mut best: Option<(usize, usize)> = None;

    for right in 0..n {
        let ct = canon_toks[right];
        if let Some(&needed) = need.get(ct) {
            let cur = window.entry(ct).or_insert(0);
            *cur += 1;
            if *cur == needed {
                satisfied += 1;
            }
        }

        while satisfied == required_distinct {
            let better = match best {
                None => true,
                Some((bs, be)) => {
                    let cur_w = right - left;
                    let best_w = be - bs;
                    cur_w < best_w || (cur_w == best_w && left < bs)
                }
            };
            if better {
                best = Some((left, right));
            }

            let lt = canon_toks[left];
            if let Some(&needed) = need.get(lt) {
                let cur = window.get_mut(lt).unwrap();
                if *cur == needed {
                    satisfied -= 1;
                }
                *cur -= 1;
            }
            left += 1;
        }
    }
    best
}

fn proximity_score(span_len: usize, phrase_len: usize, window: usize) -> f32 {
    let denom = (window.saturating_sub(phrase_len) + 1).max(1) as f32;
    let numer = (span_len.saturating_sub(phrase_len)) as f32;
    (1.0 - numer / denom).clamp(0.0, 1.0)
}

/// Evaluate a single phrase (already tokenized) against `tokens` for a given
/// `window`/`require_order`/`use_stemming` configuration. Returns the best
/// hit span + score if the phrase hits within the window.
fn best_hit(
    tokens: &[String],
    phrase_tokens: &[String],
    window: usize,
    require_order: bool,
    use_stemming: bool,
) -> Option<(usize, usize, f32)> {
    if phrase_tokens.is_empty() || tokens.is_empty() || phrase_tokens.len() > window {
        return None;
    }
    let span = if require_order {
        min_window_ordered(tokens, phrase_tokens, use_stemming)
    } else {
        min_window_unordered(tokens, phrase_tokens, use_stemming)
    }?;
    let (start, end) = span;
    let span_len = end - start + 1;
    if span_len > window {
        return None;
    }
    let score = proximity_score(span_len, phrase_tokens.len(), window);
    Some((start, end, score))
}

/// Check whether any exclusion hits anywhere in `tokens` (§4.2: exclusion
/// scope is fixed as "anywhere", always unordered, using the keyword's own
/// window and stemming setting).
fn any_exclusion_hits(tokens: &[String], keyword: &Keyword) -> bool {
    for excl in &keyword.exclusions {
        let excl_tokens = tokenize_words(excl);
        if best_hit(tokens, &excl_tokens, keyword.proximity_window, false, keyword.use_stemming).is_some() {
            return true;
        }
    }
    false
}

/// Run the proximity matcher (§4.2) over `tokens` for `keyword`.
///
/// Deterministic and pure: same inputs always produce the same output.
pub fn match_keyword(tokens: &[String], keyword: &Keyword) -> Option<MatchHit> {
    if keyword.phrases.is_empty() || tokens.is_empty() {
        return None;
    }

    if any_exclusion_hits(tokens, keyword) {
        return None;
    }

    let mut primary: Option<(String, usize, usize, f32)> = None;
    let mut also_matched = Vec::new();

    for phrase in &keyword.phrases {
        let phrase_tokens = tokenize_words(phrase);
        if let Some((start, end, score)) = best_hit(
            tokens,
            &phrase_tokens,
            keyword.proximity_window,
            keyword.require_order,
            keyword.use_stemming,
        ) {
            if primary.is_none() {
                primary = Some((phrase.clone(), start, end, score));
            } else {
                also_matched.push(phrase.clone());
            }
        }
    }

    primary.map(|(phrase, start, end, score)| MatchHit {
        phrase,
        span_start: start,
        span_end: end,
        score,
        also_matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn kw(phrases: &[&str]) -> Keyword {
        let mut k = Keyword::new("t1", phrases.iter().map(|s| s.to_string()).collect());
        k.proximity_window = 15;
        k
    }

    fn toks(s: &str) -> Vec<String> {
        normalize(s).tokens
    }

    #[test]
    fn exact_phrase_hit() {
        let t = toks("I recommend arbitrage betting strategies for new sportsbooks.");
        let k = kw(&["arbitrage betting"]);
        let m = match_keyword(&t, &k).expect("expected match");
        assert_eq!(m.phrase, "arbitrage betting");
        assert!((m.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn proximity_within_window_unordered() {
        let t = toks("betting on arbitrage opportunities today");
        let mut k = kw(&["arbitrage betting"]);
        k.proximity_window = 5;
        assert!(match_keyword(&t, &k).is_some());

        k.require_order = true;
        assert!(match_keyword(&t, &k).is_none());
    }

    #[test]
    fn exclusion_rejects() {
        let t = toks("arbitrage betting is not legal here");
        let mut k = kw(&["arbitrage betting"]);
        k.exclusions = vec!["not legal".to_string()];
        assert!(match_keyword(&t, &k).is_none());
    }

    #[test]
    fn stemming_toggle() {
        let t = toks("arbitraging bets");
        let mut k = kw(&["arbitrage bet"]);
        k.use_stemming = true;
        assert!(match_keyword(&t, &k).is_some());

        k.use_stemming = false;
        assert!(match_keyword(&t, &k).is_none());
    }

    #[test]
    fn empty_phrases_never_match() {
        let t = toks("anything goes here");
        let k = Keyword::new("t1", vec![]);
        assert!(match_keyword(&t, &k).is_none());
    }

    #[test]
    fn empty_tokens_never_match() {
        let k = kw(&["foo"]);
        assert!(match_keyword(&[], &k).is_none());
    }

    #[test]
    fn phrase_longer_than_window_never_matches() {
        let t = toks("a b c d e f g h i j k l m n o p");
        let mut k = kw(&["a b c d e f g h i j k l m n o p q"]); // 17 tokens
        k.proximity_window = 10;
        assert!(match_keyword(&t, &k).is_none());
    }

    #[test]
    fn or_group_populates_also_matched() {
        let t = toks("fed rate hike and inflation report both out today");
        let k = kw(&["rate hike", "inflation report"]);
        let m = match_keyword(&t, &k).expect("expected match");
        assert_eq!(m.phrase, "rate hike");
        assert_eq!(m.also_matched, vec!["inflation report"]);
    }

    #[test]
    fn monotonic_in_window_size() {
        let t = toks("arbitrage word word word word word word betting");
        let mut k = kw(&["arbitrage betting"]);
        k.proximity_window = 3;
        assert!(match_keyword(&t, &k).is_none());
        k.proximity_window = 50;
        assert!(match_keyword(&t, &k).is_some());
    }

    #[test]
    fn deterministic_repeat_calls() {
        let t = toks("arbitrage betting arbitrage betting");
        let k = kw(&["arbitrage betting"]);
        let a = match_keyword(&t, &k);
        let b = match_keyword(&t, &k);
        assert_eq!(a, b);
    }
}
