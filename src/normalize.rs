//! Text Normalizer (spec §4.1). Pure function over a raw text blob; no I/O.
//!
//! Grounded on the teacher's `ingest::normalize_text` (lowercase/URL/
//! whitespace pipeline) and `relevance::tokenize` (regex tokenizer), combined
//! into the six-step canonical pipeline spec.md documents.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Normalized {
    pub sentences: Vec<String>,
    pub tokens: Vec<String>,
}

static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("url regex"));
static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("image regex"));
static RE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link regex"));
static RE_MD_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_~`]").expect("md chars regex"));
static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*#+\s*").expect("heading regex"));
static RE_BLOCKQUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*>\s*").expect("blockquote regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static RE_SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("sentence boundary regex"));
static RE_TOKEN_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("token sep regex"));

/// Run the six-step canonical normalization pipeline over `raw`.
///
/// Total and deterministic: never panics, always returns (possibly empty)
/// sentences/tokens. Idempotent: `normalize(normalize(x).joined()) == normalize(x)`.
pub fn normalize(raw: &str) -> Normalized {
    // 1. Unicode-lowercase.
    let mut text = raw.to_lowercase();

    // 2. Remove URLs.
    text = RE_URL.replace_all(&text, " ").into_owned();

    // 3. Strip markdown syntax (character-class erasure, not HTML parsing).
    text = RE_IMAGE.replace_all(&text, "$1").into_owned();
    text = RE_LINK.replace_all(&text, "$1").into_owned();
    text = RE_MD_CHARS.replace_all(&text, "").into_owned();
    text = RE_HEADING.replace_all(&text, "").into_owned();
    text = RE_BLOCKQUOTE.replace_all(&text, "").into_owned();

    // 4. Collapse whitespace; trim.
    text = RE_WS.replace_all(&text, " ").trim().to_string();

    if text.is_empty() {
        return Normalized::default();
    }

    // 5. Sentence-segment; discard empty segments.
    let sentences: Vec<String> = RE_SENTENCE_BOUNDARY
        .split(&text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    // 6. Tokenize each sentence, preserving order across sentence boundaries.
    let mut tokens = Vec::new();
    for sentence in &sentences {
        for tok in RE_TOKEN_SEP.split(sentence) {
            if !tok.is_empty() {
                tokens.push(tok.to_string());
            }
        }
    }

    Normalized { sentences, tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_tokenizes() {
        let n = normalize("Hello World! This Is Reddalert.");
        assert_eq!(n.sentences, vec!["hello world", "this is reddalert"]);
        assert_eq!(
            n.tokens,
            vec!["hello", "world", "this", "is", "reddalert"]
        );
    }

    #[test]
    fn strips_urls() {
        let n = normalize("check out https://example.com/path?x=1 today");
        assert_eq!(n.tokens, vec!["check", "out", "today"]);
    }

    #[test]
    fn strips_www_urls() {
        let n = normalize("see www.example.com now");
        assert_eq!(n.tokens, vec!["see", "now"]);
    }

    #[test]
    fn strips_markdown_emphasis_and_code() {
        let n = normalize("This is *bold* and _em_ and ~strike~ and `code`.");
        assert_eq!(n.tokens, vec!["this", "is", "bold", "and", "em", "and", "strike", "and", "code"]);
    }

    #[test]
    fn converts_links_and_images() {
        let n = normalize("See [my link](https://x.com) and ![alt text](https://x.com/i.png).");
        assert_eq!(
            n.tokens,
            vec!["see", "my", "link", "and", "alt", "text"]
        );
    }

    #[test]
    fn strips_heading_and_blockquote_markers() {
        let n = normalize("# Big Title\n> quoted line");
        assert_eq!(n.sentences, vec!["big title quoted line"]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let n = normalize("");
        assert!(n.sentences.is_empty());
        assert!(n.tokens.is_empty());
    }

    #[test]
    fn whitespace_only_yields_empty_output() {
        let n = normalize("   \n\t  ");
        assert!(n.sentences.is_empty());
        assert!(n.tokens.is_empty());
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "Hello *World*! [link](https://a.b) www.c.d more text??",
            "# Heading\n> Quote\nBody text.",
            "",
            "ALREADY lowercase words only",
        ];
        for s in inputs {
            let once = normalize(s);
            let joined = once.sentences.join(" ");
            let twice = normalize(&joined);
            assert_eq!(once.tokens, twice.tokens, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn collapses_newlines_and_tabs() {
        let n = normalize("line one\n\nline\ttwo");
        assert_eq!(n.tokens, vec!["line", "one", "line", "two"]);
    }
}
