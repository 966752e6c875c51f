//! Fenced-code guard — shared by every rewrite layer (STE,
//! refpack, CodeMap). Splits text into fenced-code and non-code segments so
//! replacements only ever touch prose, never a code block's contents.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[^\n]*\n.*?```").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Code(String),
    Text(String),
}

/// Splits `text` into an ordered list of code/non-code segments.
pub fn segment(text: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in FENCE_SEGMENT.find_iter(text) {
        if m.start() > last {
            out.push(Segment::Text(text[last..m.start()].to_string()));
        }
        out.push(Segment::Code(m.as_str().to_string()));
        last = m.end();
    }
    if last < text.len() {
        out.push(Segment::Text(text[last..].to_string()));
    }
    out
}

/// Applies `rewrite` to every non-code segment and re-joins the result,
/// leaving fenced code blocks byte-for-byte untouched.
pub fn rewrite_non_code<F>(text: &str, mut rewrite: F) -> String
where
    F: FnMut(&str) -> String,
{
    segment(text)
        .into_iter()
        .map(|seg| match seg {
            Segment::Code(c) => c,
            Segment::Text(t) => rewrite(&t),
        })
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_code_and_text_in_order() {
        let text = "before\n```rust\nfn x() {}\n```\nafter";
        let segs = segment(text);
        assert_eq!(segs.len(), 3);
        assert!(matches!(&segs[0], Segment::Text(t) if t == "before\n"));
        assert!(matches!(&segs[1], Segment::Code(_)));
        assert!(matches!(&segs[2], Segment::Text(t) if t == "\nafter"));
    }

    #[test]
    fn rewrite_skips_code_segments() {
        let text = "alpha\n```\nalpha\n```\nalpha";
        let out = rewrite_non_code(text, |t| t.replace("alpha", "BETA"));
        assert_eq!(out, "BETA\n```\nalpha\n```\nBETA");
    }

    #[test]
    fn text_with_no_fences_is_fully_rewritten() {
        let out = rewrite_non_code("alpha alpha", |t| t.replace("alpha", "x"));
        assert_eq!(out, "x x");
    }
}
