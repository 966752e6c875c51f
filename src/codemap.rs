//! C8 CodeMap Compressor — extracts fenced code
//! blocks, parses a structural digest (symbols/imports/exports), and
//! replaces the blocks with references. The resulting index is embedded
//! into the SCC state message rather than emitted as a second message.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::fence_guard::{segment, Segment};
use crate::types::Message;

static IMPORT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:use\s+[\w:]+|import\s+.+|.*require\(.+\))").unwrap());
static EXPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:pub\s+(?:fn|struct|enum|trait)\s+\w+|export\s+.+|module\.exports.*)")
        .unwrap()
});
static SYMBOL_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:fn|function|class|struct|def)\s+(\w+)").unwrap());

#[derive(Debug, Clone, Default)]
pub struct CodeDigest {
    pub symbols: Vec<String>,
    pub exports: Vec<String>,
    pub imports: Vec<String>,
    pub dependencies: Vec<String>,
}

pub struct CodeMapResult {
    pub messages: Vec<Message>,
    pub structural_index: String,
}

/// Replaces fenced code blocks with references, keeping the
/// `ceil(count * detail_level)` largest blocks as addressable snippets and
/// listing the rest as omitted in the structural index.
pub fn compress(messages: &[Message], detail_level: f64) -> CodeMapResult {
    let blocks = collect_blocks(messages);
    if blocks.is_empty() {
        return CodeMapResult {
            messages: messages.to_vec(),
            structural_index: String::new(),
        };
    }

    let keep_count = ((blocks.len() as f64) * detail_level).ceil() as usize;
    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(blocks[i].chars().count()));
    let kept: std::collections::HashSet<usize> = order.into_iter().take(keep_count).collect();

    let mut snippet_idx = 0usize;
    let mut omitted = 0usize;
    let mut digest = CodeDigest::default();
    let mut block_counter = 0usize;

    let rewritten: Vec<Message> = messages
        .iter()
        .map(|m| {
            let rewritten_text = segment(&m.content)
                .into_iter()
                .map(|seg| match seg {
                    Segment::Text(t) => t,
                    Segment::Code(code) => {
                        merge_digest(&mut digest, &code);
                        let idx = block_counter;
                        block_counter += 1;
                        if kept.contains(&idx) {
                            snippet_idx += 1;
                            format!("[[CODEMAP:snippet_{snippet_idx}]]")
                        } else {
                            omitted += 1;
                            "[[CODEMAP:structural]]".to_string()
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join("");
            Message::new(m.role, rewritten_text)
        })
        .collect();

    digest.symbols.sort();
    digest.symbols.dedup();
    digest.exports.sort();
    digest.exports.dedup();
    digest.imports.sort();
    digest.imports.dedup();
    digest.dependencies = digest.imports.clone();

    let mut index = String::new();
    index.push_str(&format!("symbols: {}\n", digest.symbols.join(", ")));
    index.push_str(&format!("exports: {}\n", digest.exports.join(", ")));
    index.push_str(&format!("imports: {}\n", digest.imports.join(", ")));
    if omitted > 0 {
        index.push_str(&format!("omitted blocks: {omitted}\n"));
    }

    CodeMapResult {
        messages: rewritten,
        structural_index: index.trim_end().to_string(),
    }
}

fn collect_blocks(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .flat_map(|m| {
            segment(&m.content).into_iter().filter_map(|seg| match seg {
                Segment::Code(c) => Some(c),
                Segment::Text(_) => None,
            })
        })
        .collect()
}

fn merge_digest(digest: &mut CodeDigest, code: &str) {
    for m in IMPORT_LINE.find_iter(code) {
        digest.imports.push(m.as_str().trim().to_string());
    }
    for m in EXPORT_LINE.find_iter(code) {
        digest.exports.push(m.as_str().trim().to_string());
    }
    for cap in SYMBOL_DEF.captures_iter(code) {
        digest.symbols.push(cap[1].to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn code_message(body: &str) -> Message {
        Message::new(Role::User, format!("intro\n```rust\n{body}\n```\ntail"))
    }

    #[test]
    fn replaces_all_blocks_when_detail_level_zero() {
        let messages = vec![code_message("fn add(a: i32, b: i32) -> i32 { a + b }")];
        let result = compress(&messages, 0.0);
        assert!(result.messages[0].content.contains("[[CODEMAP:structural]]"));
        assert!(!result.messages[0].content.contains("fn add"));
    }

    #[test]
    fn keeps_largest_block_as_snippet_when_detail_level_positive() {
        let messages = vec![
            code_message("fn small() {}"),
            code_message("fn much_larger_function_body() { let x = 1; let y = 2; x + y; }"),
        ];
        let result = compress(&messages, 0.5);
        let joined: String = result.messages.iter().map(|m| m.content.clone()).collect();
        assert!(joined.contains("[[CODEMAP:snippet_1]]"));
    }

    #[test]
    fn extracts_symbols_and_imports() {
        let messages = vec![code_message("use std::fmt;\nfn compute() -> i32 { 1 }")];
        let result = compress(&messages, 1.0);
        assert!(result.structural_index.contains("compute"));
        assert!(result.structural_index.contains("use std::fmt"));
    }

    #[test]
    fn no_blocks_returns_unchanged_messages() {
        let messages = vec![Message::new(Role::User, "no code here at all")];
        let result = compress(&messages, 1.0);
        assert_eq!(result.messages[0].content, "no code here at all");
        assert!(result.structural_index.is_empty());
    }
}
