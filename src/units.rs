//! C1 Unitizer — splits messages into bounded semantic units
//! with deterministic IDs. Unitization is total: it never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use spectyra_core::{char_windows, hash_prefix, DEFAULT_MAX_UNITS, UNIT_MAX_CHARS, UNIT_MIN_CHARS};

use crate::types::{Message, Role, SemanticUnit, UnitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitizerPath {
    Talk,
    Code,
}

#[derive(Debug, Clone, Copy)]
pub struct UnitizerOptions {
    pub min_chars: usize,
    pub max_chars: usize,
    pub max_units: usize,
    pub skip_system: bool,
}

impl Default for UnitizerOptions {
    fn default() -> Self {
        Self {
            min_chars: UNIT_MIN_CHARS,
            max_chars: UNIT_MAX_CHARS,
            max_units: DEFAULT_MAX_UNITS,
            skip_system: true,
        }
    }
}

static BULLET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-*]|\d+\.)\s+").unwrap());
static DIFF_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(---|\+\+\+|@@|diff --git)").unwrap());
static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```[^\n]*\n.*?```").unwrap());
static CONSTRAINT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(must|should|require[sd]?)\b").unwrap());

/// Split `messages` into bounded semantic units. Total function — never fails.
pub fn unitize(
    path: UnitizerPath,
    messages: &[Message],
    opts: UnitizerOptions,
) -> Vec<SemanticUnit> {
    let mut units = Vec::new();
    let mut seen_ids: std::collections::HashMap<String, u32> = std::collections::HashMap::new();

    for (turn, msg) in messages.iter().enumerate() {
        if opts.skip_system && msg.role == Role::System {
            continue;
        }
        let normalized = normalize(&msg.content);

        let chunks: Vec<(String, bool)> = match path {
            UnitizerPath::Code => code_chunks(&normalized),
            UnitizerPath::Talk => talk_chunks(&normalized),
        };

        for (chunk, is_code_block) in chunks {
            for clamped in clamp_chunk(&chunk, opts.min_chars, opts.max_chars) {
                let kind = infer_kind(&clamped, msg.role, is_code_block);
                let id = make_id(&clamped, kind, msg.role, &mut seen_ids);
                units.push(SemanticUnit {
                    id,
                    kind,
                    text: clamped,
                    role: msg.role,
                    embedding: None,
                    stability_score: 0.5,
                    created_at_turn: turn as u32,
                });
            }
        }
    }

    let len = units.len();
    if len > opts.max_units {
        units.drain(0..len - opts.max_units);
    }
    units
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// Extracts fenced code blocks as `CODE_BLOCK:`-prefixed units, recursively
/// unitizing the remaining prose as talk chunks.
fn code_chunks(text: &str) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in FENCE.find_iter(text) {
        let prose = &text[last..m.start()];
        for (chunk, is_code) in talk_chunks(prose) {
            out.push((chunk, is_code));
        }
        out.push((format!("CODE_BLOCK:{}", m.as_str()), true));
        last = m.end();
    }
    let tail = &text[last..];
    for (chunk, is_code) in talk_chunks(tail) {
        out.push((chunk, is_code));
    }
    out
}

/// Splits on blank-line paragraphs, or bullet lines when bullets are present.
fn talk_chunks(text: &str) -> Vec<(String, bool)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let has_bullets = trimmed.lines().any(|l| BULLET_LINE.is_match(l));
    if has_bullets {
        let mut chunks = Vec::new();
        let mut current = String::new();
        for line in trimmed.lines() {
            if BULLET_LINE.is_match(line) && !current.trim().is_empty() {
                chunks.push((current.trim().to_string(), false));
                current.clear();
            }
            current.push_str(line);
            current.push('\n');
        }
        if !current.trim().is_empty() {
            chunks.push((current.trim().to_string(), false));
        }
        chunks
    } else {
        trimmed
            .split("\n\n")
            .map(|p| (p.trim().to_string(), false))
            .filter(|(p, _)| !p.is_empty())
            .collect()
    }
}

/// Clamps a chunk to `[min_chars, max_chars]`: drop below min, window above max.
fn clamp_chunk(chunk: &str, min_chars: usize, max_chars: usize) -> Vec<String> {
    let char_count = chunk.chars().count();
    if char_count < min_chars {
        return Vec::new();
    }
    if char_count <= max_chars {
        return vec![chunk.to_string()];
    }
    char_windows(chunk, max_chars)
}

fn infer_kind(text: &str, role: Role, is_code_block: bool) -> UnitKind {
    if DIFF_HEADER.is_match(text) {
        return UnitKind::Patch;
    }
    if is_code_block || text.starts_with("CODE_BLOCK:") {
        return UnitKind::Code;
    }
    if role == Role::User && CONSTRAINT_WORDS.is_match(text) {
        return UnitKind::Constraint;
    }
    if role == Role::Assistant {
        return UnitKind::Explanation;
    }
    UnitKind::Fact
}

/// Deterministic ID: first 16 hex chars of `hash(normalized_text | kind | role)`,
/// with numeric disambiguation on collision within the request.
fn make_id(
    text: &str,
    kind: UnitKind,
    role: Role,
    seen: &mut std::collections::HashMap<String, u32>,
) -> String {
    let base_input = format!("{text}|{kind:?}|{role:?}");
    let base = hash_prefix(&base_input);
    match seen.get_mut(&base) {
        None => {
            seen.insert(base.clone(), 0);
            base
        }
        Some(count) => {
            *count += 1;
            format!("{base}-{count}")
        }
    }
}
