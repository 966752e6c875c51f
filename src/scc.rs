//! C6 Spectral Context Compiler — the authoritative compression
//! layer. Produces a single system-role state message summarizing older
//! history and returns the messages to keep verbatim alongside it.

use once_cell::sync::Lazy;
use regex::Regex;
use spectyra_core::truncate_with_ellipsis;

use crate::types::{Budgets, Message, Role};
use crate::units::UnitizerPath;

const TALK_OPEN: &str = "[SPECTYRA_STATE_TALK]";
const TALK_CLOSE: &str = "[/SPECTYRA_STATE_TALK]";
const CODE_OPEN: &str = "[SPECTYRA_STATE_CODE]";
const CODE_CLOSE: &str = "[/SPECTYRA_STATE_CODE]";

const MAX_KNOWN_FACTS: usize = 8;
const MAX_DECISIONS: usize = 8;
const FACT_LINE_CHARS: usize = 120;
const GOAL_LINE_CHARS: usize = 200;
const MAX_FAILING_SIGNALS: usize = 6;
const MAX_TOUCHED_FILES: usize = 10;

static RULE_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(must|should|require[sd]?|never|always)\b").unwrap());
static CONFIG_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*[\{\[]|^\s*"[\w.-]+"\s*:"#).unwrap());
static ES_TARGET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bES20\d\d\b").unwrap());
static OPTIONAL_CHAINING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)optional[\s-]chaining").unwrap());
static ERROR_IN: Lazy<Regex> = Lazy::new(|| Regex::new(r"ERROR in ([^\s:]+):(\d+)").unwrap());
static TS_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"TS\d+:\s*[^\n]+").unwrap());
static STACK_FRAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s+at\s+\S+").unwrap());
static GLOSSARY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[R\d+\]\]").unwrap());
static TOUCHED_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w./-]+\.(?:rs|ts|tsx|js|jsx|py|go|java|rb|c|cpp|h|hpp)").unwrap());

/// Output of the SCC: the single state message plus the verbatim-kept tail.
pub struct SccOutput {
    pub state_message: Message,
    pub kept_messages: Vec<Message>,
}

/// Runs the SCC over `messages`. `messages` must already include any prior
/// state carried over from the Conversation State Store.
pub fn compile(path: UnitizerPath, messages: &[Message], budgets: &Budgets) -> SccOutput {
    let last_user_idx = messages.iter().rposition(|m| m.role == Role::User);
    let keep_from = keep_from_index(messages, budgets.keep_last_turns);

    let body = match path {
        UnitizerPath::Talk => build_talk_body(messages, keep_from),
        UnitizerPath::Code => build_code_body(messages, keep_from),
    };

    let stripped = GLOSSARY_MARKER.replace_all(&body, "").to_string();
    let truncated = truncate_with_ellipsis(&stripped, budgets.max_state_chars);

    let (open, close) = match path {
        UnitizerPath::Talk => (TALK_OPEN, TALK_CLOSE),
        UnitizerPath::Code => (CODE_OPEN, CODE_CLOSE),
    };
    let state_message = Message::new(Role::System, format!("{open}\n{truncated}\n{close}"));

    // Strip any pre-existing system-role messages (carried prior state, or a
    // client-supplied system message) so the SCC's own state message remains
    // the only system-role message in the output.
    let mut kept_messages: Vec<Message> = messages[keep_from..]
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    if let Some(last_user) = last_user_idx {
        for (idx, m) in messages.iter().enumerate() {
            if idx > last_user && m.role == Role::Tool && idx < keep_from {
                kept_messages.insert(0, m.clone());
            }
        }
    }

    SccOutput {
        state_message,
        kept_messages,
    }
}

/// Index of the first message to keep verbatim: the start of the last
/// `keep_last_turns` user turns.
fn keep_from_index(messages: &[Message], keep_last_turns: usize) -> usize {
    let user_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::User)
        .map(|(i, _)| i)
        .collect();
    if user_indices.len() <= keep_last_turns {
        return 0;
    }
    user_indices[user_indices.len() - keep_last_turns]
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    truncate_with_ellipsis(line, max_chars)
}

fn extract_rule_like_lines(messages: &[Message], code_path: bool) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in messages {
        for line in m.content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || !RULE_LIKE.is_match(trimmed) {
                continue;
            }
            if code_path && CONFIG_LIKE.is_match(trimmed) {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                out.push(trimmed.to_string());
            }
        }
    }
    out
}

fn build_talk_body(messages: &[Message], keep_from: usize) -> String {
    let mut out = String::new();

    let goal = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| first_line(&m.content, GOAL_LINE_CHARS))
        .unwrap_or_default();
    out.push_str(&format!("Goal: {goal}\n"));

    let constraints = extract_rule_like_lines(messages, false);
    out.push_str("Constraints (verbatim):\n");
    for c in &constraints {
        out.push_str(&format!("- {c}\n"));
    }

    out.push_str("Known facts:\n");
    for m in older_messages_of_role(messages, keep_from, Role::User)
        .take(MAX_KNOWN_FACTS)
    {
        out.push_str(&format!("- {}\n", first_line(&m.content, FACT_LINE_CHARS)));
    }

    out.push_str("Decisions/commitments:\n");
    for m in older_messages_of_role(messages, keep_from, Role::Assistant)
        .take(MAX_DECISIONS)
    {
        out.push_str(&format!("- {}\n", first_line(&m.content, FACT_LINE_CHARS)));
    }

    out.push_str("Open questions:\n- none recorded\n");
    out.push_str("Recent context kept verbatim below.");
    out
}

fn older_messages_of_role<'a>(
    messages: &'a [Message],
    keep_from: usize,
    role: Role,
) -> impl Iterator<Item = &'a Message> {
    messages[..keep_from.min(messages.len())]
        .iter()
        .filter(move |m| m.role == role)
}

fn build_code_body(messages: &[Message], keep_from: usize) -> String {
    let mut out = String::new();

    let task = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| first_line(&m.content, GOAL_LINE_CHARS))
        .unwrap_or_default();
    out.push_str(&format!("Task: {task}\n"));

    let mut constraints = extract_rule_like_lines(messages, true);
    let all_text: String = messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
    if ES_TARGET.is_match(&all_text) {
        if let Some(m) = ES_TARGET.find(&all_text) {
            constraints.push(format!("ES target: {}", m.as_str()));
        }
    }
    if OPTIONAL_CHAINING.is_match(&all_text) {
        constraints.push("optional chaining banned".to_string());
    }
    out.push_str("Constraints (rule-like only):\n");
    for c in &constraints {
        out.push_str(&format!("- {c}\n"));
    }

    out.push_str("Failing signals:\n");
    let signals = extract_failing_signals(messages);
    if let Some(latest) = signals.first() {
        out.push_str(&format!("Latest: {latest}\n"));
    }
    for s in signals.iter().skip(1).take(MAX_FAILING_SIGNALS) {
        out.push_str(&format!("- {s}\n"));
    }

    out.push_str("Repo context:\n");
    let files = extract_touched_files(messages);
    for f in files.iter().take(MAX_TOUCHED_FILES) {
        out.push_str(&format!("- {f}\n"));
    }
    out.push_str("- key symbols: (not resolved)\n");

    out
}

/// Latest failing signal first, then up to `MAX_FAILING_SIGNALS` deduped
/// earlier ones, parsed from tool messages in reverse chronological order.
fn extract_failing_signals(messages: &[Message]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in messages.iter().filter(|m| m.role == Role::Tool).rev() {
        for cap in ERROR_IN.captures_iter(&m.content) {
            let s = format!("{}:{}", &cap[1], &cap[2]);
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
        for mat in TS_ERROR.find_iter(&m.content) {
            let s = mat.as_str().to_string();
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
        for mat in STACK_FRAME.find_iter(&m.content) {
            let s = mat.as_str().trim().to_string();
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
    }
    out
}

fn extract_touched_files(messages: &[Message]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in messages {
        for mat in TOUCHED_FILE.find_iter(&m.content) {
            let s = mat.as_str().to_string();
            if seen.insert(s.clone()) {
                out.push(s);
            }
        }
    }
    out
}
