//! C7 Structured Token Encoder — optional layer that replaces
//! repeated phrases with short aliases plus a legend. Skipped whenever the
//! SCC has already run (decided by the orchestrator, not this module).

use std::collections::HashMap;

use spectyra_core::truncate_with_ellipsis;

use crate::fence_guard::rewrite_non_code;
use crate::types::{Message, Role};

const MIN_WORDS: usize = 3;
const MAX_WORDS: usize = 8;
const MIN_OCCURRENCES: usize = 3;
const MIN_PHRASE_CHARS: usize = 18;
const MAX_PHRASES: usize = 5;
const MAX_LEGEND_CHARS: usize = 60;

pub struct SteOutput {
    pub legend_message: Option<Message>,
    pub messages: Vec<Message>,
}

/// Finds repeated phrases across `messages`' non-code prose and aliases
/// them, emitting a legend system message when any alias was applied.
pub fn encode(messages: &[Message]) -> SteOutput {
    let phrases = select_phrases(messages);
    if phrases.is_empty() {
        return SteOutput {
            legend_message: None,
            messages: messages.to_vec(),
        };
    }

    let mut legend = String::new();
    let rewritten: Vec<Message> = messages
        .iter()
        .map(|m| {
            if m.role == Role::System {
                return m.clone();
            }
            let content = rewrite_non_code(&m.content, |text| apply_aliases(text, &phrases));
            Message::new(m.role, content)
        })
        .collect();

    for (idx, phrase) in phrases.iter().enumerate() {
        let alias = format!("P{}", idx + 1);
        let entry = truncate_with_ellipsis(phrase, MAX_LEGEND_CHARS);
        legend.push_str(&format!("{alias}|{entry}\n"));
    }

    SteOutput {
        legend_message: Some(Message::new(Role::System, legend.trim_end().to_string())),
        messages: rewritten,
    }
}

fn apply_aliases(text: &str, phrases: &[String]) -> String {
    let mut out = text.to_string();
    for (idx, phrase) in phrases.iter().enumerate() {
        let alias = format!("\u{27e6}P{}\u{27e7}", idx + 1);
        out = out.replace(phrase.as_str(), &alias);
    }
    out
}

/// Counts 3-8 word n-grams across all non-system, non-code text and returns
/// up to [`MAX_PHRASES`] candidates ranked by occurrence count, longest
/// match preferred on ties.
fn select_phrases(messages: &[Message]) -> Vec<String> {
    let corpus: String = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| rewrite_non_code(&m.content, |t| t.to_string()))
        .collect::<Vec<_>>()
        .join("\n");

    let words: Vec<&str> = corpus.split_whitespace().collect();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for n in MIN_WORDS..=MAX_WORDS.min(words.len()) {
        for window in words.windows(n) {
            let phrase = window.join(" ");
            if phrase.chars().count() < MIN_PHRASE_CHARS {
                continue;
            }
            *counts.entry(phrase).or_insert(0) += 1;
        }
    }

    let mut candidates: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, c)| *c >= MIN_OCCURRENCES)
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.len().cmp(&a.0.len())));

    let mut selected: Vec<String> = Vec::new();
    for (phrase, _) in candidates {
        if selected.iter().any(|s: &String| s.contains(&phrase) || phrase.contains(s.as_str())) {
            continue;
        }
        selected.push(phrase);
        if selected.len() >= MAX_PHRASES {
            break;
        }
    }
    selected
}
