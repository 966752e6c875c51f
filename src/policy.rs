//! C9 Policy Layer — path-specific trimming flags applied after
//! the SCC (and optional STE/CodeMap) stages.

use crate::fence_guard::{segment, Segment};
use crate::types::{Budgets, Message, Role};
use crate::units::UnitizerPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimLevel {
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyFlags {
    pub compaction_aggressive: bool,
    pub trim_aggressive: bool,
    pub patch_mode: bool,
    pub trim_level: TrimLevel,
}

const AGGRESSIVE_THRESHOLD: f64 = 0.7;

/// Applies path-specific policy. When the SCC has already compiled a state
/// message, no bulk additions are made here — only the output trim level is
/// set. Code slicing (keeping the most relevant fenced block in the user's
/// last turn) only runs when the SCC was *not* applied.
pub fn apply_policy(
    path: UnitizerPath,
    scc_applied: bool,
    patch_mode_requested: bool,
    budgets: &Budgets,
    messages: Vec<Message>,
) -> (Vec<Message>, PolicyFlags) {
    let trim_level = if budgets.state_compression_level >= AGGRESSIVE_THRESHOLD {
        TrimLevel::Aggressive
    } else {
        TrimLevel::Moderate
    };

    let patch_mode = path == UnitizerPath::Code && patch_mode_requested;

    let mut flags = PolicyFlags {
        compaction_aggressive: scc_applied && trim_level == TrimLevel::Aggressive,
        trim_aggressive: trim_level == TrimLevel::Aggressive,
        patch_mode,
        trim_level,
    };

    let mut out = messages;
    if path == UnitizerPath::Code && !scc_applied {
        out = slice_most_relevant_code(out);
    }
    if patch_mode {
        out.push(Message::new(
            Role::System,
            "Emit a unified diff plus at most 3 bullets.".to_string(),
        ));
    } else {
        flags.patch_mode = false;
    }

    (out, flags)
}

/// Keeps only the largest fenced code block in the last user message,
/// dropping the rest — a cheap proxy for "most relevant" when the SCC
/// hasn't already compacted history.
fn slice_most_relevant_code(mut messages: Vec<Message>) -> Vec<Message> {
    let Some(last_user_idx) = messages.iter().rposition(|m| m.role == Role::User) else {
        return messages;
    };
    let content = &messages[last_user_idx].content;
    let segs = segment(content);
    let code_count = segs.iter().filter(|s| matches!(s, Segment::Code(_))).count();
    if code_count <= 1 {
        return messages;
    }

    let largest_idx = segs
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            Segment::Code(c) => Some((i, c.chars().count())),
            Segment::Text(_) => None,
        })
        .max_by_key(|(_, len)| *len)
        .map(|(i, _)| i);

    let rebuilt: String = segs
        .into_iter()
        .enumerate()
        .map(|(i, seg)| match seg {
            Segment::Text(t) => t,
            Segment::Code(c) => {
                if Some(i) == largest_idx {
                    c
                } else {
                    String::new()
                }
            }
        })
        .collect();

    messages[last_user_idx].content = rebuilt;
    messages
}
