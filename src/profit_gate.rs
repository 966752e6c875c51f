//! C10 Profit Gates + token estimator — wraps each transform
//! step so its output is only kept when it demonstrably saves tokens.

use crate::types::Message;
use crate::units::UnitizerPath;

/// Coarse `chars / 4` token estimator — the core never tokenizes for real
///.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as f64 / 4.0).ceil() as u32
}

pub fn estimate_message_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[derive(Debug, Clone, Copy)]
pub struct GateThresholds {
    pub min_pct: f64,
    pub min_abs: u32,
}

impl GateThresholds {
    pub fn for_path(path: UnitizerPath) -> Self {
        match path {
            UnitizerPath::Talk => Self { min_pct: 0.03, min_abs: 40 },
            UnitizerPath::Code => Self { min_pct: 0.02, min_abs: 60 },
        }
    }
}

/// Decides whether a transform's output should replace its input: the
/// candidate must not exceed the baseline and must save at least
/// `min_pct` and `min_abs` tokens.
pub fn gate(before: &[Message], after: &[Message], thresholds: GateThresholds) -> bool {
    let before_tokens = estimate_message_tokens(before);
    let after_tokens = estimate_message_tokens(after);
    if after_tokens > before_tokens {
        return false;
    }
    let saved = before_tokens.saturating_sub(after_tokens);
    let pct_saved = if before_tokens == 0 {
        0.0
    } else {
        saved as f64 / before_tokens as f64
    };
    pct_saved >= thresholds.min_pct && saved >= thresholds.min_abs
}

/// Runs a transform step through its profit gate: returns the transformed
/// messages if they pass, otherwise the original (pre-step) messages.
pub fn gated_step<F>(path: UnitizerPath, before: Vec<Message>, transform: F) -> (Vec<Message>, bool)
where
    F: FnOnce(&[Message]) -> Vec<Message>,
{
    let after = transform(&before);
    let thresholds = GateThresholds::for_path(path);
    if gate(&before, &after, thresholds) {
        (after, true)
    } else {
        (before, false)
    }
}
