//! C11 Final Size Guard — the last checkpoint before a prompt
//! leaves the pipeline. Reverts to the baseline if the candidate somehow
//! exceeds it.

use crate::profit_gate::estimate_message_tokens;
use crate::types::Message;

pub struct SizeGuardResult {
    pub messages: Vec<Message>,
    pub reverted: bool,
    pub input_before: u32,
    pub input_after: u32,
}

/// Compares the candidate prompt's estimated token count against the
/// baseline; discards the candidate and falls back to baseline on any
/// regression.
pub fn guard(baseline: &[Message], candidate: Vec<Message>) -> SizeGuardResult {
    let input_before = estimate_message_tokens(baseline);
    let candidate_tokens = estimate_message_tokens(&candidate);

    if candidate_tokens > input_before {
        SizeGuardResult {
            messages: baseline.to_vec(),
            reverted: true,
            input_before,
            input_after: input_before,
        }
    } else {
        SizeGuardResult {
            messages: candidate,
            reverted: false,
            input_before,
            input_after: candidate_tokens,
        }
    }
}
