//! C5 Budget Planner — maps spectral signals to compression
//! budgets for the downstream SCC/STE/CodeMap stages.

use spectyra_core::MAX_STATE_CHARS_HARD_CAP;

use crate::types::{Budgets, SpectralResult};

const LAMBDA2_LOW_THRESHOLD: f64 = 0.12;
const RETAIN_TOOL_LOGS_THRESHOLD: f64 = 0.15;

/// Caller-supplied coarse override, 0 (minimal) through 4 (max compression).
pub fn plan_budgets(spectral: &SpectralResult, optimization_level: u8) -> Budgets {
    let lambda2 = spectral.lambda2;
    let stability = spectral.stability_index;
    let novelty = spectral.signals.mean_novelty;
    let contradiction = spectral.contradiction_energy;

    let keep_last_turns = if lambda2 < LAMBDA2_LOW_THRESHOLD { 2 } else { 4 };
    let max_state_chars = if lambda2 < LAMBDA2_LOW_THRESHOLD { 1800 } else { 3200 };
    let retain_tool_logs = lambda2 > RETAIN_TOOL_LOGS_THRESHOLD;

    let compression = (0.5 + 0.5 * stability - 0.3 * novelty).clamp(0.3, 1.0);
    let phrasebook_aggressiveness = 0.9 * compression;
    let codemap_detail_level = (1.0 - 0.4 * stability + 0.3 * contradiction).clamp(0.4, 1.0);
    let max_refpack_entries = (3.0 + 9.0 * stability).round() as usize;

    let mut budgets = Budgets {
        keep_last_turns,
        max_refpack_entries: max_refpack_entries.max(3),
        max_state_chars: max_state_chars.min(MAX_STATE_CHARS_HARD_CAP),
        retain_tool_logs,
        state_compression_level: compression,
        phrasebook_aggressiveness,
        codemap_detail_level,
    };

    apply_level_override(&mut budgets, optimization_level);
    budgets
}

/// Coarse pre-override: lower levels bias toward keeping more context, higher
/// levels bias toward aggressive compression, before the spectral signals
/// refine it further.
fn apply_level_override(budgets: &mut Budgets, level: u8) {
    match level {
        0 => {
            budgets.keep_last_turns = budgets.keep_last_turns.max(6);
            budgets.state_compression_level = budgets.state_compression_level.min(0.4);
            budgets.phrasebook_aggressiveness = budgets.phrasebook_aggressiveness.min(0.3);
        }
        1 => {
            budgets.keep_last_turns = budgets.keep_last_turns.max(4);
            budgets.state_compression_level = budgets.state_compression_level.min(0.6);
        }
        2 => {}
        3 => {
            budgets.keep_last_turns = budgets.keep_last_turns.min(3);
            budgets.state_compression_level = budgets.state_compression_level.max(0.7);
        }
        _ => {
            budgets.keep_last_turns = budgets.keep_last_turns.min(2);
            budgets.state_compression_level = budgets.state_compression_level.max(0.85);
            budgets.codemap_detail_level = budgets.codemap_detail_level.min(0.6);
        }
    }
    budgets.max_state_chars = budgets.max_state_chars.min(MAX_STATE_CHARS_HARD_CAP);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InternalSignals, Recommendation};

    fn spectral(lambda2: f64, stability: f64, contradiction: f64, novelty: f64) -> SpectralResult {
        SpectralResult {
            n_nodes: 4,
            n_edges: 3,
            lambda2,
            contradiction_energy: contradiction,
            stability_index: stability,
            recommendation: Recommendation::Expand,
            stable: vec![0, 1],
            unstable: vec![2, 3],
            signals: InternalSignals {
                mean_novelty: novelty,
                ..Default::default()
            },
        }
    }

    #[test]
    fn low_lambda2_yields_short_turns_and_small_state() {
        let b = plan_budgets(&spectral(0.05, 0.5, 0.1, 0.3), 2);
        assert_eq!(b.keep_last_turns, 2);
        assert_eq!(b.max_state_chars, 1800);
        assert!(!b.retain_tool_logs);
    }

    #[test]
    fn high_lambda2_yields_longer_turns_and_larger_state() {
        let b = plan_budgets(&spectral(0.5, 0.5, 0.1, 0.3), 2);
        assert_eq!(b.keep_last_turns, 4);
        assert_eq!(b.max_state_chars, 3200);
        assert!(b.retain_tool_logs);
    }

    #[test]
    fn max_state_chars_never_exceeds_hard_cap() {
        let b = plan_budgets(&spectral(0.5, 0.9, 0.0, 0.0), 0);
        assert!(b.max_state_chars <= MAX_STATE_CHARS_HARD_CAP);
    }

    #[test]
    fn compression_fields_are_clamped() {
        let b = plan_budgets(&spectral(0.9, 1.0, 0.0, 0.0), 4);
        assert!((0.3..=1.0).contains(&b.state_compression_level));
        assert!((0.4..=1.0).contains(&b.codemap_detail_level));
        assert!(b.max_refpack_entries >= 3);
    }

    #[test]
    fn level_zero_favors_keeping_more_context() {
        let aggressive = plan_budgets(&spectral(0.5, 0.9, 0.0, 0.0), 4);
        let conservative = plan_budgets(&spectral(0.5, 0.9, 0.0, 0.0), 0);
        assert!(conservative.keep_last_turns >= aggressive.keep_last_turns);
    }
}
