//! C14 Quality Guard + Retry — runs caller-supplied regex
//! checks against the provider response and picks the better of two
//! attempts when a retry with relaxed budgets was needed.

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct QualityCheckResult {
    pub passed: bool,
    pub failures: Vec<String>,
}

/// Tests each pattern against `response_text`. An invalid regex counts as a
/// failure rather than panicking the request.
pub fn run_checks(response_text: &str, patterns: &[String]) -> QualityCheckResult {
    let mut failures = Vec::new();
    for pattern in patterns {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(response_text) {
                    failures.push(pattern.clone());
                }
            }
            Err(err) => {
                warn!(pattern, %err, "invalid quality-guard pattern");
                failures.push(pattern.clone());
            }
        }
    }
    QualityCheckResult {
        passed: failures.is_empty(),
        failures,
    }
}

pub struct Attempt {
    pub response_text: String,
    pub check_result: QualityCheckResult,
}

/// Picks the better of the first attempt and its retry: by pass-status
/// first, then by fewer failures.
pub fn choose_better(first: Attempt, retry: Attempt) -> Attempt {
    if first.check_result.passed && !retry.check_result.passed {
        return first;
    }
    if !first.check_result.passed && retry.check_result.passed {
        return retry;
    }
    if retry.check_result.failures.len() < first.check_result.failures.len() {
        retry
    } else {
        first
    }
}

/// Relaxed policy knobs applied to the single retry: talk
/// disables compaction/trim, code additionally disables patch-mode, and the
/// output token budget is raised.
#[derive(Debug, Clone, Copy)]
pub struct RelaxedBudgets {
    pub compaction_aggressive: bool,
    pub trim_aggressive: bool,
    pub patch_mode: bool,
    pub max_output_tokens: u32,
}

impl RelaxedBudgets {
    pub fn relax(base_max_output_tokens: u32) -> Self {
        Self {
            compaction_aggressive: false,
            trim_aggressive: false,
            patch_mode: false,
            max_output_tokens: base_max_output_tokens.saturating_mul(2),
        }
    }
}
