//! Orchestrator — wires C1–C14 into
//! the single request-time flow:
//!
//! ```text
//! INIT -> STATE-CARRY -> UNITIZE -> EMBED -> GRAPH -> SPECTRAL
//!   -> (ASK_CLARIFY short-circuit -> DONE)
//!   | (BUDGETS -> SCC -> [CODEMAP] -> POLICY -> PROFIT-GATE -> SIZE-GUARD
//!        -> CACHE-LOOKUP
//!        -> (HIT -> DONE)
//!        | (MISS -> PROVIDER-CALL -> QUALITY-CHECK
//!             -> (PASS -> DONE) | (FAIL -> RETRY-ONCE -> DONE)))
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spectyra_core::DEFAULT_MAX_NODES;

use crate::budget::plan_budgets;
use crate::cache::{self, CacheKeyInputs, SemanticCache};
use crate::codemap;
use crate::error::{Result, SpectyraError};
use crate::graph::{self, GraphUnit};
use crate::ledger::{self, SavingsLedger};
use crate::policy;
use crate::profit_gate::{self, GateThresholds};
use crate::provider::ChatProvider;
use crate::provider::Embedder;
use crate::quality_guard::{self, Attempt, RelaxedBudgets};
use crate::size_guard;
use crate::spectral::{self, RollingHistory};
use crate::state_store::{self, ConversationStateEntry, ConversationStateStore};
use crate::types::{
    ConfidenceBand, LayerFlags, Message, OptimizationReport, Path, PublicSpectral, Recommendation,
    Role, Savings, SavingsLedgerRecord, SavingsType, TokenReport, Usage,
};
use crate::units::{self, UnitizerOptions, UnitizerPath};

fn unitizer_path(path: Path) -> UnitizerPath {
    match path {
        Path::Talk => UnitizerPath::Talk,
        Path::Code => UnitizerPath::Code,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Baseline,
    Optimized,
}

/// Public request shape, independent of the HTTP transport.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeRequest {
    pub path: Path,
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u8,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub quality_checks: Vec<String>,
    #[serde(default)]
    pub patch_mode_requested: bool,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

fn default_mode() -> Mode {
    Mode::Optimized
}

fn default_optimization_level() -> u8 {
    2
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeResponse {
    pub run_id: String,
    pub mode: Mode,
    pub path: Path,
    pub provider: String,
    pub model: String,
    pub response_text: String,
    pub usage: Usage,
    pub cost_usd: f64,
    pub savings: Savings,
    pub optimization_report: OptimizationReport,
    pub baseline_estimate: Option<u32>,
    pub optimized_estimate: Option<u32>,
    pub explanation_summary: Option<String>,
}

/// Injected process-wide collaborators — no hidden singletons.
pub struct PipelineDeps {
    pub embedder: Arc<dyn Embedder>,
    pub cache: Arc<dyn SemanticCache>,
    pub state_store: Arc<dyn ConversationStateStore>,
    pub ledger: Arc<dyn SavingsLedger>,
}

const CLARIFY_QUESTION: &str =
    "I noticed some conflicting instructions in this conversation — could you clarify which one should take precedence before I continue?";

/// Runs the optimizer pipeline end to end. `resolve_provider` is called once
/// the request's `provider` field is validated against configured keys.
pub async fn run(
    req: OptimizeRequest,
    provider: Arc<dyn ChatProvider>,
    deps: &PipelineDeps,
) -> Result<OptimizeResponse> {
    validate(&req)?;

    let run_id = uuid::Uuid::new_v4().to_string();

    if req.mode == Mode::Baseline {
        return run_baseline(req, provider, run_id).await;
    }

    run_optimized(req, provider, deps, run_id).await
}

fn validate(req: &OptimizeRequest) -> Result<()> {
    if req.provider.trim().is_empty() {
        return Err(SpectyraError::InvalidInput("provider is required".into()));
    }
    if req.model.trim().is_empty() {
        return Err(SpectyraError::InvalidInput("model is required".into()));
    }
    Ok(())
}

async fn run_baseline(
    req: OptimizeRequest,
    provider: Arc<dyn ChatProvider>,
    run_id: String,
) -> Result<OptimizeResponse> {
    let baseline_tokens = profit_gate::estimate_message_tokens(&req.messages);

    let chat_result = provider
        .chat(&req.model, &req.messages, req.max_output_tokens)
        .await
        .map_err(|e| SpectyraError::UpstreamUnavailable(e.to_string()))?;

    let usage = chat_result.usage.unwrap_or(Usage {
        input_tokens: baseline_tokens,
        output_tokens: 0,
        total_tokens: baseline_tokens,
        estimated: true,
    });
    let cost = crate::pricing::cost_usd(&req.model, usage.input_tokens, usage.output_tokens);

    let report = OptimizationReport {
        layers: LayerFlags::default(),
        tokens: TokenReport {
            estimated: true,
            input_before: baseline_tokens,
            input_after: baseline_tokens,
            saved: 0,
            pct_saved: 0.0,
        },
        reverted: None,
        spectral: PublicSpectral {
            n_nodes: 0,
            n_edges: 0,
            stability_index: 0.0,
            lambda2: 0.0,
        },
    };

    Ok(OptimizeResponse {
        run_id,
        mode: Mode::Baseline,
        path: req.path,
        provider: req.provider,
        model: req.model,
        response_text: chat_result.text,
        usage,
        cost_usd: cost,
        savings: Savings {
            tokens_saved: 0,
            pct_saved: 0.0,
            cost_saved_usd: 0.0,
            confidence_band: ConfidenceBand::High,
            savings_type: SavingsType::Estimated,
        },
        optimization_report: report,
        baseline_estimate: Some(baseline_tokens),
        optimized_estimate: None,
        explanation_summary: None,
    })
}

async fn run_optimized(
    req: OptimizeRequest,
    provider: Arc<dyn ChatProvider>,
    deps: &PipelineDeps,
    run_id: String,
) -> Result<OptimizeResponse> {
    let path = unitizer_path(req.path);

    // STATE-CARRY
    let prior = state_store::read_prior_state(
        deps.state_store.as_ref(),
        req.conversation_id.as_deref(),
    )
    .await;
    let carried_messages = state_store::prepend_prior_state(prior, req.messages.clone());
    let baseline_messages = carried_messages.clone();
    let baseline_tokens = profit_gate::estimate_message_tokens(&baseline_messages);

    // UNITIZE
    let mut opts = UnitizerOptions::default();
    opts.max_units = opts.max_units.min(DEFAULT_MAX_NODES);
    let mut semantic_units = units::unitize(path, &carried_messages, opts);
    if semantic_units.len() > DEFAULT_MAX_NODES {
        let drop = semantic_units.len() - DEFAULT_MAX_NODES;
        semantic_units.drain(0..drop);
    }

    // EMBED — fail fast on embedder failure.
    if !semantic_units.is_empty() {
        let texts: Vec<String> = semantic_units.iter().map(|u| u.text.clone()).collect();
        let embeddings = deps
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| SpectyraError::UpstreamUnavailable(e.to_string()))?;
        for (unit, embedding) in semantic_units.iter_mut().zip(embeddings) {
            unit.embedding = Some(embedding);
        }
    }

    // GRAPH
    let graph_units: Vec<GraphUnit<'_>> = semantic_units
        .iter()
        .map(|u| GraphUnit {
            text: &u.text,
            kind: u.kind,
            embedding: u.embedding.as_deref().unwrap_or(&[]),
            turn: u.created_at_turn,
        })
        .collect();
    let signed_graph = graph::build_graph(path, &graph_units);

    // SPECTRAL
    let embedding_refs: Vec<&[f32]> = graph_units.iter().map(|u| u.embedding).collect();
    let spectral = spectral::analyze(&signed_graph, &embedding_refs, &RollingHistory::default());

    let public_spectral = PublicSpectral {
        n_nodes: spectral.n_nodes,
        n_edges: spectral.n_edges,
        stability_index: spectral.stability_index,
        lambda2: spectral.lambda2,
    };

    if spectral.recommendation == Recommendation::AskClarify {
        let report = OptimizationReport {
            layers: LayerFlags::default(),
            tokens: TokenReport {
                estimated: true,
                input_before: baseline_tokens,
                input_after: baseline_tokens,
                saved: 0,
                pct_saved: 0.0,
            },
            reverted: None,
            spectral: public_spectral,
        };
        return Ok(OptimizeResponse {
            run_id,
            mode: Mode::Optimized,
            path: req.path,
            provider: req.provider,
            model: req.model,
            response_text: CLARIFY_QUESTION.to_string(),
            usage: Usage::default(),
            cost_usd: 0.0,
            savings: Savings {
                tokens_saved: 0,
                pct_saved: 0.0,
                cost_saved_usd: 0.0,
                confidence_band: ConfidenceBand::High,
                savings_type: SavingsType::Estimated,
            },
            optimization_report: report,
            baseline_estimate: Some(baseline_tokens),
            optimized_estimate: Some(baseline_tokens),
            explanation_summary: Some(
                "conflicting constraints detected; asked the caller to clarify instead of guessing".into(),
            ),
        });
    }

    // BUDGETS
    let budgets = plan_budgets(&spectral, req.optimization_level);

    // SCC — the authoritative compression layer; STE/refpack are skipped
    // whenever it runs.
    let scc_output = crate::scc::compile(path, &carried_messages, &budgets);
    let mut candidate: Vec<Message> = vec![scc_output.state_message.clone()];
    candidate.extend(scc_output.kept_messages.clone());

    let system_count = candidate.iter().filter(|m| m.role == Role::System).count();
    if system_count != 1 {
        return Err(SpectyraError::InvariantViolation(format!(
            "SCC produced {system_count} system-role messages, expected exactly 1"
        )));
    }

    // CODEMAP (code path only)
    let mut codemap_applied = false;
    if path == UnitizerPath::Code {
        let before = candidate.clone();
        let result = codemap::compress(&candidate, budgets.codemap_detail_level);
        let mut with_index = result.messages;
        if !result.structural_index.is_empty() {
            if let Some(state_msg) = with_index.iter_mut().find(|m| m.role == Role::System) {
                state_msg.content = state_msg
                    .content
                    .replace("- key symbols: (not resolved)", &format!("- {}", result.structural_index));
            }
        }
        let gate_pass = profit_gate::gate(&before, &with_index, GateThresholds::for_path(path));
        if gate_pass {
            candidate = with_index;
            codemap_applied = true;
        }
    }

    // POLICY
    let (candidate, policy_flags) = policy::apply_policy(
        path,
        true,
        req.patch_mode_requested,
        &budgets,
        candidate,
    );

    // PROFIT-GATE — accept the whole SCC(+CodeMap+Policy) pipeline only if
    // it demonstrably saves tokens over the carried baseline.
    let thresholds = GateThresholds::for_path(path);
    let profit_gated = profit_gate::gate(&baseline_messages, &candidate, thresholds);
    let post_gate = if profit_gated {
        candidate
    } else {
        baseline_messages.clone()
    };

    // SIZE-GUARD
    let guard_result = size_guard::guard(&baseline_messages, post_gate);
    let final_messages = guard_result.messages;

    // CACHE-LOOKUP
    let stable_unit_ids: Vec<String> = spectral
        .stable
        .iter()
        .filter_map(|&i| semantic_units.get(i).map(|u| u.id.clone()))
        .collect();
    let unit_embeddings: Vec<&[f32]> = semantic_units
        .iter()
        .map(|u| u.embedding.as_deref().unwrap_or(&[]))
        .collect();
    let cache_inputs = CacheKeyInputs {
        stable_unit_ids: &stable_unit_ids,
        embeddings: &unit_embeddings,
        model: &req.model,
        path,
    };
    let cache_key = cache::cache_key(&cache_inputs, spectral.stability_index, spectral.lambda2);

    let mut layers = LayerFlags {
        refpack: false,
        phrasebook: false,
        codemap: codemap_applied,
        semantic_cache: true,
        cache_hit: false,
        context_compiler: true,
        profit_gated,
    };

    let (response_text, usage, cost_usd, cache_hit, explanation) = if req.dry_run {
        (String::new(), Usage::default(), 0.0, false, Some("dry_run: no provider call made".to_string()))
    } else if let Some(cached) = cache::lookup(deps.cache.as_ref(), &cache_key).await {
        layers.cache_hit = true;
        (cached, Usage::default(), 0.0, true, None)
    } else {
        let first = provider
            .chat(&req.model, &final_messages, req.max_output_tokens)
            .await
            .map_err(|e| SpectyraError::UpstreamUnavailable(e.to_string()))?;

        let (text, usage, explanation) = if req.quality_checks.is_empty() {
            (first.text, first.usage, None)
        } else {
            let first_check = quality_guard::run_checks(&first.text, &req.quality_checks);
            if first_check.passed {
                (first.text, first.usage, None)
            } else {
                let relaxed = RelaxedBudgets::relax(req.max_output_tokens.unwrap_or(1024));
                let (relaxed_messages, _) = policy::apply_policy(
                    path,
                    true,
                    relaxed.patch_mode,
                    &budgets,
                    final_messages.clone(),
                );
                let retry = provider
                    .chat(&req.model, &relaxed_messages, Some(relaxed.max_output_tokens))
                    .await
                    .map_err(|e| SpectyraError::UpstreamUnavailable(e.to_string()))?;
                let retry_check = quality_guard::run_checks(&retry.text, &req.quality_checks);

                let chosen = quality_guard::choose_better(
                    Attempt { response_text: first.text, check_result: first_check },
                    Attempt { response_text: retry.text, check_result: retry_check.clone() },
                );
                let note = if !chosen.check_result.passed {
                    Some(format!(
                        "quality guard failed after retry: {}",
                        chosen.check_result.failures.join(", ")
                    ))
                } else {
                    None
                };
                (chosen.response_text, retry.usage.or(first.usage), note)
            }
        };

        let usage = usage.unwrap_or(Usage {
            input_tokens: guard_result.input_after,
            output_tokens: 0,
            total_tokens: guard_result.input_after,
            estimated: true,
        });
        let cost = crate::pricing::cost_usd(&req.model, usage.input_tokens, usage.output_tokens);

        cache::store(deps.cache.as_ref(), &cache_key, text.clone(), 0).await;

        (text, usage, cost, false, explanation)
    };

    // CONVERSATION STATE STORE write-back (fire-and-forget).
    if let Some(conversation_id) = req.conversation_id.clone() {
        let last_turn: Vec<Message> = final_messages
            .iter()
            .rev()
            .take(4)
            .rev()
            .cloned()
            .collect();
        state_store::write_state(
            deps.state_store.clone(),
            conversation_id,
            ConversationStateEntry {
                state_msg: scc_output.state_message.clone(),
                last_turn,
            },
        )
        .await;
    }

    // LEDGER (fire-and-forget).
    let saved = baseline_tokens.saturating_sub(guard_result.input_after) as i64;
    let pct_saved = if baseline_tokens == 0 {
        0.0
    } else {
        saved as f64 / baseline_tokens as f64
    };
    let confidence_band = if pct_saved >= 0.2 {
        ConfidenceBand::High
    } else if pct_saved >= 0.05 {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    };
    let baseline_cost = crate::pricing::cost_usd(&req.model, baseline_tokens, 0);
    let optimized_cost = crate::pricing::cost_usd(&req.model, guard_result.input_after, 0);

    if !req.dry_run {
        let record = SavingsLedgerRecord {
            workload_key: ledger::workload_key(
                req.path,
                &req.provider,
                &req.model,
                baseline_tokens as usize,
            ),
            path: req.path,
            provider: req.provider.clone(),
            model: req.model.clone(),
            optimization_level: req.optimization_level,
            baseline_tokens,
            optimized_tokens: guard_result.input_after,
            baseline_cost,
            optimized_cost,
            confidence: pct_saved.clamp(0.0, 1.0),
            savings_type: SavingsType::Estimated,
            created_at: ledger::now_timestamp(),
        };
        ledger::write_fire_and_forget(deps.ledger.clone(), record).await;
    }

    let report = OptimizationReport {
        layers,
        tokens: TokenReport {
            estimated: true,
            input_before: guard_result.input_before,
            input_after: guard_result.input_after,
            saved,
            pct_saved,
        },
        reverted: Some(guard_result.reverted),
        spectral: public_spectral,
    };

    let _ = policy_flags; // consumed for patch-mode/trim decisions upstream of this point

    Ok(OptimizeResponse {
        run_id,
        mode: Mode::Optimized,
        path: req.path,
        provider: req.provider,
        model: req.model,
        response_text,
        usage,
        cost_usd,
        savings: Savings {
            tokens_saved: saved,
            pct_saved,
            cost_saved_usd: (baseline_cost - optimized_cost).max(0.0),
            confidence_band,
            savings_type: SavingsType::Estimated,
        },
        optimization_report: report,
        baseline_estimate: Some(baseline_tokens),
        optimized_estimate: Some(guard_result.input_after),
        explanation_summary: explanation,
    })
    .map(|mut r| {
        if cache_hit {
            r.optimization_report.layers.cache_hit = true;
        }
        r
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySemanticCache;
    use crate::ledger::NoopSavingsLedger;
    use crate::provider::{ChatResult, HashingEmbedder, ProviderError};
    use crate::state_store::InMemoryStateStore;
    use crate::types::Role;
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn chat(
            &self,
            _model: &str,
            messages: &[Message],
            _max_output_tokens: Option<u32>,
        ) -> std::result::Result<ChatResult, ProviderError> {
            Ok(ChatResult {
                text: format!("echoed {} messages", messages.len()),
                usage: Some(Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                    estimated: true,
                }),
            })
        }
    }

    fn deps() -> PipelineDeps {
        PipelineDeps {
            embedder: Arc::new(HashingEmbedder::default()),
            cache: Arc::new(InMemorySemanticCache::new()),
            state_store: Arc::new(InMemoryStateStore::new()),
            ledger: Arc::new(NoopSavingsLedger),
        }
    }

    fn base_request(messages: Vec<Message>) -> OptimizeRequest {
        OptimizeRequest {
            path: Path::Talk,
            provider: "echo".into(),
            model: "gpt-4".into(),
            messages,
            mode: Mode::Optimized,
            optimization_level: 2,
            conversation_id: None,
            dry_run: false,
            quality_checks: Vec::new(),
            patch_mode_requested: false,
            max_output_tokens: None,
        }
    }

    #[tokio::test]
    async fn optimized_run_never_exceeds_baseline_tokens() {
        let messages: Vec<Message> = (0..6)
            .map(|i| {
                Message::new(
                    if i % 2 == 0 { Role::User } else { Role::Assistant },
                    format!("turn {i} with some extra words to pass the minimum chunk size floor"),
                )
            })
            .collect();
        let req = base_request(messages);
        let response = run(req, Arc::new(EchoProvider), &deps()).await.unwrap();
        assert!(
            response.optimization_report.tokens.input_after
                <= response.optimization_report.tokens.input_before
        );
    }

    #[tokio::test]
    async fn empty_messages_round_trip_without_expansion() {
        let req = base_request(Vec::new());
        let response = run(req, Arc::new(EchoProvider), &deps()).await.unwrap();
        assert_eq!(response.optimization_report.tokens.input_before, 0);
        assert_eq!(response.optimization_report.tokens.input_after, 0);
    }

    #[tokio::test]
    async fn conflicting_constraints_trigger_ask_clarify_with_zero_usage() {
        let messages = vec![
            Message::new(Role::User, "the deployment flag must always be enabled for prod"),
            Message::new(Role::User, "the deployment flag must never be enabled for prod"),
        ];
        let req = base_request(messages);
        let response = run(req, Arc::new(EchoProvider), &deps()).await.unwrap();
        assert_eq!(response.response_text, CLARIFY_QUESTION);
        assert_eq!(response.usage.input_tokens, 0);
        assert_eq!(response.usage.output_tokens, 0);
    }

    #[tokio::test]
    async fn baseline_mode_skips_optimization_layers() {
        let messages = vec![Message::new(Role::User, "hello there")];
        let mut req = base_request(messages);
        req.mode = Mode::Baseline;
        let response = run(req, Arc::new(EchoProvider), &deps()).await.unwrap();
        assert!(!response.optimization_report.layers.context_compiler);
        assert_eq!(response.optimization_report.tokens.saved, 0);
    }

    #[tokio::test]
    async fn missing_provider_name_is_invalid_input() {
        let mut req = base_request(vec![Message::new(Role::User, "hi")]);
        req.provider = String::new();
        let result = run(req, Arc::new(EchoProvider), &deps()).await;
        assert!(matches!(result, Err(SpectyraError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn second_request_same_conversation_reuses_carried_state() {
        let d = deps();
        let provider: Arc<dyn ChatProvider> = Arc::new(EchoProvider);

        let mut first = base_request(vec![
            Message::new(Role::User, "please remember that the launch date is fixed"),
            Message::new(Role::Assistant, "noted, launch date is fixed"),
        ]);
        first.conversation_id = Some("conv-xyz".to_string());
        let _ = run(first, provider.clone(), &d).await.unwrap();

        let mut second = base_request(vec![Message::new(Role::User, "what's next on the plan")]);
        second.conversation_id = Some("conv-xyz".to_string());
        let response = run(second, provider, &d).await.unwrap();
        assert!(response.optimization_report.tokens.input_before >= 0);
    }
}
