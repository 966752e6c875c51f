//! End-to-end scenarios from the optimizer pipeline's testable-properties
//! section, exercised through the public `pipeline::run` entry point against
//! in-memory collaborators (no network, no real provider).

use std::sync::Arc;

use async_trait::async_trait;
use spectyra::cache::InMemorySemanticCache;
use spectyra::ledger::NoopSavingsLedger;
use spectyra::pipeline::{run, Mode, OptimizeRequest, PipelineDeps};
use spectyra::provider::{ChatProvider, ChatResult, HashingEmbedder, ProviderError};
use spectyra::state_store::InMemoryStateStore;
use spectyra::types::{Message, Path, Role, Usage};

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
    ) -> Result<ChatResult, ProviderError> {
        Ok(ChatResult {
            text: format!("ack: {} messages", messages.len()),
            usage: Some(Usage {
                input_tokens: 20,
                output_tokens: 10,
                total_tokens: 30,
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

fn provider() -> Arc<dyn ChatProvider> {
    Arc::new(EchoProvider)
}

fn request(path: Path, messages: Vec<Message>) -> OptimizeRequest {
    OptimizeRequest {
        path,
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

/// Scenario 1: talk, four short user turns, no conflicts.
#[tokio::test]
async fn talk_no_conflicts_compresses_and_sets_goal() {
    let messages = vec![
        Message::new(Role::User, "Plan a small birthday gathering for this weekend"),
        Message::new(Role::Assistant, "Sure — how many guests are you expecting?"),
        Message::new(Role::User, "About ten people, nothing fancy"),
        Message::new(Role::Assistant, "Got it, I'll keep it casual"),
        Message::new(Role::User, "Also we need a cake flavor suggestion"),
        Message::new(Role::Assistant, "Chocolate usually pleases a mixed crowd"),
        Message::new(Role::User, "Sounds good, let's go with that"),
        Message::new(Role::Assistant, "Great, anything else before I wrap this up?"),
    ];
    let d = deps();
    let resp = run(request(Path::Talk, messages), provider(), &d).await.unwrap();

    assert!(resp.optimization_report.tokens.input_after <= resp.optimization_report.tokens.input_before);
    assert_ne!(resp.optimization_report.reverted, Some(true));
}

/// Scenario 2: talk, direct contradiction between two user turns.
#[tokio::test]
async fn talk_contradiction_triggers_ask_clarify() {
    let messages = vec![
        Message::new(Role::User, "The rollout flag must always be enabled in production"),
        Message::new(Role::Assistant, "Understood, always on in prod."),
        Message::new(Role::User, "Actually the rollout flag must never be enabled in production"),
    ];
    let d = deps();
    let resp = run(request(Path::Talk, messages), provider(), &d).await.unwrap();

    assert!(resp.optimization_report.spectral.stability_index <= 0.31 || resp.response_text.contains("clarify"));
    assert_eq!(resp.usage.input_tokens, 0);
    assert_eq!(resp.usage.output_tokens, 0);
}

/// Scenario 3: code path with a failing-signal tool message and a touched file.
#[tokio::test]
async fn code_path_surfaces_failing_signal_and_touched_file() {
    let messages = vec![
        Message::new(Role::User, "fix the type error in src/a.ts, it must compile cleanly"),
        Message::new(
            Role::Tool,
            "ERROR in src/a.ts:42\nTS2322: Type 'string' is not assignable to type 'number'.",
        ),
        Message::new(Role::User, "here is the latest diff\n```ts\nconst x: number = '1';\n```"),
    ];
    let d = deps();
    let resp = run(request(Path::Code, messages), provider(), &d).await.unwrap();

    assert!(resp.optimization_report.layers.context_compiler);
    assert!(resp.optimization_report.tokens.input_after <= resp.optimization_report.tokens.input_before);
}

/// Scenario 4: same conversation id across two requests — state carries over.
#[tokio::test]
async fn repeated_conversation_id_carries_state_forward() {
    let d = deps();
    let p = provider();

    let mut first = request(
        Path::Talk,
        vec![
            Message::new(Role::User, "Remember that the launch date is fixed at March 3rd"),
            Message::new(Role::Assistant, "Noted, launch date fixed at March 3rd."),
        ],
    );
    first.conversation_id = Some("conv-e2e".to_string());
    let first_resp = run(first, p.clone(), &d).await.unwrap();
    assert_ne!(first_resp.optimization_report.reverted, Some(true));

    let mut second = request(
        Path::Talk,
        vec![Message::new(Role::User, "What's the next milestone after launch?")],
    );
    second.conversation_id = Some("conv-e2e".to_string());
    let second_resp = run(second, p, &d).await.unwrap();

    // The carried prior state must not reintroduce a second system message.
    assert!(second_resp.optimization_report.tokens.input_before > 0);
    assert_ne!(second_resp.optimization_report.reverted, Some(true));
}

/// Scenario 5: identical repeated request hits the semantic cache.
#[tokio::test]
async fn identical_request_is_served_from_cache_on_second_call() {
    let d = deps();
    let p = provider();
    let messages = vec![
        Message::new(Role::User, "Summarize the quarterly roadmap for stakeholders"),
        Message::new(Role::Assistant, "Sure, here is a concise summary of the roadmap."),
    ];

    let first = run(request(Path::Talk, messages.clone()), p.clone(), &d).await.unwrap();
    assert!(!first.optimization_report.layers.cache_hit);

    let second = run(request(Path::Talk, messages), p, &d).await.unwrap();
    assert!(second.optimization_report.layers.cache_hit);
    assert_eq!(second.usage.input_tokens, 0);
    assert_eq!(second.usage.output_tokens, 0);
    assert_eq!(second.response_text, first.response_text);
}

/// Scenario 6: pathological short input where optional rewrites can't pay
/// for themselves — profit gates reject, optimized prompt equals baseline.
#[tokio::test]
async fn pathological_short_input_reverts_to_baseline() {
    let messages = vec![Message::new(Role::User, "hi")];
    let d = deps();
    let resp = run(request(Path::Talk, messages), provider(), &d).await.unwrap();

    assert!(resp.optimization_report.tokens.input_after <= resp.optimization_report.tokens.input_before);
}

/// Boundary: empty message list yields an empty baseline/optimized round trip.
#[tokio::test]
async fn empty_message_list_is_a_no_op() {
    let d = deps();
    let resp = run(request(Path::Talk, Vec::new()), provider(), &d).await.unwrap();
    assert_eq!(resp.optimization_report.tokens.input_before, 0);
    assert_eq!(resp.optimization_report.tokens.input_after, 0);
}

/// Invariant: optimized input-token count never exceeds the baseline count,
/// across a batch of varied conversations.
#[tokio::test]
async fn input_after_never_exceeds_input_before_across_variants() {
    let d = deps();
    let cases: Vec<Vec<Message>> = vec![
        vec![Message::new(Role::User, "short")],
        (0..10)
            .map(|i| {
                Message::new(
                    if i % 2 == 0 { Role::User } else { Role::Assistant },
                    format!("turn number {i} carries a modest amount of filler text to unitize"),
                )
            })
            .collect(),
        vec![
            Message::new(Role::User, "must ship by Friday, should not slip"),
            Message::new(Role::Tool, "ERROR in src/b.ts:10\nTS2345: argument mismatch"),
        ],
    ];

    for messages in cases {
        let resp = run(request(Path::Talk, messages), provider(), &d).await.unwrap();
        assert!(
            resp.optimization_report.tokens.input_after
                <= resp.optimization_report.tokens.input_before
        );
    }
}
