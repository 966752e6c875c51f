//! Data model shared across the pipeline

use serde::{Deserialize, Serialize};

/// Which trimming policy branch a request follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Path {
    Talk,
    Code,
}

/// Closed role enum — message content is always a plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Kind inferred for a semantic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Fact,
    Constraint,
    Explanation,
    Code,
    Patch,
}

/// Semantic Unit. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticUnit {
    pub id: String,
    pub kind: UnitKind,
    pub text: String,
    pub role: Role,
    pub embedding: Option<Vec<f32>>,
    pub stability_score: f32,
    pub created_at_turn: u32,
}

/// Edge type in the signed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Similarity,
    Contradiction,
    Dependency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    pub i: usize,
    pub j: usize,
    pub weight: f64,
    pub edge_type: EdgeType,
}

/// Signed weighted graph over semantic units.
#[derive(Debug, Clone, Default)]
pub struct SignedGraph {
    pub n: usize,
    pub edges: Vec<Edge>,
}

/// Recommendation emitted by the spectral analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Reuse,
    Expand,
    AskClarify,
}

/// Internal-only signal bundle feeding the stability index. Never exposed
/// in the public optimization report.
#[derive(Debug, Clone, Default)]
pub struct InternalSignals {
    pub rw_gap: f64,
    pub heat_complexity: f64,
    pub curvature_min: f64,
    pub curvature_p10: f64,
    pub curvature_mean: f64,
    pub mean_novelty: f64,
}

/// Spectral Result.
#[derive(Debug, Clone)]
pub struct SpectralResult {
    pub n_nodes: usize,
    pub n_edges: usize,
    pub lambda2: f64,
    pub contradiction_energy: f64,
    pub stability_index: f64,
    pub recommendation: Recommendation,
    pub stable: Vec<usize>,
    pub unstable: Vec<usize>,
    pub signals: InternalSignals,
}

/// Compression budgets.
#[derive(Debug, Clone)]
pub struct Budgets {
    pub keep_last_turns: usize,
    pub max_refpack_entries: usize,
    pub max_state_chars: usize,
    pub retain_tool_logs: bool,
    pub state_compression_level: f64,
    pub phrasebook_aggressiveness: f64,
    pub codemap_detail_level: f64,
}

/// Public usage info returned to the client.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub estimated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SavingsType {
    Estimated,
    Verified,
    ShadowVerified,
}

#[derive(Debug, Clone, Serialize)]
pub struct Savings {
    pub tokens_saved: i64,
    pub pct_saved: f64,
    pub cost_saved_usd: f64,
    pub confidence_band: ConfidenceBand,
    pub savings_type: SavingsType,
}

/// Customer-safe optimization report. Internal spectral signals
/// never appear here.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub layers: LayerFlags,
    pub tokens: TokenReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverted: Option<bool>,
    pub spectral: PublicSpectral,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LayerFlags {
    pub refpack: bool,
    pub phrasebook: bool,
    pub codemap: bool,
    pub semantic_cache: bool,
    pub cache_hit: bool,
    pub context_compiler: bool,
    pub profit_gated: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenReport {
    pub estimated: bool,
    pub input_before: u32,
    pub input_after: u32,
    pub saved: i64,
    pub pct_saved: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PublicSpectral {
    pub n_nodes: usize,
    pub n_edges: usize,
    pub stability_index: f64,
    pub lambda2: f64,
}

/// Savings ledger record. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavingsLedgerRecord {
    pub workload_key: String,
    pub path: Path,
    pub provider: String,
    pub model: String,
    pub optimization_level: u8,
    pub baseline_tokens: u32,
    pub optimized_tokens: u32,
    pub baseline_cost: f64,
    pub optimized_cost: f64,
    pub confidence: f64,
    pub savings_type: SavingsType,
    pub created_at: i64,
}
