//! C3 Graph Builder — builds a signed weighted graph over
//! semantic units from their embeddings, roles, kinds and turn indices.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::types::{Edge, EdgeType, SignedGraph, UnitKind};
use crate::units::UnitizerPath;

const SIMILARITY_EDGE_MIN: f64 = 0.55;
const CONTRADICTION_THRESHOLD: f64 = 0.15;
const MAX_SIMILARITY_WEIGHT: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct GraphUnit<'a> {
    pub text: &'a str,
    pub kind: UnitKind,
    pub embedding: &'a [f32],
    pub turn: u32,
}

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{4,}").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static NEGATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(not|never|no|n't|without)\b").unwrap());
static PAST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(was|were|had|did|previously|before)\b").unwrap());
static FUTURE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(will|shall|going to|next|later)\b").unwrap());

/// Small fixed lexicon of semantically opposed term pairs.
const OPPOSED_PAIRS: &[(&str, &str)] = &[
    ("always", "never"),
    ("include", "exclude"),
    ("increase", "decrease"),
    ("enable", "disable"),
    ("allow", "forbid"),
    ("add", "remove"),
    ("start", "stop"),
    ("require", "optional"),
];

/// Builds the signed graph over `units` for the given path.
pub fn build_graph(path: UnitizerPath, units: &[GraphUnit<'_>]) -> SignedGraph {
    let n = units.len();
    let mut edges = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            if let Some(e) = similarity_edge(path, &units[i], &units[j], i, j) {
                edges.push(e);
            }
            if let Some(e) = contradiction_edge(path, &units[i], &units[j], i, j) {
                edges.push(e);
            }
            if let Some(e) = dependency_edge(&units[i], &units[j], i, j) {
                edges.push(e);
            }
        }
    }

    SignedGraph { n, edges }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn similarity_edge(
    path: UnitizerPath,
    a: &GraphUnit<'_>,
    b: &GraphUnit<'_>,
    i: usize,
    j: usize,
) -> Option<Edge> {
    let cos = cosine(a.embedding, b.embedding);
    if cos < SIMILARITY_EDGE_MIN {
        return None;
    }
    let base_w = if path == UnitizerPath::Code { 1.0 } else { 0.8 };
    let mut weight = base_w * cos;

    if path == UnitizerPath::Code
        && is_code_like(a.kind)
        && is_code_like(b.kind)
    {
        weight += 0.15;
    }

    let turn_gap = (a.turn as i64 - b.turn as i64).unsigned_abs();
    weight += match turn_gap {
        0 => 0.15,
        1 => 0.08,
        2 | 3 => 0.03,
        _ => 0.0,
    };

    if a.kind == b.kind {
        weight += match a.kind {
            UnitKind::Constraint => 0.12,
            UnitKind::Fact => 0.08,
            UnitKind::Explanation => 0.05,
            _ => 0.0,
        };
    }

    let weight = weight.min(MAX_SIMILARITY_WEIGHT);
    Some(Edge {
        i,
        j,
        weight,
        edge_type: EdgeType::Similarity,
    })
}

fn is_code_like(kind: UnitKind) -> bool {
    matches!(kind, UnitKind::Code | UnitKind::Patch)
}

fn shared_content_word(a: &str, b: &str) -> bool {
    let words_a: std::collections::HashSet<String> =
        WORD.find_iter(a).map(|m| m.as_str().to_lowercase()).collect();
    WORD.find_iter(b)
        .any(|m| words_a.contains(&m.as_str().to_lowercase()))
}

fn numeric_conflict_score(a: &str, b: &str) -> f64 {
    let nums_a: Vec<f64> = NUMBER
        .find_iter(a)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let nums_b: Vec<f64> = NUMBER
        .find_iter(b)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let mut max_rel_diff: f64 = 0.0;
    for x in &nums_a {
        for y in &nums_b {
            if *x == 0.0 && *y == 0.0 {
                continue;
            }
            let denom = x.abs().max(y.abs());
            if denom == 0.0 {
                continue;
            }
            let rel = (x - y).abs() / denom;
            if rel > 0.15 {
                max_rel_diff = max_rel_diff.max(rel);
            }
        }
    }
    if max_rel_diff > 0.0 {
        (max_rel_diff).min(1.0) * 0.4
    } else {
        0.0
    }
}

fn negation_asymmetry(a: &str, b: &str) -> bool {
    NEGATION.is_match(a) != NEGATION.is_match(b)
}

fn semantic_opposition(a: &str, b: &str) -> bool {
    let al = a.to_lowercase();
    let bl = b.to_lowercase();
    OPPOSED_PAIRS.iter().any(|(x, y)| {
        (al.contains(x) && bl.contains(y)) || (al.contains(y) && bl.contains(x))
    })
}

fn temporal_conflict(a: &str, b: &str) -> bool {
    let a_past = PAST_MARKER.is_match(a);
    let a_future = FUTURE_MARKER.is_match(a);
    let b_past = PAST_MARKER.is_match(b);
    let b_future = FUTURE_MARKER.is_match(b);
    let opposed_markers = (a_past && b_future) || (a_future && b_past);
    if !opposed_markers {
        return false;
    }
    let overlap = {
        let words_a: std::collections::HashSet<String> =
            WORD.find_iter(a).map(|m| m.as_str().to_lowercase()).collect();
        WORD.find_iter(b)
            .filter(|m| words_a.contains(&m.as_str().to_lowercase()))
            .count()
    };
    overlap >= 2
}

fn contradiction_edge(
    path: UnitizerPath,
    a: &GraphUnit<'_>,
    b: &GraphUnit<'_>,
    i: usize,
    j: usize,
) -> Option<Edge> {
    if path == UnitizerPath::Code && is_code_like(a.kind) && is_code_like(b.kind) {
        return None;
    }
    if !shared_content_word(a.text, b.text) {
        return None;
    }

    let mut score = numeric_conflict_score(a.text, b.text);
    if negation_asymmetry(a.text, b.text) {
        score += 0.3;
    }
    if semantic_opposition(a.text, b.text) {
        score += 0.35;
    }
    if temporal_conflict(a.text, b.text) {
        score += 0.25;
    }

    if score <= CONTRADICTION_THRESHOLD {
        return None;
    }

    const CONTRADICTION_EDGE_WEIGHT: f64 = 1.0;
    let weight = -(CONTRADICTION_EDGE_WEIGHT.abs()).min((0.3_f64).max(score * CONTRADICTION_EDGE_WEIGHT.abs()));
    Some(Edge {
        i,
        j,
        weight,
        edge_type: EdgeType::Contradiction,
    })
}

/// Path-specific dependency edges: code units that share an identifier-like
/// token are treated as mutually dependent. Directed in concept, stored
/// symmetrically as a single undirected edge.
fn dependency_edge(a: &GraphUnit<'_>, b: &GraphUnit<'_>, i: usize, j: usize) -> Option<Edge> {
    if !(is_code_like(a.kind) && is_code_like(b.kind)) {
        return None;
    }
    if a.kind != UnitKind::Code || b.kind != UnitKind::Code {
        return None;
    }
    let mut idents: HashMap<&str, u8> = HashMap::new();
    for m in WORD.find_iter(a.text) {
        idents.insert(m.as_str(), 1);
    }
    let shared = WORD.find_iter(b.text).any(|m| idents.contains_key(m.as_str()));
    if !shared {
        return None;
    }
    Some(Edge {
        i,
        j,
        weight: 0.2,
        edge_type: EdgeType::Dependency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit<'a>(text: &'a str, kind: UnitKind, embedding: &'a [f32], turn: u32) -> GraphUnit<'a> {
        GraphUnit {
            text,
            kind,
            embedding,
            turn,
        }
    }

    #[test]
    fn no_edges_below_similarity_threshold() {
        let e1 = [1.0_f32, 0.0];
        let e2 = [0.0_f32, 1.0];
        let units = vec![
            unit("alpha bravo charlie delta", UnitKind::Fact, &e1, 0),
            unit("echo foxtrot golf hotel", UnitKind::Fact, &e2, 1),
        ];
        let g = build_graph(UnitizerPath::Talk, &units);
        assert!(g.edges.iter().all(|e| e.edge_type != EdgeType::Similarity));
    }

    #[test]
    fn similarity_edge_emitted_for_close_embeddings() {
        let e1 = [1.0_f32, 0.0, 0.0];
        let e2 = [0.99_f32, 0.01, 0.0];
        let units = vec![
            unit("the quick brown fox jumps", UnitKind::Fact, &e1, 0),
            unit("the quick brown fox runs", UnitKind::Fact, &e2, 0),
        ];
        let g = build_graph(UnitizerPath::Talk, &units);
        assert!(g.edges.iter().any(|e| e.edge_type == EdgeType::Similarity && e.weight > 0.0));
    }

    #[test]
    fn contradiction_edge_for_negation_asymmetry() {
        let e1 = [1.0_f32, 0.0];
        let e2 = [1.0_f32, 0.0];
        let units = vec![
            unit("the deployment must always run", UnitKind::Constraint, &e1, 0),
            unit("the deployment must never run", UnitKind::Constraint, &e2, 1),
        ];
        let g = build_graph(UnitizerPath::Talk, &units);
        assert!(g
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Contradiction && e.weight < 0.0));
    }

    #[test]
    fn contradiction_weight_bounded() {
        let e1 = [1.0_f32, 0.0];
        let e2 = [1.0_f32, 0.0];
        let units = vec![
            unit(
                "always enable increase the timeout value not never",
                UnitKind::Constraint,
                &e1,
                0,
            ),
            unit(
                "never disable decrease the timeout value without",
                UnitKind::Constraint,
                &e2,
                1,
            ),
        ];
        let g = build_graph(UnitizerPath::Talk, &units);
        for e in g.edges.iter().filter(|e| e.edge_type == EdgeType::Contradiction) {
            assert!(e.weight >= -1.0);
        }
    }

    #[test]
    fn code_path_skips_contradiction_between_two_code_units() {
        let e1 = [1.0_f32, 0.0];
        let e2 = [1.0_f32, 0.0];
        let units = vec![
            unit("fn add() { always increase }", UnitKind::Code, &e1, 0),
            unit("fn add() { never decrease }", UnitKind::Code, &e2, 1),
        ];
        let g = build_graph(UnitizerPath::Code, &units);
        assert!(g.edges.iter().all(|e| e.edge_type != EdgeType::Contradiction));
    }

    #[test]
    fn all_edges_have_valid_distinct_indices() {
        let e1 = [1.0_f32, 0.0];
        let e2 = [0.99_f32, 0.01];
        let e3 = [0.98_f32, 0.02];
        let units = vec![
            unit("alpha bravo charlie delta must enable", UnitKind::Constraint, &e1, 0),
            unit("alpha bravo charlie delta must disable", UnitKind::Constraint, &e2, 1),
            unit("alpha bravo charlie delta must enable", UnitKind::Constraint, &e3, 2),
        ];
        let g = build_graph(UnitizerPath::Talk, &units);
        for e in &g.edges {
            assert_ne!(e.i, e.j);
            assert!(e.i < g.n && e.j < g.n);
        }
    }
}
