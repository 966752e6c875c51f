//! C4 Spectral Analyzer — computes λ₂ of the signed Laplacian,
//! contradiction energy, random-walk gap, heat-trace complexity, curvature
//! statistics and node novelty, then combines them into a stability index
//! and a REUSE/EXPAND/ASK_CLARIFY recommendation.

use crate::types::{EdgeType, InternalSignals, Recommendation, SignedGraph, SpectralResult};

const POWER_ITERATIONS: usize = 60;
const STABILITY_HIGH: f64 = 0.7;
const STABILITY_LOW: f64 = 0.3;

/// Rolling history of recent stability/contradiction observations, used to
/// adapt the REUSE/ASK_CLARIFY thresholds.
#[derive(Debug, Clone, Default)]
pub struct RollingHistory {
    pub avg_stability: Option<f64>,
    pub contradiction_trending_up: bool,
}

/// Dense symmetric adjacency matrix built from a [`SignedGraph`]'s edge list.
struct Adjacency {
    n: usize,
    w: Vec<f64>,
}

impl Adjacency {
    fn from_graph(graph: &SignedGraph) -> Self {
        let n = graph.n;
        let mut w = vec![0.0; n * n];
        for e in &graph.edges {
            if e.i < n && e.j < n && e.i != e.j {
                w[e.i * n + e.j] += e.weight;
                w[e.j * n + e.i] += e.weight;
            }
        }
        Self { n, w }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.w[i * self.n + j]
    }

    fn row_abs_sum(&self, i: usize) -> f64 {
        (0..self.n).map(|j| self.get(i, j).abs()).sum()
    }
}

/// `L = D - W` applied to vector `v`, where `D` is diag(row sums of |W|).
fn laplacian_apply(adj: &Adjacency, v: &[f64]) -> Vec<f64> {
    (0..adj.n)
        .map(|i| {
            let d = adj.row_abs_sum(i);
            let wv: f64 = (0..adj.n).map(|j| adj.get(i, j) * v[j]).sum();
            d * v[i] - wv
        })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn mean(a: &[f64]) -> f64 {
    if a.is_empty() {
        0.0
    } else {
        a.iter().sum::<f64>() / a.len() as f64
    }
}

/// Removes the component of `v` along the all-ones direction.
fn orthogonalize_to_ones(v: &mut [f64]) {
    let m = mean(v);
    for x in v.iter_mut() {
        *x -= m;
    }
}

fn normalize(v: &mut [f64]) {
    let n = norm(v);
    if n > 1e-12 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

/// Deterministic alternating ±1 starting vector.
fn alternating_seed(n: usize) -> Vec<f64> {
    (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect()
}

/// Power iteration with all-ones deflation for λ₂ of the signed Laplacian.
/// Shifts by the max diagonal entry so the largest-magnitude eigenvalue of
/// the shifted operator corresponds to the smallest eigenvalue of `L`
/// orthogonal to the constant vector, then recovers λ₂ via the Rayleigh
/// quotient on `L` directly.
fn estimate_lambda2(adj: &Adjacency) -> (f64, Vec<f64>) {
    let n = adj.n;
    if n <= 1 {
        return (0.0, vec![0.0; n]);
    }
    let shift: f64 = (0..n).map(|i| adj.row_abs_sum(i)).fold(0.0, f64::max) + 1.0;

    let mut v = alternating_seed(n);
    orthogonalize_to_ones(&mut v);
    normalize(&mut v);

    for _ in 0..POWER_ITERATIONS {
        let lv = laplacian_apply(adj, &v);
        let mut shifted: Vec<f64> = v.iter().zip(&lv).map(|(vi, lvi)| shift * vi - lvi).collect();
        orthogonalize_to_ones(&mut shifted);
        normalize(&mut shifted);
        v = shifted;
    }

    let lv = laplacian_apply(adj, &v);
    let rayleigh = dot(&v, &lv) / dot(&v, &v).max(1e-12);
    (rayleigh.max(0.0), v)
}

/// Row-stochastic transition matrix built from positive edges only; isolated
/// nodes get a self-loop.
fn random_walk_matrix(adj: &Adjacency) -> Vec<Vec<f64>> {
    let n = adj.n;
    let mut p = vec![vec![0.0; n]; n];
    for i in 0..n {
        let row_sum: f64 = (0..n).map(|j| adj.get(i, j).max(0.0)).sum();
        if row_sum <= 1e-12 {
            p[i][i] = 1.0;
        } else {
            for j in 0..n {
                p[i][j] = adj.get(i, j).max(0.0) / row_sum;
            }
        }
    }
    p
}

fn mat_vec(p: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    p.iter().map(|row| dot(row, v)).collect()
}

/// Power iteration on the random-walk matrix, deflated against the uniform
/// distribution, to estimate the second-largest eigenvalue magnitude.
fn estimate_rw_gap(adj: &Adjacency) -> f64 {
    let n = adj.n;
    if n <= 1 {
        return 1.0;
    }
    let p = random_walk_matrix(adj);
    let uniform = vec![1.0 / n as f64; n];

    let mut v = alternating_seed(n);
    orthogonalize_to_uniform(&mut v, &uniform);
    normalize(&mut v);

    let mut lambda = 0.0;
    for _ in 0..POWER_ITERATIONS {
        let mut pv = mat_vec(&p, &v);
        orthogonalize_to_uniform(&mut pv, &uniform);
        let n_pv = norm(&pv);
        if n_pv > 1e-12 {
            lambda = n_pv;
            for x in pv.iter_mut() {
                *x /= n_pv;
            }
        }
        v = pv;
    }
    clamp01(1.0 - lambda.abs())
}

fn orthogonalize_to_uniform(v: &mut [f64], uniform: &[f64]) {
    let proj = dot(v, uniform);
    for (x, u) in v.iter_mut().zip(uniform) {
        *x -= proj * u;
    }
}

/// Hutchinson estimator of Tr(exp(-tL)) using a 4-term truncated expansion
/// `I - tL + (tL)^2/2 - (tL)^3/6`, `k=8` deterministic ±1 probe vectors,
/// averaged over `t ∈ {0.5, 1.0}` and normalized into [0,1] over the
/// empirical range [0.5, 2.0].
fn estimate_heat_complexity(adj: &Adjacency) -> f64 {
    let n = adj.n;
    if n == 0 {
        return 0.0;
    }
    const PROBES: usize = 8;
    let probes = deterministic_probe_vectors(n, PROBES);

    let trace_for_t = |t: f64| -> f64 {
        let mut total = 0.0;
        for probe in &probes {
            let tl_v: Vec<f64> = laplacian_apply(adj, probe).iter().map(|x| x * t).collect();
            let tl2_v: Vec<f64> = laplacian_apply(adj, &tl_v).iter().map(|x| x * t).collect();
            let tl3_v: Vec<f64> = laplacian_apply(adj, &tl2_v).iter().map(|x| x * t).collect();
            let mut approx = vec![0.0; n];
            for i in 0..n {
                approx[i] = probe[i] - tl_v[i] + tl2_v[i] / 2.0 - tl3_v[i] / 6.0;
            }
            total += dot(probe, &approx);
        }
        total / PROBES as f64
    };

    let avg_trace = (trace_for_t(0.5) + trace_for_t(1.0)) / 2.0;
    let normalized = (avg_trace - 0.5) / (2.0 - 0.5);
    clamp01(normalized)
}

/// Deterministic ±1 probe vectors, one per Hadamard-like shifted pattern
/// (no RNG dependency — reproducibility matters more than statistical purity
/// at `k=8`).
fn deterministic_probe_vectors(n: usize, k: usize) -> Vec<Vec<f64>> {
    (0..k)
        .map(|p| {
            (0..n)
                .map(|i| if (i + p) % 2 == 0 { 1.0 } else { -1.0 })
                .collect()
        })
        .collect()
}

/// Simplified Forman-Ricci curvature per node: degree minus incident
/// |weight| mass minus a common-neighbor penalty.
fn curvature_per_node(adj: &Adjacency, graph: &SignedGraph) -> Vec<f64> {
    let n = adj.n;
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for e in &graph.edges {
        if e.i < n && e.j < n {
            neighbors[e.i].push(e.j);
            neighbors[e.j].push(e.i);
        }
    }
    (0..n)
        .map(|i| {
            let degree = neighbors[i].len() as f64;
            let weight_mass = adj.row_abs_sum(i);
            let penalty: f64 = neighbors[i]
                .iter()
                .map(|&j| {
                    let common = neighbors[i]
                        .iter()
                        .filter(|&&x| neighbors[j].contains(&x))
                        .count();
                    common as f64
                })
                .sum();
            degree - weight_mass - penalty
        })
        .collect()
}

fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() - 1) as f64 * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Per-node novelty: `1 - cosine(unit embedding, centroid of recent units)`.
fn novelty_per_node(embeddings: &[&[f32]]) -> Vec<f64> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }
    let dim = embeddings.iter().map(|e| e.len()).max().unwrap_or(0);
    if dim == 0 {
        return vec![0.0; n];
    }
    let mut centroid = vec![0.0_f64; dim];
    for e in embeddings {
        for (k, v) in e.iter().enumerate() {
            centroid[k] += *v as f64;
        }
    }
    for c in centroid.iter_mut() {
        *c /= n as f64;
    }
    embeddings
        .iter()
        .map(|e| {
            let dot_v: f64 = e.iter().zip(&centroid).map(|(x, c)| *x as f64 * c).sum();
            let norm_e: f64 = e.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            let norm_c: f64 = centroid.iter().map(|c| c.powi(2)).sum::<f64>().sqrt();
            if norm_e < 1e-12 || norm_c < 1e-12 {
                1.0
            } else {
                1.0 - (dot_v / (norm_e * norm_c))
            }
        })
        .collect()
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn contradiction_energy(graph: &SignedGraph) -> f64 {
    let mut neg_mass = 0.0;
    let mut total_mass = 0.0;
    for e in &graph.edges {
        total_mass += e.weight.abs();
        if e.edge_type == EdgeType::Contradiction || e.weight < 0.0 {
            neg_mass += e.weight.abs();
        }
    }
    if total_mass <= 1e-12 {
        0.0
    } else {
        clamp01(neg_mass / total_mass)
    }
}

/// Logistic combination of the spectral signals into a single [0,1] index.
/// Higher when λ₂ and the random-walk gap are high; lower when contradiction
/// energy, novelty, or very negative curvature dominate.
fn combine_stability(
    lambda2: f64,
    rw_gap: f64,
    contradiction: f64,
    curvature_mean: f64,
    mean_novelty: f64,
) -> f64 {
    let curvature_term = (-curvature_mean).max(0.0).min(5.0) / 5.0;
    let z = 2.2 * lambda2.min(1.0) + 1.8 * rw_gap - 2.5 * contradiction - 1.4 * mean_novelty
        - 1.0 * curvature_term;
    1.0 / (1.0 + (-z).exp())
}

fn recommend(
    stability: f64,
    contradiction: f64,
    curvature_min: f64,
    history: &RollingHistory,
) -> Recommendation {
    let mut t_high = STABILITY_HIGH;
    let mut t_low = STABILITY_LOW;
    if let Some(avg) = history.avg_stability {
        if avg < 0.5 {
            t_high += 0.05;
            t_low += 0.05;
        }
    }
    if history.contradiction_trending_up {
        t_high += 0.05;
    }

    if stability <= t_low || contradiction > 0.3 || curvature_min < -3.0 {
        Recommendation::AskClarify
    } else if stability >= t_high {
        Recommendation::Reuse
    } else {
        Recommendation::Expand
    }
}

/// Classifies node `i` as stable/unstable against the curvature/novelty
/// thresholds. Ambiguous nodes default to unstable.
fn classify_node(
    i: usize,
    adj: &Adjacency,
    curvature: f64,
    novelty: f64,
    eigen_entry: f64,
) -> bool {
    let has_strong_negative = (0..adj.n).any(|j| j != i && adj.get(i, j) < -0.5);
    let negative_count = (0..adj.n).filter(|&j| j != i && adj.get(i, j) < 0.0).count();

    let is_unstable = has_strong_negative
        || negative_count >= 2
        || curvature < -2.0
        || novelty > 0.7
        || eigen_entry.abs() > 0.4;
    if is_unstable {
        return true;
    }

    let is_stable =
        !has_strong_negative && novelty < 0.4 && curvature > -1.0 && eigen_entry.abs() < 0.3;
    !is_stable
}

/// Runs the full spectral analysis over `graph` (with per-unit embeddings
/// supplied in node order). Returns a zero-edge result with stability 0.5
/// and recommendation EXPAND if `n ≤ 1` or the edge set is empty.
pub fn analyze(
    graph: &SignedGraph,
    embeddings: &[&[f32]],
    history: &RollingHistory,
) -> SpectralResult {
    let n = graph.n;
    if n <= 1 || graph.edges.is_empty() {
        return SpectralResult {
            n_nodes: n,
            n_edges: graph.edges.len(),
            lambda2: 0.0,
            contradiction_energy: 0.0,
            stability_index: 0.5,
            recommendation: Recommendation::Expand,
            stable: Vec::new(),
            unstable: (0..n).collect(),
            signals: InternalSignals::default(),
        };
    }

    let adj = Adjacency::from_graph(graph);
    let (lambda2, eigenvector) = estimate_lambda2(&adj);
    let rw_gap = estimate_rw_gap(&adj);
    let heat_complexity = estimate_heat_complexity(&adj);
    let curvature = curvature_per_node(&adj, graph);
    let curvature_min = curvature.iter().cloned().fold(f64::INFINITY, f64::min);
    let curvature_p10 = percentile(&curvature, 0.10);
    let curvature_mean = mean(&curvature);
    let contradiction = contradiction_energy(graph);
    let novelty = novelty_per_node(embeddings);
    let mean_novelty = mean(&novelty);

    let stability = combine_stability(lambda2, rw_gap, contradiction, curvature_mean, mean_novelty);
    let recommendation = recommend(stability, contradiction, curvature_min, history);

    let mut stable = Vec::new();
    let mut unstable = Vec::new();
    for i in 0..n {
        let nov = novelty.get(i).copied().unwrap_or(0.5);
        let curv = curvature.get(i).copied().unwrap_or(0.0);
        let eig = eigenvector.get(i).copied().unwrap_or(0.0);
        if classify_node(i, &adj, curv, nov, eig) {
            unstable.push(i);
        } else {
            stable.push(i);
        }
    }

    SpectralResult {
        n_nodes: n,
        n_edges: graph.edges.len(),
        lambda2,
        contradiction_energy: contradiction,
        stability_index: stability,
        recommendation,
        stable,
        unstable,
        signals: InternalSignals {
            rw_gap,
            heat_complexity,
            curvature_min,
            curvature_p10,
            curvature_mean,
            mean_novelty,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Edge;

    fn graph_with(n: usize, edges: Vec<Edge>) -> SignedGraph {
        SignedGraph { n, edges }
    }

    #[test]
    fn empty_graph_returns_neutral_result() {
        let g = graph_with(0, Vec::new());
        let r = analyze(&g, &[], &RollingHistory::default());
        assert_eq!(r.stability_index, 0.5);
        assert_eq!(r.recommendation, Recommendation::Expand);
        assert!(r.unstable.is_empty());
    }

    #[test]
    fn single_node_returns_neutral_result() {
        let g = graph_with(1, Vec::new());
        let r = analyze(&g, &[&[1.0]], &RollingHistory::default());
        assert_eq!(r.recommendation, Recommendation::Expand);
    }

    #[test]
    fn stable_unstable_partition_is_total_and_disjoint() {
        let g = graph_with(
            4,
            vec![
                Edge { i: 0, j: 1, weight: 0.9, edge_type: EdgeType::Similarity },
                Edge { i: 1, j: 2, weight: 0.8, edge_type: EdgeType::Similarity },
                Edge { i: 2, j: 3, weight: -0.6, edge_type: EdgeType::Contradiction },
            ],
        );
        let embeds: Vec<Vec<f32>> = vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.1, 0.9],
            vec![0.0, 1.0],
        ];
        let refs: Vec<&[f32]> = embeds.iter().map(|v| v.as_slice()).collect();
        let r = analyze(&g, &refs, &RollingHistory::default());
        let mut all: Vec<usize> = r.stable.iter().chain(r.unstable.iter()).cloned().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3]);
        for s in &r.stable {
            assert!(!r.unstable.contains(s));
        }
    }

    #[test]
    fn contradiction_energy_and_stability_in_unit_range() {
        let g = graph_with(
            2,
            vec![Edge { i: 0, j: 1, weight: -0.8, edge_type: EdgeType::Contradiction }],
        );
        let embeds: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let refs: Vec<&[f32]> = embeds.iter().map(|v| v.as_slice()).collect();
        let r = analyze(&g, &refs, &RollingHistory::default());
        assert!((0.0..=1.0).contains(&r.contradiction_energy));
        assert!((0.0..=1.0).contains(&r.stability_index));
        assert!(r.contradiction_energy > 0.0);
    }

    #[test]
    fn lambda2_is_nonnegative() {
        let g = graph_with(
            3,
            vec![
                Edge { i: 0, j: 1, weight: 0.7, edge_type: EdgeType::Similarity },
                Edge { i: 1, j: 2, weight: 0.7, edge_type: EdgeType::Similarity },
            ],
        );
        let embeds: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![1.0, 0.0]];
        let refs: Vec<&[f32]> = embeds.iter().map(|v| v.as_slice()).collect();
        let r = analyze(&g, &refs, &RollingHistory::default());
        assert!(r.lambda2 >= 0.0);
    }

    #[test]
    fn high_contradiction_triggers_ask_clarify() {
        let g = graph_with(
            2,
            vec![Edge { i: 0, j: 1, weight: -1.0, edge_type: EdgeType::Contradiction }],
        );
        let embeds: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![-1.0, 0.0]];
        let refs: Vec<&[f32]> = embeds.iter().map(|v| v.as_slice()).collect();
        let r = analyze(&g, &refs, &RollingHistory::default());
        assert_eq!(r.recommendation, Recommendation::AskClarify);
    }
}
