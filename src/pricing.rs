//! Per-model $/1M-token pricing table. Used to turn token usage into a
//! `cost_usd` figure for the public response and the savings ledger.

const DEFAULT_INPUT_PRICE_PER_M: f64 = 15.0;
const DEFAULT_OUTPUT_PRICE_PER_M: f64 = 60.0;

struct ModelPrice {
    model_prefix: &'static str,
    input_per_m: f64,
    output_per_m: f64,
}

/// Ordered most-specific-prefix-first; the first matching prefix wins.
const PRICES: &[ModelPrice] = &[
    ModelPrice { model_prefix: "gpt-5.2", input_per_m: 15.0, output_per_m: 60.0 },
    ModelPrice { model_prefix: "gpt-4o-mini", input_per_m: 0.15, output_per_m: 0.60 },
    ModelPrice { model_prefix: "gpt-4o", input_per_m: 2.50, output_per_m: 10.0 },
    ModelPrice { model_prefix: "gpt-4", input_per_m: 10.0, output_per_m: 30.0 },
    ModelPrice { model_prefix: "deepseek-reasoner", input_per_m: 0.55, output_per_m: 2.19 },
    ModelPrice { model_prefix: "deepseek-chat", input_per_m: 0.27, output_per_m: 1.10 },
];

fn price_for(model: &str) -> (f64, f64) {
    PRICES
        .iter()
        .find(|p| model.starts_with(p.model_prefix))
        .map(|p| (p.input_per_m, p.output_per_m))
        .unwrap_or((DEFAULT_INPUT_PRICE_PER_M, DEFAULT_OUTPUT_PRICE_PER_M))
}

/// Dollar cost of `input_tokens`/`output_tokens` at `model`'s rate.
pub fn cost_usd(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let (input_per_m, output_per_m) = price_for(model);
    (input_tokens as f64 / 1_000_000.0) * input_per_m
        + (output_tokens as f64 / 1_000_000.0) * output_per_m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_table_price() {
        let cost = cost_usd("gpt-4o-mini", 1_000_000, 0);
        assert!((cost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let cost = cost_usd("some-future-model", 1_000_000, 0);
        assert!((cost - DEFAULT_INPUT_PRICE_PER_M).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(cost_usd("gpt-4o", 0, 0), 0.0);
    }
}
