//! Per-model token pricing.
use std::collections::HashMap;

use serde::Deserialize;

/// Tokens per pricing unit: prices are quoted per million tokens.
const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Built-in prices in USD per million tokens: (model, input, output).
const BUILTIN: &[(&str, f64, f64)] = &[
    ("claude-3-5-haiku", 0.8, 4.0),
    ("claude-3-5-sonnet", 3.0, 15.0),
    ("claude-3-opus", 15.0, 75.0),
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("o1", 15.0, 60.0),
    ("o1-mini", 3.0, 12.0),
];

/// USD per million tokens for one model.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct ModelPrice {
    /// Price of prompt tokens.
    pub input: f64,
    /// Price of completion tokens.
    pub output: f64,
}

/// Price lookup: config overrides first, then the built-in table.
#[derive(Clone, Debug, Default)]
pub struct PriceTable {
    /// Prices from `.marginalia.toml`, keyed by model name.
    overrides: HashMap<String, ModelPrice>,
}

impl PriceTable {
    /// Cost in USD of a completion. Unknown models cost nothing.
    #[must_use]
    #[allow(clippy::as_conversions, reason = "token counts stay far below f64 precision limits")]
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let Some(price) = self.price(model) else {
            return 0.0;
        };
        return (input_tokens as f64 * price.input + output_tokens as f64 * price.output)
            / TOKENS_PER_UNIT;
    }

    /// Price for `model`, if known.
    #[must_use]
    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        if let Some(price) = self.overrides.get(model) {
            return Some(*price);
        }
        return BUILTIN
            .iter()
            .find(|(name, _, _)| return *name == model)
            .map(|&(_, input, output)| return ModelPrice { input, output });
    }

    /// A table with the given overrides layered over the built-in prices.
    #[must_use]
    pub const fn with_overrides(overrides: HashMap<String, ModelPrice>) -> Self {
        return Self { overrides };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_model_is_priced() {
        let table = PriceTable::default();
        let cost = table.cost("gpt-4o", 1_000_000, 1_000_000);
        assert!((cost - 12.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_free() {
        assert!(PriceTable::default().cost("mystery-model", 500, 500).abs() < f64::EPSILON);
    }

    #[test]
    fn overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("gpt-4o".to_string(), ModelPrice { input: 1.0, output: 1.0 });
        overrides.insert("local".to_string(), ModelPrice { input: 0.5, output: 0.5 });
        let table = PriceTable::with_overrides(overrides);
        assert!((table.cost("gpt-4o", 1_000_000, 0) - 1.0).abs() < 1e-9);
        assert!((table.cost("local", 2_000_000, 2_000_000) - 2.0).abs() < 1e-9);
    }
}
