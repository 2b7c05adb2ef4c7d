//! Model price table used for cost estimates.
//!
//! Prices are USD per million tokens. Lookups match the longest known
//! prefix of the model identifier so dated snapshots resolve to their family.

/// Price of one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Model identifier prefix.
    pub prefix: &'static str,
    /// USD per million prompt tokens.
    pub input_per_million: f64,
    /// USD per million completion tokens.
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(prefix: &'static str, input: f64, output: f64) -> Self {
        Self {
            prefix,
            input_per_million: input,
            output_per_million: output,
        }
    }

    /// Cost of a call in USD.
    #[must_use]
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) * self.input_per_million
            + f64::from(output_tokens) * self.output_per_million)
            / 1_000_000.0
    }

    /// Looks up the price for a model.
    #[must_use]
    pub fn for_model(model: &str) -> Option<Self> {
        PRICES
            .iter()
            .filter(|p| model.starts_with(p.prefix))
            .max_by_key(|p| p.prefix.len())
            .copied()
    }
}

const PRICES: &[ModelPricing] = &[
    // Anthropic
    ModelPricing::new("claude-opus-4", 15.0, 75.0),
    ModelPricing::new("claude-sonnet-4", 3.0, 15.0),
    ModelPricing::new("claude-3-5-haiku", 0.8, 4.0),
    // OpenAI
    ModelPricing::new("gpt-4o", 2.5, 10.0),
    ModelPricing::new("gpt-4o-mini", 0.15, 0.6),
    // Google
    ModelPricing::new("gemini-2.0-flash", 0.1, 0.4),
    ModelPricing::new("gemini-1.5-pro", 1.25, 5.0),
    // DeepSeek
    ModelPricing::new("deepseek-chat", 0.27, 1.1),
    ModelPricing::new("deepseek-reasoner", 0.55, 2.19),
];

/// Estimated cost in USD. Unknown models are priced at zero.
#[must_use]
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    ModelPricing::for_model(model).map_or(0.0, |p| p.cost(input_tokens, output_tokens))
}
