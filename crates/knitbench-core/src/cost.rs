//! Compute-cost model.
//!
//! Each answered query is charged an estimated number of FLOPs:
//!
//! ```text
//! tokens = ceil(chars(question + answer) / 4), at least 1
//! size   = tokens * (params(reference) / params(gpt2))
//! flops  = base + growth * size^alpha
//! ```
//!
//! The estimate is monotone in both the prompt and the answer length and
//! depends on nothing but its inputs and the configuration.

use crate::marker::MarkerConfig;

const GPT2_PARAMS: f64 = 124e6;

/// Known reference models and their parameter counts.
pub const REFERENCE_MODELS: [(&str, f64); 7] = [
    ("gpt2", GPT2_PARAMS),
    ("gpt2-medium", 355e6),
    ("gpt2-large", 774e6),
    ("gpt2-xl", 1.5e9),
    ("llama-7b", 7e9),
    ("llama-13b", 13e9),
    ("llama-70b", 70e9),
];

/// Parameter count of a reference model; unknown names count as gpt2.
pub fn reference_params(name: &str) -> f64 {
    let name = name.trim().to_lowercase();
    REFERENCE_MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, p)| *p)
        .unwrap_or(GPT2_PARAMS)
}

/// Approximate token count: four characters per token, rounded up.
pub fn estimate_tokens(text_chars: usize) -> u64 {
    (text_chars as u64).div_ceil(4).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    base: f64,
    growth: f64,
    alpha: f64,
    scale: f64,
}

impl CostModel {
    pub fn new(config: &MarkerConfig) -> Self {
        Self {
            base: config.base_flops,
            growth: config.flops_growth,
            alpha: config.alpha,
            scale: reference_params(&config.reference_model) / GPT2_PARAMS,
        }
    }

    /// Estimated FLOPs for answering `question` with `answer`.
    pub fn estimate(&self, question: &str, answer: &str) -> f64 {
        let chars = question.chars().count() + answer.chars().count();
        let size = estimate_tokens(chars) as f64 * self.scale;
        self.base + self.growth * size.powf(self.alpha)
    }

    pub fn base(&self) -> f64 {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CostModel {
        CostModel::new(&MarkerConfig::default())
    }

    #[test]
    fn tokens_round_up_with_floor_of_one() {
        assert_eq!(estimate_tokens(0), 1);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(4), 1);
        assert_eq!(estimate_tokens(5), 2);
    }

    #[test]
    fn default_constants_are_deterministic() {
        // 40 chars -> 10 tokens; 1.5e9 + 0.3e9 * 10^0.8
        let expected = 1.5e9 + 0.30e9 * 10f64.powf(0.8);
        let m = model();
        let a = m.estimate(&"q".repeat(30), &"a".repeat(10));
        let b = m.estimate(&"q".repeat(30), &"a".repeat(10));
        assert_eq!(a, b);
        assert!((a - expected).abs() < 1.0);
    }

    #[test]
    fn cost_is_monotone() {
        let m = model();
        let short = m.estimate("What is 2+2?", "4");
        let longer_q = m.estimate("What is 2+2? Think carefully about it.", "4");
        let longer_a = m.estimate("What is 2+2?", "It is four, because two and two make four.");
        assert!(longer_q > short);
        assert!(longer_a > short);
        assert!(short > m.base());
    }

    #[test]
    fn bigger_reference_costs_more() {
        let small = model();
        let large = CostModel::new(&MarkerConfig {
            reference_model: "llama-7b".into(),
            ..MarkerConfig::default()
        });
        assert!(large.estimate("question", "answer") > small.estimate("question", "answer"));
    }

    #[test]
    fn unknown_reference_falls_back_to_gpt2() {
        assert_eq!(reference_params("mystery-model"), reference_params("gpt2"));
        assert_eq!(reference_params("LLaMA-70B"), 70e9);
    }
}
