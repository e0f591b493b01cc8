//! Cost estimation for completion calls.
//!
//! Configured pricing wins over the built-in table; unknown models fall
//! back to a conservative rate so cost is never silently zero.

use agentry_types::config::ModelPricing;
use agentry_types::run::TokenUsage;

struct PricingEntry {
    model_pattern: &'static str,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

const FALLBACK_INPUT_COST: f64 = 5.0;
const FALLBACK_OUTPUT_COST: f64 = 15.0;

// Order matters: more specific prefixes first.
const DEFAULT_PRICING: &[PricingEntry] = &[
    PricingEntry {
        model_pattern: "gpt-4o-mini",
        input_cost_per_million: 0.15,
        output_cost_per_million: 0.60,
    },
    PricingEntry {
        model_pattern: "gpt-4o",
        input_cost_per_million: 2.50,
        output_cost_per_million: 10.0,
    },
    PricingEntry {
        model_pattern: "gpt-4-turbo",
        input_cost_per_million: 10.0,
        output_cost_per_million: 30.0,
    },
    PricingEntry {
        model_pattern: "gpt-4",
        input_cost_per_million: 30.0,
        output_cost_per_million: 60.0,
    },
    PricingEntry {
        model_pattern: "gpt-3.5-turbo",
        input_cost_per_million: 0.50,
        output_cost_per_million: 1.50,
    },
];

/// Prefix match; a trailing `*` is accepted and ignored.
fn matches_pattern(model: &str, pattern: &str) -> bool {
    model.starts_with(pattern.trim_end_matches('*'))
}

/// Estimated USD cost of one completion.
pub fn estimate_cost(model: &str, usage: &TokenUsage, configured: &[ModelPricing]) -> f64 {
    if let Some(p) = configured
        .iter()
        .find(|p| matches_pattern(model, &p.model_pattern))
    {
        return compute_cost(usage, p.input_cost_per_million, p.output_cost_per_million);
    }

    if let Some(entry) = DEFAULT_PRICING
        .iter()
        .find(|e| matches_pattern(model, e.model_pattern))
    {
        return compute_cost(
            usage,
            entry.input_cost_per_million,
            entry.output_cost_per_million,
        );
    }

    tracing::debug!(model, "no pricing for model, using fallback rate");
    compute_cost(usage, FALLBACK_INPUT_COST, FALLBACK_OUTPUT_COST)
}

fn compute_cost(usage: &TokenUsage, input_per_million: f64, output_per_million: f64) -> f64 {
    (usage.prompt_tokens as f64 / 1_000_000.0) * input_per_million
        + (usage.completion_tokens as f64 / 1_000_000.0) * output_per_million
}

/// Human-readable cost, always marked as an estimate.
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("~${cost:.3}")
    } else {
        format!("~${cost:.2}")
    }
}
