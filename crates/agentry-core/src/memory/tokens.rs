//! Token estimation.
//!
//! A rough heuristic of ~4 characters per token. It only has to be good
//! enough to decide when to compress and how much history fits a prompt.

use agentry_types::memory::MemoryContext;

const CHARS_PER_TOKEN: usize = 4;

/// Estimated tokens for `text`, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u32
}

/// Estimated tokens of a context's history plus its compressed summary.
pub fn estimate_context_tokens(context: &MemoryContext) -> u32 {
    let history: u32 = context
        .history
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum();
    let summary = context
        .compressed_history
        .as_deref()
        .map(estimate_tokens)
        .unwrap_or(0);
    history + summary
}
