//! Conversation memory under a token budget.

pub mod manager;
pub mod tokens;

pub use manager::{MemoryError, MemoryManager};
pub use tokens::estimate_tokens;
