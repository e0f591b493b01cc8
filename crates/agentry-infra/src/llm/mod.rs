//! Completion gateway clients.

pub mod openai_compat;

pub use openai_compat::HttpLlmProvider;
