//! LlmProvider trait definition.
//!
//! The engine performs no inference itself; every completion goes through
//! an implementation of this trait (HTTP gateway in agentry-infra, scripted
//! fakes in tests).

use agentry_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for completion backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name, recorded on `gen_ai.system` spans.
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
