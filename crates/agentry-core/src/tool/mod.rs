//! Tool-execution collaborator port.
//!
//! The engine never runs tools itself. `ToolExecutor` implementations forward
//! calls to an external tool service; `BoxToolExecutor` erases the concrete
//! type the same way `BoxLlmProvider` does.

use std::future::Future;
use std::pin::Pin;

use agentry_types::error::ToolError;

pub trait ToolExecutor: Send + Sync {
    /// Execute `tool_name` with structured `input`, returning its output.
    fn execute(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, ToolError>> + Send;
}

/// Object-safe version of [`ToolExecutor`] with boxed futures.
pub trait ToolExecutorDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        tool_name: &'a str,
        input: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + 'a>>;
}

impl<T: ToolExecutor> ToolExecutorDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        tool_name: &'a str,
        input: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(tool_name, input))
    }
}

pub struct BoxToolExecutor {
    inner: Box<dyn ToolExecutorDyn + Send + Sync>,
}

impl BoxToolExecutor {
    pub fn new<T: ToolExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.inner.execute_boxed(tool_name, input).await
    }
}

/// Executor used when no tool service is configured: every call fails.
pub struct NoToolExecutor;

impl ToolExecutor for NoToolExecutor {
    async fn execute(
        &self,
        tool_name: &str,
        _input: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        Err(ToolError::UnknownTool(tool_name.to_string()))
    }
}
