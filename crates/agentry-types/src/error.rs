use thiserror::Error;

/// Errors from repository operations (used by trait definitions in agentry-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the tool-execution collaborator.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },

    #[error("tool service timeout: {0}")]
    Timeout(String),

    #[error("tool service network error: {0}")]
    Network(String),
}

/// Errors from notification delivery. Never fatal to a run.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable")]
    Unavailable,

    #[error("recipient has no address for this channel")]
    NoAddress,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::Execution {
            tool: "crm_lookup".to_string(),
            message: "404".to_string(),
        };
        assert_eq!(err.to_string(), "tool 'crm_lookup' failed: 404");
    }
}
