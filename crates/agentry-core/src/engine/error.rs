use agentry_types::error::RepositoryError;
use uuid::Uuid;

use crate::memory::MemoryError;

/// Errors that stop the scheduler from producing a run record.
///
/// Collaborator failures are not here: they fail the run and are reported
/// through the returned `AgentRun`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid run state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
