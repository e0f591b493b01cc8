//! Run repository trait definition.
//!
//! Covers three entity families:
//! - **Runs:** the caller-facing `AgentRun` record.
//! - **State snapshots:** the serialized `AgentState` a suspended run resumes from.
//! - **Tool calls:** append-only audit records.

use agentry_types::error::RepositoryError;
use agentry_types::run::{AgentRun, AgentState, RunStatus, ToolCallRecord};
use uuid::Uuid;

pub trait RunRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a new run record.
    fn create_run(
        &self,
        run: &AgentRun,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace a run's mutable fields.
    ///
    /// Returns `Conflict` if the stored run is already completed or failed,
    /// `NotFound` if it does not exist.
    fn update_run(
        &self,
        run: &AgentRun,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace a run's mutable fields only if its stored status is `expected`.
    ///
    /// Returns `false` when another writer moved the run first, `NotFound`
    /// if it does not exist.
    fn transition_run(
        &self,
        run: &AgentRun,
        expected: RunStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AgentRun>, RepositoryError>> + Send;

    /// Most recent runs of an agent, newest first.
    fn list_runs_by_agent(
        &self,
        agent_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<AgentRun>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // State snapshots
    // -----------------------------------------------------------------------

    /// Upsert the latest state snapshot of a run.
    fn save_state(
        &self,
        state: &AgentState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn load_state(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AgentState>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Tool calls
    // -----------------------------------------------------------------------

    fn record_tool_call(
        &self,
        record: &ToolCallRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Tool calls of a run in execution order.
    fn list_tool_calls(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ToolCallRecord>, RepositoryError>> + Send;
}
