//! SQLite run repository.
//!
//! Runs keep their scalar fields in columns and metrics/metadata as JSON.
//! State snapshots are whole `AgentState` blobs. Tool calls are append-only.

use agentry_core::repository::RunRepository;
use agentry_types::error::RepositoryError;
use agentry_types::run::{AgentRun, AgentState, RunStatus, ToolCallRecord};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::store::{
    SqliteStore, format_datetime, from_json, parse_datetime, parse_opt_uuid, parse_uuid,
    query_err, to_json,
};

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    agent_id: String,
    tenant_id: String,
    user_id: Option<String>,
    status: String,
    input: String,
    output: Option<String>,
    error: Option<String>,
    metrics: String,
    metadata: String,
    created_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            tenant_id: row.try_get("tenant_id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            metrics: row.try_get("metrics")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_run(self) -> Result<AgentRun, RepositoryError> {
        let status: RunStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(AgentRun {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            tenant_id: parse_uuid(&self.tenant_id)?,
            user_id: parse_opt_uuid(self.user_id.as_deref())?,
            input: self.input,
            output: self.output,
            error: self.error,
            status,
            metrics: from_json(&self.metrics, "run metrics")?,
            metadata: from_json(&self.metadata, "run metadata")?,
            created_at: parse_datetime(&self.created_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

struct ToolCallRow {
    id: String,
    run_id: String,
    tool_name: String,
    input: String,
    output: Option<String>,
    error: Option<String>,
    approved: bool,
    created_at: String,
}

impl ToolCallRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            tool_name: row.try_get("tool_name")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            approved: row.try_get("approved")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_record(self) -> Result<ToolCallRecord, RepositoryError> {
        Ok(ToolCallRecord {
            id: self.id,
            run_id: parse_uuid(&self.run_id)?,
            tool_name: self.tool_name,
            input: from_json(&self.input, "tool input")?,
            output: self
                .output
                .as_deref()
                .map(|s| from_json(s, "tool output"))
                .transpose()?,
            error: self.error,
            approved: self.approved,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AgentRun, RepositoryError> {
    RunRow::from_row(row).map_err(query_err)?.into_run()
}

// ---------------------------------------------------------------------------
// RunRepository impl
// ---------------------------------------------------------------------------

impl RunRepository for SqliteStore {
    async fn create_run(&self, run: &AgentRun) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO agent_runs
               (id, agent_id, tenant_id, user_id, status, input, output, error,
                metrics, metadata, created_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(run.id.to_string())
        .bind(run.agent_id.to_string())
        .bind(run.tenant_id.to_string())
        .bind(run.user_id.map(|u| u.to_string()))
        .bind(run.status.as_str())
        .bind(&run.input)
        .bind(&run.output)
        .bind(&run.error)
        .bind(to_json(&run.metrics, "run metrics")?)
        .bind(to_json(&run.metadata, "run metadata")?)
        .bind(format_datetime(&run.created_at))
        .bind(run.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "run {} already exists",
                run.id
            )));
        }
        Ok(())
    }

    async fn update_run(&self, run: &AgentRun) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE agent_runs SET
                 status = ?, output = ?, error = ?, metrics = ?, metadata = ?, completed_at = ?
               WHERE id = ? AND status NOT IN ('completed', 'failed')"#,
        )
        .bind(run.status.as_str())
        .bind(&run.output)
        .bind(&run.error)
        .bind(to_json(&run.metrics, "run metrics")?)
        .bind(to_json(&run.metadata, "run metadata")?)
        .bind(run.completed_at.as_ref().map(format_datetime))
        .bind(run.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing updated: either the run is missing or it is already terminal.
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM agent_runs WHERE id = ?")
            .bind(run.id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_err)?;

        match status {
            None => Err(RepositoryError::NotFound),
            Some(status) => Err(RepositoryError::Conflict(format!(
                "run {} is already {status}",
                run.id
            ))),
        }
    }

    async fn transition_run(
        &self,
        run: &AgentRun,
        expected: RunStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE agent_runs SET
                 status = ?, output = ?, error = ?, metrics = ?, metadata = ?, completed_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(run.status.as_str())
        .bind(&run.output)
        .bind(&run.error)
        .bind(to_json(&run.metrics, "run metrics")?)
        .bind(to_json(&run.metadata, "run metadata")?)
        .bind(run.completed_at.as_ref().map(format_datetime))
        .bind(run.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM agent_runs WHERE id = ?")
            .bind(run.id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_err)?;
        match exists {
            None => Err(RepositoryError::NotFound),
            Some(_) => Ok(false),
        }
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<AgentRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM agent_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs_by_agent(
        &self,
        agent_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<AgentRun>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM agent_runs WHERE agent_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(agent_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(run_from_row).collect()
    }

    async fn save_state(&self, state: &AgentState) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO run_states (run_id, state, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(run_id) DO UPDATE SET
                 state = excluded.state,
                 updated_at = excluded.updated_at"#,
        )
        .bind(state.run_id.to_string())
        .bind(to_json(state, "agent state")?)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn load_state(&self, run_id: &Uuid) -> Result<Option<AgentState>, RepositoryError> {
        let state: Option<String> = sqlx::query_scalar("SELECT state FROM run_states WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        state.as_deref().map(|s| from_json(s, "agent state")).transpose()
    }

    async fn record_tool_call(&self, record: &ToolCallRecord) -> Result<(), RepositoryError> {
        let output = record
            .output
            .as_ref()
            .map(|o| to_json(o, "tool output"))
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO tool_calls
               (id, run_id, tool_name, input, output, error, approved, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.id)
        .bind(record.run_id.to_string())
        .bind(&record.tool_name)
        .bind(to_json(&record.input, "tool input")?)
        .bind(&output)
        .bind(&record.error)
        .bind(record.approved)
        .bind(format_datetime(&record.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn list_tool_calls(&self, run_id: &Uuid) -> Result<Vec<ToolCallRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM tool_calls WHERE run_id = ? ORDER BY seq ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter()
            .map(|row| ToolCallRow::from_row(row).map_err(query_err)?.into_record())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::testing::temp_store;
    use agentry_types::memory::MemoryContext;
    use agentry_types::message::AgentMessage;
    use agentry_types::run::{META_ERROR_CONTEXT, RunNode};

    fn test_state() -> AgentState {
        AgentState::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            Some(Uuid::now_v7()),
            "reset my password",
            MemoryContext::new(4000),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let (store, _dir) = temp_store().await;
        let mut state = test_state();
        state
            .metadata
            .insert(META_ERROR_CONTEXT.to_string(), serde_json::json!({"node": "llm"}));
        let run = state.to_run(Utc::now());
        store.create_run(&run).await.unwrap();

        let loaded = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.input, "reset my password");
        assert_eq!(loaded.user_id, run.user_id);
        assert_eq!(loaded.status, RunStatus::Pending);
        assert_eq!(loaded.metadata[META_ERROR_CONTEXT]["node"], "llm");
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_run_conflicts() {
        let (store, _dir) = temp_store().await;
        let run = test_state().to_run(Utc::now());
        store.create_run(&run).await.unwrap();
        let err = store.create_run(&run).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_terminal_run_is_immutable() {
        let (store, _dir) = temp_store().await;
        let mut state = test_state();
        store.create_run(&state.to_run(Utc::now())).await.unwrap();

        state.status = RunStatus::Failed;
        state.error = Some("iteration limit reached".to_string());
        state.metrics.finish();
        let created = Utc::now();
        store.update_run(&state.to_run(created)).await.unwrap();

        state.status = RunStatus::Running;
        state.error = None;
        let err = store.update_run(&state.to_run(created)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let stored = store.get_run(&state.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("iteration limit reached"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_transition_run_only_from_expected_status() {
        let (store, _dir) = temp_store().await;
        let mut state = test_state();
        let created = Utc::now();
        store.create_run(&state.to_run(created)).await.unwrap();
        state.status = RunStatus::WaitingApproval;
        store.update_run(&state.to_run(created)).await.unwrap();

        state.status = RunStatus::Running;
        let run = state.to_run(created);
        assert!(store.transition_run(&run, RunStatus::WaitingApproval).await.unwrap());
        assert!(!store.transition_run(&run, RunStatus::WaitingApproval).await.unwrap());

        let stored = store.get_run(&state.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);

        let err = store
            .transition_run(&test_state().to_run(created), RunStatus::WaitingApproval)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_update_missing_run_not_found() {
        let (store, _dir) = temp_store().await;
        let err = store
            .update_run(&test_state().to_run(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_runs_by_agent_newest_first() {
        let (store, _dir) = temp_store().await;
        let agent_id = Uuid::now_v7();
        let base = Utc::now();
        for (i, input) in ["first", "second", "third"].into_iter().enumerate() {
            let mut state = test_state();
            state.agent_id = agent_id;
            state.input = input.to_string();
            let created = base + chrono::Duration::seconds(i as i64);
            store.create_run(&state.to_run(created)).await.unwrap();
        }

        let runs = store.list_runs_by_agent(&agent_id, 2).await.unwrap();
        let inputs: Vec<&str> = runs.iter().map(|r| r.input.as_str()).collect();
        assert_eq!(inputs, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_state_snapshot_upsert() {
        let (store, _dir) = temp_store().await;
        let mut state = test_state();
        store.create_run(&state.to_run(Utc::now())).await.unwrap();
        store.save_state(&state).await.unwrap();

        state.messages.push(AgentMessage::user("reset my password"));
        state.next_node = RunNode::Tools;
        state.iteration = 2;
        store.save_state(&state).await.unwrap();

        let loaded = store.load_state(&state.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.next_node, RunNode::Tools);
        assert_eq!(loaded.iteration, 2);
        assert!(store.load_state(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tool_calls_keep_order_and_repeated_ids() {
        let (store, _dir) = temp_store().await;
        let state = test_state();
        store.create_run(&state.to_run(Utc::now())).await.unwrap();

        for (tool, error) in [("lookup", None), ("lookup", Some("timeout")), ("email", None)] {
            store
                .record_tool_call(&ToolCallRecord {
                    id: "call_1".to_string(),
                    run_id: state.run_id,
                    tool_name: tool.to_string(),
                    input: serde_json::json!({"q": tool}),
                    output: error.is_none().then(|| serde_json::json!({"ok": true})),
                    error: error.map(str::to_string),
                    approved: tool == "email",
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let calls = store.list_tool_calls(&state.run_id).await.unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].error.as_deref(), Some("timeout"));
        assert!(calls[1].output.is_none());
        assert_eq!(calls[2].tool_name, "email");
        assert!(calls[2].approved);
    }
}
