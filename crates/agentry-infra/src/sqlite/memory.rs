//! SQLite memory repository: one JSON context per run.

use agentry_core::repository::MemoryRepository;
use agentry_types::error::RepositoryError;
use agentry_types::memory::MemoryContext;
use chrono::Utc;
use uuid::Uuid;

use super::store::{SqliteStore, format_datetime, from_json, query_err, to_json};

impl MemoryRepository for SqliteStore {
    async fn load_memory(&self, run_id: &Uuid) -> Result<Option<MemoryContext>, RepositoryError> {
        let context: Option<String> =
            sqlx::query_scalar("SELECT context FROM run_memory WHERE run_id = ?")
                .bind(run_id.to_string())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(query_err)?;

        context
            .as_deref()
            .map(|c| from_json(c, "memory context"))
            .transpose()
    }

    async fn save_memory(&self, run_id: &Uuid, context: &MemoryContext) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO run_memory (run_id, context, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(run_id) DO UPDATE SET
                 context = excluded.context,
                 updated_at = excluded.updated_at"#,
        )
        .bind(run_id.to_string())
        .bind(to_json(context, "memory context")?)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }
}
