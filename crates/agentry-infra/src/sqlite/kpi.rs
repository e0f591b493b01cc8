//! SQLite KPI snapshot repository.

use agentry_core::repository::KpiRepository;
use agentry_types::error::RepositoryError;
use agentry_types::evaluation::KpiSnapshot;
use sqlx::Row;
use uuid::Uuid;

use super::store::{
    SqliteStore, format_datetime, from_json, parse_datetime, parse_uuid, query_err, to_json,
};

fn snapshot_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<KpiSnapshot, RepositoryError> {
    let agent_id: String = row.try_get("agent_id").map_err(query_err)?;
    let run_id: String = row.try_get("run_id").map_err(query_err)?;
    let values: String = row.try_get("kpi_values").map_err(query_err)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(query_err)?;

    Ok(KpiSnapshot {
        agent_id: parse_uuid(&agent_id)?,
        run_id: parse_uuid(&run_id)?,
        values: from_json(&values, "kpi values")?,
        recorded_at: parse_datetime(&recorded_at)?,
    })
}

impl KpiRepository for SqliteStore {
    async fn record_kpis(&self, snapshot: &KpiSnapshot) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO kpi_snapshots (agent_id, run_id, kpi_values, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot.agent_id.to_string())
        .bind(snapshot.run_id.to_string())
        .bind(to_json(&snapshot.values, "kpi values")?)
        .bind(format_datetime(&snapshot.recorded_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn list_kpis(&self, agent_id: &Uuid, limit: u32) -> Result<Vec<KpiSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM kpi_snapshots WHERE agent_id = ? ORDER BY recorded_at DESC, seq DESC LIMIT ?",
        )
        .bind(agent_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(snapshot_from_row).collect()
    }
}
