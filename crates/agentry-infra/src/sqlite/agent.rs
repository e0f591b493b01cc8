//! SQLite agent repository. Definitions are stored as JSON blobs.

use agentry_core::repository::AgentRepository;
use agentry_types::agent::AgentDefinition;
use agentry_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::store::{SqliteStore, format_datetime, from_json, query_err, to_json};

fn definition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AgentDefinition, RepositoryError> {
    let definition: String = row.try_get("definition").map_err(query_err)?;
    from_json(&definition, "agent definition")
}

impl AgentRepository for SqliteStore {
    async fn save_agent(&self, agent: &AgentDefinition) -> Result<(), RepositoryError> {
        let definition = to_json(agent, "agent definition")?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO agents (id, tenant_id, name, role_type, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 tenant_id = excluded.tenant_id,
                 name = excluded.name,
                 role_type = excluded.role_type,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(agent.id.to_string())
        .bind(agent.tenant_id.to_string())
        .bind(&agent.name)
        .bind(&agent.role_type)
        .bind(&definition)
        .bind(format_datetime(&agent.created_at))
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_agent(&self, id: &Uuid) -> Result<Option<AgentDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(definition_from_row).transpose()
    }

    async fn list_agents(
        &self,
        tenant_id: Option<&Uuid>,
    ) -> Result<Vec<AgentDefinition>, RepositoryError> {
        let rows = match tenant_id {
            Some(tenant) => {
                sqlx::query("SELECT definition FROM agents WHERE tenant_id = ? ORDER BY name ASC")
                    .bind(tenant.to_string())
                    .fetch_all(&self.pool.reader)
                    .await
            }
            None => {
                sqlx::query("SELECT definition FROM agents ORDER BY name ASC")
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(query_err)?;

        rows.iter().map(definition_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::testing::temp_store;

    #[tokio::test]
    async fn test_save_and_get_agent() {
        let (store, _dir) = temp_store().await;
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "it-support");
        agent.max_iterations = Some(4);
        store.save_agent(&agent).await.unwrap();

        let loaded = store.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Helpdesk");
        assert_eq!(loaded.max_iterations, Some(4));
        assert!(store.get_agent(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_agent_upserts() {
        let (store, _dir) = temp_store().await;
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "it-support");
        store.save_agent(&agent).await.unwrap();

        agent.name = "Service Desk".to_string();
        store.save_agent(&agent).await.unwrap();

        let all = store.list_agents(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Service Desk");
    }

    #[tokio::test]
    async fn test_list_agents_by_tenant_sorted() {
        let (store, _dir) = temp_store().await;
        let tenant = Uuid::now_v7();
        for name in ["Zoe", "Adam"] {
            store
                .save_agent(&AgentDefinition::new(tenant, name, "sales"))
                .await
                .unwrap();
        }
        store
            .save_agent(&AgentDefinition::new(Uuid::now_v7(), "Other", "legal"))
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_agents(Some(&tenant))
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Adam", "Zoe"]);
    }
}
