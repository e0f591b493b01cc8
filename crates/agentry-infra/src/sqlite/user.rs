//! SQLite user repository.

use agentry_core::repository::UserRepository;
use agentry_types::error::RepositoryError;
use agentry_types::user::User;
use sqlx::Row;
use uuid::Uuid;

use super::store::{SqliteStore, from_json, parse_uuid, query_err, to_json};

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(query_err)?;
    let roles: String = row.try_get("roles").map_err(query_err)?;

    Ok(User {
        id: parse_uuid(&id)?,
        tenant_id: parse_uuid(&tenant_id)?,
        name: row.try_get("name").map_err(query_err)?,
        email: row.try_get("email").map_err(query_err)?,
        roles: from_json(&roles, "user roles")?,
    })
}

impl UserRepository for SqliteStore {
    async fn save_user(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO users (id, tenant_id, name, email, roles)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 tenant_id = excluded.tenant_id,
                 name = excluded.name,
                 email = excluded.email,
                 roles = excluded.roles"#,
        )
        .bind(user.id.to_string())
        .bind(user.tenant_id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(to_json(&user.roles, "user roles")?)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_user(&self, id: &Uuid) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_tenant_approver(&self, tenant_id: &Uuid) -> Result<Option<User>, RepositoryError> {
        // Roles are a JSON array, so the role filter runs here rather than in SQL.
        let rows = sqlx::query("SELECT * FROM users WHERE tenant_id = ? ORDER BY name ASC")
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        for row in &rows {
            let user = user_from_row(row)?;
            if user.can_approve() {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}
