//! User management. Approver resolution reads these records.

use anyhow::Result;
use console::style;
use uuid::Uuid;

use agentry_types::user::User;

use crate::state::AppState;

pub async fn add_user(
    state: &AppState,
    tenant_id: Uuid,
    name: String,
    email: Option<String>,
    roles: Vec<String>,
    id: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let user = build_user(tenant_id, name, email, roles, id);
    state.service.save_user(&user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Saved user {}{}",
        style("✓").green().bold(),
        style(&user.name).cyan().bold(),
        if user.can_approve() {
            format!(" {}", style("(approver)").yellow())
        } else {
            String::new()
        }
    );
    println!("  {}", style(user.id).dim());
    println!();
    Ok(())
}

fn build_user(
    tenant_id: Uuid,
    name: String,
    email: Option<String>,
    roles: Vec<String>,
    id: Option<Uuid>,
) -> User {
    let mut normalized: Vec<String> = Vec::new();
    for role in roles {
        let role = role.trim().to_lowercase();
        if !role.is_empty() && !normalized.contains(&role) {
            normalized.push(role);
        }
    }

    User {
        id: id.unwrap_or_else(Uuid::now_v7),
        tenant_id,
        name,
        email: email.filter(|e| !e.trim().is_empty()),
        roles: normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_normalized() {
        let user = build_user(
            Uuid::now_v7(),
            "Grace".to_string(),
            Some(" ".to_string()),
            vec!["Admin".to_string(), "admin".to_string(), " ".to_string()],
            None,
        );
        assert_eq!(user.roles, vec!["admin"]);
        assert!(user.email.is_none());
        assert!(user.can_approve());
    }

    #[test]
    fn test_explicit_id_is_kept() {
        let id = Uuid::now_v7();
        let user = build_user(Uuid::now_v7(), "Linus".to_string(), None, Vec::new(), Some(id));
        assert_eq!(user.id, id);
        assert!(!user.can_approve());
    }
}
