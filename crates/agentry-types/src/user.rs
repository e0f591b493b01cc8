//! Tenant users, as far as approver resolution needs them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    /// Admins and owners receive approval requests without an explicit approver.
    pub fn can_approve(&self) -> bool {
        self.roles.iter().any(|r| r == "admin" || r == "owner")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_approve() {
        let mut user = User {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            name: "Grace".to_string(),
            email: None,
            roles: vec!["member".to_string()],
        };
        assert!(!user.can_approve());
        user.roles.push("owner".to_string());
        assert!(user.can_approve());
    }
}
