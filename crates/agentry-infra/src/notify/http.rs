//! HTTP notification channels.
//!
//! `NotificationServiceNotifier` posts to an external notification service;
//! `EmailToolNotifier` mails the approver through the tool service's `email`
//! tool. The usual wiring uses the service first and email as the fallback.

use std::time::Duration;

use agentry_core::notify::{ApprovalNotice, Notifier};
use agentry_core::tool::ToolExecutor;
use agentry_types::error::NotifyError;
use agentry_types::user::User;
use serde::Serialize;

use crate::tool::HttpToolExecutor;

/// Link an approver follows to act on `notice`.
fn action_url(gateway_url: &str, notice: &ApprovalNotice) -> String {
    format!(
        "{}/api/admin/approvals/{}",
        gateway_url.trim_end_matches('/'),
        notice.approval_id
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest {
    user_id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    title: String,
    message: String,
    action_url: String,
    metadata: serde_json::Value,
}

impl NotificationRequest {
    fn for_notice(recipient: &User, notice: &ApprovalNotice, gateway_url: &str) -> Self {
        Self {
            user_id: recipient.id.to_string(),
            kind: "approval_request",
            title: notice.subject(),
            message: format!(
                "Run {} needs your approval for: {}",
                notice.run_id, notice.action
            ),
            action_url: action_url(gateway_url, notice),
            metadata: serde_json::json!({
                "approvalId": notice.approval_id,
                "runId": notice.run_id,
                "toolCallId": notice.tool_call_id,
                "action": notice.action,
            }),
        }
    }
}

pub struct NotificationServiceNotifier {
    client: reqwest::Client,
    base_url: String,
    gateway_url: String,
}

impl NotificationServiceNotifier {
    pub fn new(
        base_url: impl Into<String>,
        gateway_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into(),
        })
    }
}

impl Notifier for NotificationServiceNotifier {
    fn channel(&self) -> &str {
        "notification-service"
    }

    async fn notify(&self, recipient: &User, notice: &ApprovalNotice) -> Result<(), NotifyError> {
        let body = NotificationRequest::for_notice(recipient, notice, &self.gateway_url);
        let response = self
            .client
            .post(format!("{}/notifications", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!("HTTP {status}")));
        }

        tracing::info!(
            user_id = %recipient.id,
            approval_id = %notice.approval_id,
            "approval notification sent via service"
        );
        Ok(())
    }
}

pub struct EmailToolNotifier {
    tools: HttpToolExecutor,
    gateway_url: String,
}

impl EmailToolNotifier {
    pub fn new(tools: HttpToolExecutor, gateway_url: impl Into<String>) -> Self {
        Self {
            tools,
            gateway_url: gateway_url.into(),
        }
    }

    fn email_input(&self, address: &str, notice: &ApprovalNotice) -> serde_json::Value {
        let link = action_url(&self.gateway_url, notice);
        serde_json::json!({
            "to": address,
            "subject": notice.subject(),
            "body": format!("{}\n\nApprove or reject: {link}", notice.body()),
        })
    }
}

impl Notifier for EmailToolNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    async fn notify(&self, recipient: &User, notice: &ApprovalNotice) -> Result<(), NotifyError> {
        let address = recipient.email.as_deref().ok_or(NotifyError::NoAddress)?;
        self.tools
            .execute("email", &self.email_input(address, notice))
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        tracing::info!(
            user_id = %recipient.id,
            approval_id = %notice.approval_id,
            "approval notification sent by email"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn notice() -> ApprovalNotice {
        ApprovalNotice {
            approval_id: Uuid::now_v7(),
            run_id: Uuid::now_v7(),
            tool_call_id: "call_1".to_string(),
            action: "delete_account".to_string(),
            context: serde_json::json!({"account": 42}),
        }
    }

    fn approver(email: Option<&str>) -> User {
        User {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            name: "Olga".to_string(),
            email: email.map(str::to_string),
            roles: vec!["admin".to_string()],
        }
    }

    #[test]
    fn test_notification_request_shape() {
        let n = notice();
        let user = approver(None);
        let body =
            serde_json::to_value(NotificationRequest::for_notice(&user, &n, "http://gw:3001/")).unwrap();
        assert_eq!(body["type"], "approval_request");
        assert_eq!(body["userId"], user.id.to_string());
        assert_eq!(
            body["actionUrl"],
            format!("http://gw:3001/api/admin/approvals/{}", n.approval_id)
        );
        assert_eq!(body["metadata"]["action"], "delete_account");
    }

    #[test]
    fn test_email_input_contains_link() {
        let tools = HttpToolExecutor::new("http://tools:3005", Duration::from_secs(1)).unwrap();
        let notifier = EmailToolNotifier::new(tools, "http://gw:3001");
        let n = notice();
        let input = notifier.email_input("olga@example.com", &n);
        assert_eq!(input["to"], "olga@example.com");
        assert_eq!(input["subject"], "Approval required: delete_account");
        assert!(input["body"].as_str().unwrap().contains(&n.approval_id.to_string()));
    }

    #[tokio::test]
    async fn test_email_without_address_fails_fast() {
        let tools = HttpToolExecutor::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let notifier = EmailToolNotifier::new(tools, "http://gw:3001");
        let err = notifier.notify(&approver(None), &notice()).await.unwrap_err();
        assert!(matches!(err, NotifyError::NoAddress));
    }
}
