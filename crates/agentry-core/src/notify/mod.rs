//! Notification collaborator port used to reach approvers.

use std::future::Future;
use std::pin::Pin;

use agentry_types::error::NotifyError;
use agentry_types::user::User;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an approver is told about a pending approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalNotice {
    pub approval_id: Uuid,
    pub run_id: Uuid,
    pub tool_call_id: String,
    pub action: String,
    pub context: serde_json::Value,
}

impl ApprovalNotice {
    pub fn subject(&self) -> String {
        format!("Approval required: {}", self.action)
    }

    pub fn body(&self) -> String {
        format!(
            "Action \"{}\" in run {} is waiting for your approval.\n\nApproval id: {}\nContext: {}",
            self.action, self.run_id, self.approval_id, self.context
        )
    }
}

pub trait Notifier: Send + Sync {
    /// Channel name for logs (e.g. "notification-service", "email").
    fn channel(&self) -> &str;

    fn notify(
        &self,
        recipient: &User,
        notice: &ApprovalNotice,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Object-safe version of [`Notifier`] with boxed futures.
pub trait NotifierDyn: Send + Sync {
    fn channel(&self) -> &str;

    fn notify_boxed<'a>(
        &'a self,
        recipient: &'a User,
        notice: &'a ApprovalNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;
}

impl<T: Notifier> NotifierDyn for T {
    fn channel(&self) -> &str {
        Notifier::channel(self)
    }

    fn notify_boxed<'a>(
        &'a self,
        recipient: &'a User,
        notice: &'a ApprovalNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(self.notify(recipient, notice))
    }
}

pub struct BoxNotifier {
    inner: Box<dyn NotifierDyn + Send + Sync>,
}

impl BoxNotifier {
    pub fn new<T: Notifier + 'static>(notifier: T) -> Self {
        Self {
            inner: Box::new(notifier),
        }
    }

    pub fn channel(&self) -> &str {
        self.inner.channel()
    }

    pub async fn notify(&self, recipient: &User, notice: &ApprovalNotice) -> Result<(), NotifyError> {
        self.inner.notify_boxed(recipient, notice).await
    }
}

/// Primary channel with an optional fallback tried when the primary fails.
pub struct NotifierChain {
    primary: Option<BoxNotifier>,
    fallback: Option<BoxNotifier>,
}

impl NotifierChain {
    pub fn new(primary: Option<BoxNotifier>, fallback: Option<BoxNotifier>) -> Self {
        Self { primary, fallback }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Deliver through the primary channel, then the fallback.
    ///
    /// Returns the channel that succeeded.
    pub async fn deliver(
        &self,
        recipient: &User,
        notice: &ApprovalNotice,
    ) -> Result<String, NotifyError> {
        let mut last_err = NotifyError::Unavailable;

        for notifier in [&self.primary, &self.fallback].into_iter().flatten() {
            match notifier.notify(recipient, notice).await {
                Ok(()) => return Ok(notifier.channel().to_string()),
                Err(e) => {
                    tracing::warn!(
                        channel = notifier.channel(),
                        approval_id = %notice.approval_id,
                        error = %e,
                        "approval notification failed"
                    );
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Notifier for Counting {
        fn channel(&self) -> &str {
            self.name
        }

        async fn notify(&self, _recipient: &User, _notice: &ApprovalNotice) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Delivery("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn recipient() -> User {
        User {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            name: "Approver".to_string(),
            email: Some("approver@example.com".to_string()),
            roles: vec!["admin".to_string()],
        }
    }

    fn notice() -> ApprovalNotice {
        ApprovalNotice {
            approval_id: Uuid::now_v7(),
            run_id: Uuid::now_v7(),
            tool_call_id: "call_1".to_string(),
            action: "delete_account".to_string(),
            context: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_chain_falls_back_when_primary_fails() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let chain = NotifierChain::new(
            Some(BoxNotifier::new(Counting {
                name: "primary",
                fail: true,
                calls: primary_calls.clone(),
            })),
            Some(BoxNotifier::new(Counting {
                name: "email",
                fail: false,
                calls: fallback_calls.clone(),
            })),
        );

        let channel = chain.deliver(&recipient(), &notice()).await.unwrap();
        assert_eq!(channel, "email");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_skips_fallback_on_success() {
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let chain = NotifierChain::new(
            Some(BoxNotifier::new(Counting {
                name: "primary",
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            })),
            Some(BoxNotifier::new(Counting {
                name: "email",
                fail: false,
                calls: fallback_calls.clone(),
            })),
        );

        assert_eq!(chain.deliver(&recipient(), &notice()).await.unwrap(), "primary");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_chain_is_unavailable() {
        let err = NotifierChain::disabled()
            .deliver(&recipient(), &notice())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Unavailable));
    }

    #[test]
    fn test_notice_subject() {
        assert_eq!(notice().subject(), "Approval required: delete_account");
    }
}
