//! Outbound notifications (invitation and share emails).

mod emailjs;

pub use emailjs::{DEFAULT_EMAILJS_ENDPOINT, EmailJsNotifier};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub from: String,
    pub body: String,
}

impl Notification {
    /// Invitation carrying a durable link to the document.
    #[must_use]
    pub fn invitation(to: &str, from: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            body: format!(
                "You've been invited to collaborate on codepad. Click the link to join: {link}"
            ),
        }
    }

    /// Raw code sent as the message body; grants nothing.
    #[must_use]
    pub fn shared_code(to: &str, from: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            body: code.to_string(),
        }
    }
}

/// Delivers notifications. Delivery is independent of document mutations.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them.
///
/// Used when no email service is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            to = %notification.to,
            from = %notification.from,
            "Notification (no email service configured): {}",
            notification.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_contains_link() {
        let n = Notification::invitation(
            "bob@example.com",
            "alice@example.com",
            "http://x/editor/1",
        );
        assert!(n.body.ends_with("http://x/editor/1"));
        assert_eq!(n.to, "bob@example.com");
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let n = Notification::shared_code("bob@example.com", "alice@example.com", "print(1)");
        assert!(LogNotifier.send(&n).await.is_ok());
    }
}
