//! Owner-driven membership changes and code sharing.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};
use crate::store::{Directory, DocumentStore};
use crate::types::{Identity, Language};

/// Result of an invitation. Transport failures are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InviteOutcome {
    Invited { collaborator: String },
    /// Already the owner or a collaborator. Nothing changed and no email was sent.
    AlreadyMember,
    /// No identity is registered under the email.
    NotFound,
    /// Only the owner may invite.
    Forbidden,
    /// Membership was committed but the email could not be delivered.
    NotificationFailed { collaborator: String, reason: String },
}

/// Link included in invitations.
#[must_use]
pub fn editor_link(base_url: &str, document_id: &str) -> String {
    format!("{}/editor/{document_id}", base_url.trim_end_matches('/'))
}

pub fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::BadRequest("a valid email address is required".to_string()));
    }
    Ok(email)
}

/// Adds the identity registered under `email` to the document's collaborators
/// and notifies them.
///
/// The membership write commits before notification; a delivery failure is
/// reported as [`InviteOutcome::NotificationFailed`] rather than an error.
pub async fn invite<S, D>(
    store: &S,
    directory: &D,
    notifier: &dyn Notifier,
    requester: &Identity,
    document_id: &str,
    email: &str,
    base_url: &str,
) -> Result<InviteOutcome>
where
    S: DocumentStore + ?Sized,
    D: Directory + ?Sized,
{
    let email = validate_email(email)?;

    let Some(target) = directory.find_identity_by_email(email)? else {
        tracing::debug!("Invite to {} for unknown email {}", document_id, email);
        return Ok(InviteOutcome::NotFound);
    };

    let document = store.get_document(document_id)?.ok_or(Error::NotFound)?;
    if !document.is_owned_by(&requester.uid) {
        return Ok(InviteOutcome::Forbidden);
    }
    if document.is_owned_by(&target.uid) {
        return Ok(InviteOutcome::AlreadyMember);
    }

    if !store.add_collaborator(document_id, &target.uid)? {
        return Ok(InviteOutcome::AlreadyMember);
    }
    tracing::info!("{} added {} to {}", requester.uid, target.uid, document_id);

    let notification = Notification::invitation(
        &target.email,
        &requester.email,
        &editor_link(base_url, document_id),
    );
    match notifier.send(&notification).await {
        Ok(()) => Ok(InviteOutcome::Invited {
            collaborator: target.uid,
        }),
        Err(e) => {
            tracing::warn!("Invitation email to {} failed: {}", target.email, e);
            Ok(InviteOutcome::NotificationFailed {
                collaborator: target.uid,
                reason: e.to_string(),
            })
        }
    }
}

/// Emails raw code to an arbitrary address. Grants no access.
pub async fn share(
    notifier: &dyn Notifier,
    requester: &Identity,
    email: &str,
    code: &str,
    language: Language,
) -> Result<()> {
    let email = validate_email(email)?;
    tracing::debug!("{} sharing {} code with {}", requester.uid, language, email);
    notifier
        .send(&Notification::shared_code(email, &requester.email, code))
        .await
}

/// Owner-only removal of a collaborator. Returns whether the set changed.
pub fn remove_collaborator<S>(
    store: &S,
    requester: &Identity,
    document_id: &str,
    uid: &str,
) -> Result<bool>
where
    S: DocumentStore + ?Sized,
{
    let document = store.get_document(document_id)?.ok_or(Error::NotFound)?;
    if !document.is_owned_by(&requester.uid) {
        return Err(Error::Forbidden);
    }
    store.remove_collaborator(document_id, uid)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::store::{SqliteStore, Store};
    use crate::types::NewDocument;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, notification: &Notification) -> Result<()> {
            if self.fail {
                return Err(Error::Transport("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn setup() -> (TempDir, SqliteStore, Identity, Identity) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let person = |uid: &str| Identity {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: uid.to_string(),
            created_at: Utc::now(),
        };
        let alice = person("alice");
        let bob = person("bob");
        store.create_identity(&alice).unwrap();
        store.create_identity(&bob).unwrap();
        (temp, store, alice, bob)
    }

    #[tokio::test]
    async fn test_invite_adds_collaborator_and_notifies() {
        let (_temp, store, alice, _bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        let notifier = Recorder::default();

        let outcome = invite(
            &store, &store, &notifier, &alice, &doc.id, "bob@example.com", "http://pad",
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            InviteOutcome::Invited {
                collaborator: "bob".to_string()
            }
        );
        let stored = store.get_document(&doc.id).unwrap().unwrap();
        assert!(stored.collaborators.unwrap().contains("bob"));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@example.com");
        assert!(sent[0].body.contains(&format!("http://pad/editor/{}", doc.id)));
    }

    #[tokio::test]
    async fn test_invite_twice_is_already_member() {
        let (_temp, store, alice, _bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        let notifier = Recorder::default();

        for _ in 0..2 {
            invite(&store, &store, &notifier, &alice, &doc.id, "bob@example.com", "http://pad")
                .await
                .unwrap();
        }
        let again = invite(
            &store, &store, &notifier, &alice, &doc.id, "alice@example.com", "http://pad",
        )
        .await
        .unwrap();
        assert_eq!(again, InviteOutcome::AlreadyMember);

        let stored = store.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.collaborators.unwrap().len(), 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_owner_invite_never_mutates() {
        let (_temp, store, _alice, bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        store.add_collaborator(&doc.id, "bob").unwrap();
        let notifier = Recorder::default();

        for email in ["alice@example.com", "nobody@example.com"] {
            let outcome = invite(&store, &store, &notifier, &bob, &doc.id, email, "http://pad")
                .await
                .unwrap();
            assert_ne!(outcome, InviteOutcome::AlreadyMember);
        }

        let stored = store.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.collaborators.unwrap().len(), 1);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_unknown_email() {
        let (_temp, store, alice, _bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();

        let outcome = invite(
            &store,
            &store,
            &Recorder::default(),
            &alice,
            &doc.id,
            "nobody@example.com",
            "http://pad",
        )
        .await
        .unwrap();
        assert_eq!(outcome, InviteOutcome::NotFound);
        let stored = store.get_document(&doc.id).unwrap().unwrap();
        assert!(stored.collaborators.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_validates_email_and_document() {
        let (_temp, store, alice, _bob) = setup();
        let notifier = Recorder::default();

        let bad = invite(
            &store, &store, &notifier, &alice, "x", "not-an-email", "http://pad",
        )
        .await;
        assert!(matches!(bad, Err(Error::BadRequest(_))));

        let missing =
            invite(&store, &store, &notifier, &alice, "missing", "bob@example.com", "http://pad")
                .await;
        assert!(matches!(missing, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_membership() {
        let (_temp, store, alice, _bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        let notifier = Recorder {
            fail: true,
            ..Recorder::default()
        };

        let outcome = invite(
            &store, &store, &notifier, &alice, &doc.id, "bob@example.com", "http://pad",
        )
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            InviteOutcome::NotificationFailed { ref collaborator, .. } if collaborator == "bob"
        ));
        let stored = store.get_document(&doc.id).unwrap().unwrap();
        assert!(stored.collaborators.unwrap().contains("bob"));
    }

    #[tokio::test]
    async fn test_share_sends_code_without_membership() {
        let (_temp, store, alice, _bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        let notifier = Recorder::default();

        share(&notifier, &alice, "bob@example.com", "print(1)", Language::Python)
            .await
            .unwrap();

        assert_eq!(notifier.sent.lock().unwrap()[0].body, "print(1)");
        let stored = store.get_document(&doc.id).unwrap().unwrap();
        assert!(stored.collaborators.unwrap().is_empty());
    }

    #[test]
    fn test_remove_collaborator_is_owner_only() {
        let (_temp, store, alice, bob) = setup();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        store.add_collaborator(&doc.id, "bob").unwrap();

        assert!(matches!(
            remove_collaborator(&store, &bob, &doc.id, "bob"),
            Err(Error::Forbidden)
        ));
        assert!(remove_collaborator(&store, &alice, &doc.id, "bob").unwrap());
        assert!(!remove_collaborator(&store, &alice, &doc.id, "bob").unwrap());
        assert!(matches!(
            remove_collaborator(&store, &alice, "missing", "bob"),
            Err(Error::NotFound)
        ));
    }
}
