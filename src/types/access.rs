use serde::Serialize;

use super::{Document, Identity};

/// How an identity relates to a document it may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Collaborator,
}

/// Outcome of an access check.
///
/// `NotReady` is never a denial: the document has not been fully written yet
/// and callers must wait for the next change instead of redirecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow(Role),
    Deny,
    NotReady,
}

impl Access {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Access::Allow(_))
    }
}

/// Decides whether `identity` may view and edit `document`.
///
/// Owner access is checked independently of collaborator membership. Must be
/// re-run on every observed change; results are not cached.
#[must_use]
pub fn evaluate(document: &Document, identity: &Identity) -> Access {
    let (Some(owner), Some(collaborators)) = (&document.owner, &document.collaborators) else {
        return Access::NotReady;
    };

    if *owner == identity.uid {
        Access::Allow(Role::Owner)
    } else if collaborators.contains(&identity.uid) {
        Access::Allow(Role::Collaborator)
    } else {
        Access::Deny
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use crate::types::Language;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: uid.to_string(),
            created_at: Utc::now(),
        }
    }

    fn document(owner: Option<&str>, collaborators: Option<&[&str]>) -> Document {
        Document {
            id: "doc-1".to_string(),
            owner: owner.map(str::to_string),
            collaborators: collaborators
                .map(|c| c.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()),
            title: "Untitled".to_string(),
            code: String::new(),
            language: Language::Plaintext,
            created_at: Utc::now(),
            last_edited: Utc::now(),
        }
    }

    #[test]
    fn test_owner_allowed() {
        let doc = document(Some("alice"), Some(&[]));
        assert_eq!(evaluate(&doc, &identity("alice")), Access::Allow(Role::Owner));
    }

    #[test]
    fn test_collaborator_allowed() {
        let doc = document(Some("alice"), Some(&["bob"]));
        assert_eq!(
            evaluate(&doc, &identity("bob")),
            Access::Allow(Role::Collaborator)
        );
    }

    #[test]
    fn test_stranger_denied() {
        let doc = document(Some("alice"), Some(&["bob"]));
        assert_eq!(evaluate(&doc, &identity("carol")), Access::Deny);
    }

    #[test]
    fn test_owner_listed_as_collaborator_is_still_owner() {
        let doc = document(Some("alice"), Some(&["alice"]));
        assert_eq!(evaluate(&doc, &identity("alice")), Access::Allow(Role::Owner));
    }

    #[test]
    fn test_uninitialized_is_not_ready() {
        let missing_owner = document(None, Some(&["bob"]));
        let missing_collaborators = document(Some("alice"), None);
        let missing_both = document(None, None);

        for doc in [&missing_owner, &missing_collaborators, &missing_both] {
            for uid in ["alice", "bob", "carol"] {
                let access = evaluate(doc, &identity(uid));
                assert_eq!(access, Access::NotReady);
                assert!(!access.is_allowed());
            }
        }
    }

    #[test]
    fn test_revocation_observed_on_reevaluation() {
        let mut doc = document(Some("alice"), Some(&["bob"]));
        let bob = identity("bob");
        assert!(evaluate(&doc, &bob).is_allowed());

        doc.collaborators = Some(BTreeSet::new());
        assert_eq!(evaluate(&doc, &bob), Access::Deny);
    }
}
