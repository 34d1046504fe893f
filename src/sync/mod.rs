//! Reconciles the authoritative document with a session's local mirror.
//!
//! [`DocumentSession`] drives one open document for one identity. The
//! one-shot operations [`open_document`] and [`save_document`] perform the
//! same access checks outside a live session.

mod session;

pub use session::{DocumentSession, RESUBSCRIBE_DELAY};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::DocumentStore;
use crate::types::{Access, Document, DocumentPatch, Identity, Language, Role, evaluate};

pub const REVOKED_NOTICE: &str = "You no longer have access to this document.";
pub const GONE_NOTICE: &str = "This document has been deleted.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Subscribing,
    Synced,
    Revoked,
    Gone,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Revoked | SessionState::Gone)
    }

    /// States in which the session holds (or is re-acquiring) a subscription.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Subscribing | SessionState::Synced)
    }
}

/// The session's editable copy of the remote fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalState {
    pub title: String,
    pub code: String,
    pub language: Language,
    /// Local edits not yet saved.
    pub dirty: bool,
}

impl LocalState {
    fn mirror(&mut self, document: &Document) {
        self.title.clone_from(&document.title);
        self.code.clone_from(&document.code);
        self.language = document.language;
        self.dirty = false;
    }

    fn to_patch(&self) -> DocumentPatch {
        DocumentPatch {
            title: Some(self.title.clone()),
            code: Some(self.code.clone()),
            language: Some(self.language),
        }
    }
}

/// Observable output of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Transition {
        from: SessionState,
        to: SessionState,
    },
    /// The remote document was accepted into the local mirror.
    Applied { role: Role, state: LocalState },
    /// Emitted once when the session reaches a terminal state.
    Redirect { notice: String },
    SubscriptionError { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(Document),
    /// The document no longer exists. Nothing was written.
    Gone,
    /// The identity lost access. Nothing was written.
    Denied,
}

/// Reads a document the identity may access.
///
/// Fails with `NotFound`, `NotReady` or `AccessDenied`.
pub fn open_document<S>(store: &S, identity: &Identity, id: &str) -> Result<(Document, Role)>
where
    S: DocumentStore + ?Sized,
{
    let document = store.get_document(id)?.ok_or(Error::NotFound)?;
    match evaluate(&document, identity) {
        Access::Allow(role) => Ok((document, role)),
        Access::Deny => Err(Error::AccessDenied),
        Access::NotReady => Err(Error::NotReady),
    }
}

/// Read-then-write save. A missing document is never recreated.
pub fn save_document<S>(
    store: &S,
    identity: &Identity,
    id: &str,
    patch: &DocumentPatch,
) -> Result<SaveOutcome>
where
    S: DocumentStore + ?Sized,
{
    let Some(current) = store.get_document(id)? else {
        return Ok(SaveOutcome::Gone);
    };

    match evaluate(&current, identity) {
        Access::Allow(_) => {}
        Access::Deny => return Ok(SaveOutcome::Denied),
        Access::NotReady => return Err(Error::NotReady),
    }

    match store.update_document(id, patch) {
        Ok(document) => Ok(SaveOutcome::Saved(document)),
        // Deleted between the read and the write.
        Err(Error::NotFound) => Ok(SaveOutcome::Gone),
        Err(e) => Err(e),
    }
}
