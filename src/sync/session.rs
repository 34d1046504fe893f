use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{
    GONE_NOTICE, LocalState, REVOKED_NOTICE, SaveOutcome, SessionEvent, SessionState,
    save_document,
};
use crate::auth::IdentityWatch;
use crate::error::{Error, Result};
use crate::store::{DocumentEvent, DocumentStore, Subscription};
use crate::types::{Access, Identity, Language, evaluate};

/// Pause before retrying a subscription that could not be opened.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

/// One open document for one identity.
///
/// Every remote event is re-evaluated against the current identity; access is
/// never cached across events. Transitions are reported on the channel returned
/// by [`DocumentSession::new`].
pub struct DocumentSession<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    document_id: String,
    identity: Option<Identity>,
    state: SessionState,
    local: LocalState,
    subscription: Option<Subscription>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<S: DocumentStore + ?Sized> DocumentSession<S> {
    pub fn new(
        store: Arc<S>,
        document_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            store,
            document_id: document_id.into(),
            identity: None,
            state: SessionState::Unauthenticated,
            local: LocalState::default(),
            subscription: None,
            events,
        };
        (session, rx)
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn local(&self) -> &LocalState {
        &self.local
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Establishes `identity` and opens the live subscription.
    ///
    /// A different identity first releases the previous one's subscription.
    pub fn authenticate(&mut self, identity: Identity) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        if let Some(current) = &self.identity {
            if current.uid == identity.uid {
                return Ok(());
            }
            self.logout();
        }

        tracing::debug!("Session for {} authenticated as {}", self.document_id, identity.uid);
        self.identity = Some(identity);
        self.transition(SessionState::Subscribing);
        self.subscription = Some(self.store.subscribe(&self.document_id)?);
        Ok(())
    }

    /// Releases the subscription and drops the local mirror.
    pub fn logout(&mut self) {
        self.subscription = None;
        if self.identity.take().is_none() || self.state.is_terminal() {
            return;
        }
        self.local = LocalState::default();
        self.transition(SessionState::Unauthenticated);
    }

    /// Applies one remote event.
    pub fn apply(&mut self, event: DocumentEvent) {
        if !self.state.is_live() {
            return;
        }
        let Some(identity) = &self.identity else {
            return;
        };

        let document = match event {
            DocumentEvent::Deleted => {
                self.finish(SessionState::Gone, GONE_NOTICE);
                return;
            }
            DocumentEvent::Changed(document) => document,
        };

        match evaluate(&document, identity) {
            Access::NotReady => {
                tracing::debug!("Document {} not initialized yet, waiting", self.document_id);
            }
            Access::Deny => self.finish(SessionState::Revoked, REVOKED_NOTICE),
            Access::Allow(role) => {
                self.local.mirror(&document);
                self.transition(SessionState::Synced);
                self.emit(SessionEvent::Applied {
                    role,
                    state: self.local.clone(),
                });
            }
        }
    }

    /// Waits for and applies the next remote event.
    ///
    /// Returns `false` without waiting when the session holds no subscription
    /// to wait on. Feed errors are reported and followed by a resubscribe.
    pub async fn poll(&mut self) -> bool {
        if !self.state.is_live() {
            return false;
        }

        let received = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => Err(Error::Transport(format!(
                "not subscribed to {}",
                self.document_id
            ))),
        };

        match received {
            Ok(event) => self.apply(event),
            Err(e) => {
                tracing::warn!("Live feed error for {}: {}", self.document_id, e);
                self.emit(SessionEvent::SubscriptionError {
                    message: e.to_string(),
                });
                self.resubscribe().await;
            }
        }
        true
    }

    /// Drives the session until it reaches a terminal state or the identity
    /// source closes while logged out.
    pub async fn run(mut self, mut identities: IdentityWatch) -> SessionState {
        let initial = identities.borrow_and_update().clone();
        self.follow_identity(initial);

        let mut watching = true;
        loop {
            if self.state.is_terminal() || (!watching && !self.state.is_live()) {
                break;
            }

            tokio::select! {
                changed = identities.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let next = identities.borrow_and_update().clone();
                    self.follow_identity(next);
                }
                _ = self.poll(), if self.state.is_live() => {}
            }
        }

        self.state
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.local.code = code.into();
        self.local.dirty = true;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.local.title = title.into();
        self.local.dirty = true;
    }

    pub fn set_language(&mut self, language: Language) {
        self.local.language = language;
        self.local.dirty = true;
    }

    /// Writes the local mirror after re-reading the document and re-checking
    /// access. Only a successful write clears the dirty flag.
    pub fn save(&mut self) -> Result<SaveOutcome> {
        let identity = self.identity.as_ref().ok_or(Error::Unauthorized)?;
        let outcome = save_document(
            self.store.as_ref(),
            identity,
            &self.document_id,
            &self.local.to_patch(),
        )?;

        if let SaveOutcome::Saved(document) = &outcome {
            tracing::debug!("Saved {} as {}", document.id, identity.uid);
            self.local.dirty = false;
        }
        Ok(outcome)
    }

    /// Applies a sign-in change: `Some` authenticates, `None` logs out.
    pub fn follow_identity(&mut self, identity: Option<Identity>) {
        match identity {
            Some(identity) => {
                if let Err(e) = self.authenticate(identity) {
                    tracing::warn!("Subscribe to {} failed: {}", self.document_id, e);
                    self.emit(SessionEvent::SubscriptionError {
                        message: e.to_string(),
                    });
                }
            }
            None => self.logout(),
        }
    }

    async fn resubscribe(&mut self) {
        self.subscription = None;
        match self.store.subscribe(&self.document_id) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                tracing::warn!("Resubscribe to {} failed: {}", self.document_id, e);
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
            }
        }
    }

    fn finish(&mut self, terminal: SessionState, notice: &str) {
        self.subscription = None;
        self.transition(terminal);
        self.emit(SessionEvent::Redirect {
            notice: notice.to_string(),
        });
    }

    fn transition(&mut self, to: SessionState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            self.emit(SessionEvent::Transition { from, to });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // A dropped receiver only means nobody is observing.
        let _ = self.events.send(event);
    }
}
