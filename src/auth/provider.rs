use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::helpers::{TokenValidationError, validate_token};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Identity;

/// Resolves a credential to an authenticated identity.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<Identity>;
}

/// Identity provider backed by bearer tokens in the store.
pub struct TokenIdentityProvider {
    store: Arc<dyn Store>,
}

impl TokenIdentityProvider {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl IdentityProvider for TokenIdentityProvider {
    fn authenticate(&self, credential: &str) -> Result<Identity> {
        let validated = validate_token(self.store.as_ref(), credential, false).map_err(|e| match e {
            TokenValidationError::TokenExpired => Error::TokenExpired,
            TokenValidationError::AdminTokenNotAllowed => Error::Forbidden,
            TokenValidationError::InternalError => {
                Error::Transport("identity lookup failed".to_string())
            }
            TokenValidationError::InvalidScheme | TokenValidationError::InvalidToken => {
                Error::Unauthorized
            }
        })?;

        validated.identity.ok_or(Error::Unauthorized)
    }
}

/// Publishes login/logout transitions to open document sessions.
pub type IdentityWatch = watch::Receiver<Option<Identity>>;

#[must_use]
pub fn identity_channel(
    initial: Option<Identity>,
) -> (watch::Sender<Option<Identity>>, IdentityWatch) {
    watch::channel(initial)
}

/// One identity channel per signed-in uid, shared by all of its live sessions.
#[derive(Default)]
pub struct IdentitySessions {
    senders: Mutex<HashMap<String, watch::Sender<Option<Identity>>>>,
}

impl IdentitySessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Option<Identity>>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribes to sign-in changes for `identity`. The current value is
    /// already marked seen.
    pub fn watch(&self, identity: &Identity) -> IdentityWatch {
        let mut senders = self.senders();
        senders.retain(|_, tx| tx.receiver_count() > 0);

        senders
            .entry(identity.uid.clone())
            .or_insert_with(|| identity_channel(Some(identity.clone())).0)
            .subscribe()
    }

    /// Signs `uid` out of every live session. Returns how many were watching.
    pub fn revoke(&self, uid: &str) -> usize {
        let Some(tx) = self.senders().remove(uid) else {
            return 0;
        };
        tracing::info!("Signing out {} live session(s) for {}", tx.receiver_count(), uid);
        tx.send_replace(None);
        tx.receiver_count()
    }

    #[must_use]
    pub fn watcher_count(&self, uid: &str) -> usize {
        self.senders()
            .get(uid)
            .map(watch::Sender::receiver_count)
            .unwrap_or(0)
    }
}
