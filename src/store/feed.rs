use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::{Error, Result};
use crate::types::Document;

/// Events buffered per document before a slow subscriber is reported as lagged.
pub const FEED_CAPACITY: usize = 64;

/// A change pushed to live subscribers of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Changed(Document),
    Deleted,
}

/// Per-document broadcast channels backing live subscriptions.
///
/// Publishers must hold the store's write lock while publishing so that
/// subscribers observe events in commit order.
#[derive(Default)]
pub struct Feed {
    channels: Mutex<HashMap<String, broadcast::Sender<DocumentEvent>>>,
}

impl Feed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<DocumentEvent>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a subscription whose first event is `snapshot`.
    pub fn subscribe(&self, document_id: &str, snapshot: DocumentEvent) -> Subscription {
        let mut channels = self.channels();
        channels.retain(|_, tx| tx.receiver_count() > 0);

        let receiver = channels
            .entry(document_id.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe();

        Subscription {
            document_id: document_id.to_string(),
            pending: Some(snapshot),
            receiver,
        }
    }

    pub fn publish(&self, document_id: &str, event: DocumentEvent) {
        let mut channels = self.channels();
        let deleted = matches!(event, DocumentEvent::Deleted);

        let Some(tx) = channels.get(document_id) else {
            return;
        };

        if tx.send(event).is_err() || deleted {
            channels.remove(document_id);
        }
    }

    /// Number of live subscriptions for a document.
    #[must_use]
    pub fn subscriber_count(&self, document_id: &str) -> usize {
        self.channels()
            .get(document_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

/// A live subscription to one document. Dropping it unsubscribes.
pub struct Subscription {
    document_id: String,
    pending: Option<DocumentEvent>,
    receiver: broadcast::Receiver<DocumentEvent>,
}

impl Subscription {
    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Waits for the next event. The snapshot taken at subscribe time comes first.
    pub async fn recv(&mut self) -> Result<DocumentEvent> {
        if let Some(event) = self.pending.take() {
            return Ok(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(RecvError::Lagged(skipped)) => Err(Error::Transport(format!(
                "live feed for {} lagged by {skipped} events",
                self.document_id
            ))),
            Err(RecvError::Closed) => Err(Error::Transport(format!(
                "live feed for {} closed",
                self.document_id
            ))),
        }
    }
}
