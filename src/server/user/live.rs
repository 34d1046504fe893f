use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::auth::RequireIdentity;
use crate::server::AppState;
use crate::server::dto::{ClientMessage, ServerReply};
use crate::store::Store;
use crate::sync::{DocumentSession, SaveOutcome, SessionEvent};
use crate::types::Identity;

/// Opens a live editing session over a WebSocket.
///
/// Session events are pushed as JSON. The client sends `edit`, `save` and
/// `logout` messages. The socket closes once the session is revoked, the
/// document is deleted, the client logs out or the identity is signed out
/// server-side.
pub async fn live_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity, id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut events) = DocumentSession::new(Arc::clone(&state.store), id);
    let mut replies = Vec::new();

    // Register before re-checking the directory so a concurrent delete is
    // either seen here or delivered through the watch.
    let mut identities = state.sessions.watch(&identity);
    let signed_in = match state.store.get_identity(&identity.uid) {
        Ok(found) => found.is_some(),
        Err(e) => {
            tracing::warn!("Identity lookup for {} failed: {}", identity.uid, e);
            false
        }
    };

    tracing::debug!("Live session for {} opened by {}", session.document_id(), identity.uid);
    if signed_in {
        let current = identities.borrow_and_update().clone();
        session.follow_identity(current);
    } else {
        replies.push(ServerReply::Error {
            message: "Identity is no longer signed in".to_string(),
        });
    }

    loop {
        if flush(&mut sender, &mut events, &mut replies).await.is_err() {
            break;
        }
        if session.state().is_terminal() || session.identity().is_none() {
            break;
        }

        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(&mut session, text.as_str()) {
                        replies.push(reply);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            changed = identities.changed() => {
                // A closed channel means the identity was signed out.
                let next = match changed {
                    Ok(()) => identities.borrow_and_update().clone(),
                    Err(_) => None,
                };
                session.follow_identity(next);
            }
            _ = session.poll(), if session.state().is_live() => {}
        }
    }

    tracing::debug!(
        "Live session for {} closed in state {:?}",
        session.document_id(),
        session.state()
    );
    let _ = sender.send(Message::Close(None)).await;
}

fn handle_client_message(
    session: &mut DocumentSession<dyn Store>,
    text: &str,
) -> Option<ServerReply> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            return Some(ServerReply::Error {
                message: format!("Invalid message: {e}"),
            });
        }
    };

    match message {
        ClientMessage::Edit {
            title,
            code,
            language,
        } => {
            if let Some(title) = title {
                session.set_title(title);
            }
            if let Some(code) = code {
                session.set_code(code);
            }
            if let Some(language) = language {
                session.set_language(language);
            }
            None
        }
        ClientMessage::Save => Some(match session.save() {
            Ok(SaveOutcome::Saved(document)) => ServerReply::Saved {
                last_edited: document.last_edited,
            },
            Ok(SaveOutcome::Gone) => ServerReply::SaveRejected {
                reason: "Document no longer exists".to_string(),
            },
            Ok(SaveOutcome::Denied) => ServerReply::SaveRejected {
                reason: "You no longer have access to this document".to_string(),
            },
            Err(e) => ServerReply::Error {
                message: e.to_string(),
            },
        }),
        ClientMessage::Logout => {
            session.logout();
            None
        }
    }
}

/// Sends pending session events, then replies.
async fn flush(
    sender: &mut SplitSink<WebSocket, Message>,
    events: &mut UnboundedReceiver<SessionEvent>,
    replies: &mut Vec<ServerReply>,
) -> Result<(), axum::Error> {
    let mut outgoing = Vec::new();
    while let Ok(event) = events.try_recv() {
        outgoing.push(serde_json::to_string(&event));
    }
    outgoing.extend(replies.drain(..).map(|reply| serde_json::to_string(&reply)));

    for json in outgoing {
        match json {
            Ok(json) => sender.send(Message::Text(json.into())).await?,
            Err(e) => tracing::error!("Failed to encode live message: {}", e),
        }
    }
    Ok(())
}
