use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collab::InviteOutcome;
use crate::types::{Document, Language, Role, Token};

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIdentityRequest {
    /// Defaults to a random UUID.
    #[serde(default)]
    pub uid: Option<String>,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateIdentityTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            is_admin: token.is_admin,
            identity_id: token.identity_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateDocumentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
}

/// A document together with the caller's role on it.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub role: Role,
}

/// Dashboard row. Code is omitted.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub language: Language,
    pub role: Role,
    pub last_edited: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub code: String,
    pub language: Language,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    #[serde(flatten)]
    pub outcome: InviteOutcome,
    pub notified: bool,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub email: String,
    pub code: String,
    #[serde(default)]
    pub language: Language,
}

/// Messages a live editor sends over the WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Edit {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        language: Option<Language>,
    },
    Save,
    Logout,
}

/// Replies to client requests. Session events are sent alongside these.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    Saved { last_edited: DateTime<Utc> },
    SaveRejected { reason: String },
    Error { message: String },
}
