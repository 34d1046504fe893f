use chrono::Utc;

use super::{TokenGenerator, parse_token};
use crate::store::Store;
use crate::types::{Identity, Token};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    AdminTokenNotAllowed,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub identity: Option<Identity>,
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
pub fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Validates a raw token string against the store.
/// Returns the validated token and its bound identity (if any).
/// Set `allow_admin` to false to reject admin tokens.
pub fn validate_token(
    store: &dyn Store,
    raw_token: &str,
    allow_admin: bool,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    if !allow_admin && token.is_admin {
        return Err(TokenValidationError::AdminTokenNotAllowed);
    }

    let identity = match &token.identity_id {
        Some(uid) => store
            .get_identity(uid)
            .map_err(|_| TokenValidationError::InternalError)?,
        None => None,
    };

    if let Err(e) = store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, identity })
}

/// Extracts token from Authorization header (Bearer or Basic).
/// Returns None if no auth header is present.
/// Returns Err if the auth scheme is unsupported.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, TokenValidationError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };

    if let Some(token) = header.strip_prefix("Bearer ") {
        return Ok(Some(token.to_string()));
    }

    if header.starts_with("Basic ") {
        return extract_basic_auth_token(header)
            .ok_or(TokenValidationError::InvalidToken)
            .map(Some);
    }

    Err(TokenValidationError::InvalidScheme)
}
