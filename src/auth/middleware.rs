use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, extract_token_from_header, validate_token};
use crate::error::Error;
use crate::server::AppState;
use crate::types::{Identity, Token};

/// Extractor that requires admin authentication
pub struct RequireAdmin(pub Token);

/// Extractor that requires an identity (non-admin token bound to an identity)
pub struct RequireIdentity(pub Identity);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    NotIdentity,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::NotIdentity => (
                StatusCode::FORBIDDEN,
                "Identity token required for this operation",
            ),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                HeaderValue::from_static("Bearer realm=\"codepad\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw_token = extract_raw_token(parts)?;

        let validated =
            validate_token(state.store.as_ref(), &raw_token, true).map_err(|e| match e {
                TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
                TokenValidationError::InvalidToken => AuthError::InvalidToken,
                TokenValidationError::TokenExpired => AuthError::TokenExpired,
                TokenValidationError::AdminTokenNotAllowed => AuthError::NotAdmin,
                TokenValidationError::InternalError => AuthError::InternalError,
            })?;

        if !validated.token.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(validated.token))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let credential = extract_raw_token(parts)?;

        let identity = state
            .identity
            .authenticate(&credential)
            .map_err(|e| match e {
                Error::TokenExpired => AuthError::TokenExpired,
                Error::Forbidden => AuthError::NotIdentity,
                Error::Unauthorized => AuthError::InvalidToken,
                _ => AuthError::InternalError,
            })?;

        Ok(RequireIdentity(identity))
    }
}

fn extract_raw_token(parts: &Parts) -> Result<String, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    extract_token_from_header(auth_header)
        .map_err(|e| match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            _ => AuthError::InternalError,
        })?
        .ok_or(AuthError::MissingAuth)
}
