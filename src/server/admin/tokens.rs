use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::TokenResponse;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

pub async fn get_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let token = state
        .store
        .get_token_by_id(&id)
        .api_err("Failed to get token")?
        .or_not_found("Token not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TokenResponse::from(token))))
}

pub async fn delete_token(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let token = state
        .store
        .get_token_by_id(&id)
        .api_err("Failed to get token")?
        .or_not_found("Token not found")?;

    if token.id == admin.0.id {
        return Err(ApiError::bad_request("Cannot delete current token"));
    }

    state
        .store
        .delete_token(&token.id)
        .api_err("Failed to delete token")?;

    // Live sessions end once the identity holds no tokens at all.
    if let Some(uid) = &token.identity_id {
        let remaining = state
            .store
            .list_identity_tokens(uid)
            .api_err("Failed to list tokens")?;
        if remaining.is_empty() {
            state.sessions.revoke(uid);
        }
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
