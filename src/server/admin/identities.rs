use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireAdmin, TokenGenerator};
use crate::collab::validate_email;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    CreateIdentityRequest, CreateIdentityTokenRequest, CreateTokenResponse, PaginationParams,
    TokenResponse,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{validate_display_name, validate_uid};
use crate::types::Identity;

pub async fn create_identity(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIdentityRequest>,
) -> impl IntoResponse {
    let uid = req.uid.unwrap_or_else(|| Uuid::new_v4().to_string());
    validate_uid(&uid)?;
    let email = validate_email(&req.email)?.to_string();

    let display_name = req.display_name.unwrap_or_else(|| email.clone());
    validate_display_name(&display_name)?;

    let identity = Identity {
        uid,
        email,
        display_name,
        created_at: Utc::now(),
    };

    match state.store.create_identity(&identity) {
        Ok(()) => {}
        Err(Error::AlreadyExists) => {
            return Err(ApiError::conflict(
                "An identity with that uid or email already exists",
            ));
        }
        Err(_) => return Err(ApiError::internal("Failed to create identity")),
    }

    tracing::info!("Created identity {}", identity.uid);

    Ok((StatusCode::CREATED, Json(ApiResponse::success(identity))))
}

pub async fn list_identities(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let identities = state
        .store
        .list_identities(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list identities")?;

    let (identities, next_cursor, has_more) =
        paginate(identities, DEFAULT_PAGE_SIZE as usize, |i| i.uid.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(
        identities,
        next_cursor,
        has_more,
    )))
}

pub async fn get_identity(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> impl IntoResponse {
    let identity = state
        .store
        .get_identity(&uid)
        .api_err("Failed to get identity")?
        .or_not_found("Identity not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(identity)))
}

pub async fn delete_identity(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_identity(&uid)
        .api_err("Failed to delete identity")?;

    if !deleted {
        return Err(ApiError::not_found("Identity not found"));
    }

    state.sessions.revoke(&uid);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_identity_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> impl IntoResponse {
    let identity = state
        .store
        .get_identity(&uid)
        .api_err("Failed to get identity")?
        .or_not_found("Identity not found")?;

    let tokens = state
        .store
        .list_identity_tokens(&identity.uid)
        .api_err("Failed to list identity tokens")?;

    let responses: Vec<TokenResponse> = tokens.into_iter().map(TokenResponse::from).collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn create_identity_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    body: Option<Json<CreateIdentityTokenRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let identity = state
        .store
        .get_identity(&uid)
        .api_err("Failed to get identity")?
        .or_not_found("Identity not found")?;

    if let Some(seconds) = req.expires_in_seconds {
        if seconds < 0 {
            return Err(ApiError::bad_request(
                "expires_in_seconds cannot be negative",
            ));
        }
    }
    let expires_in = req.expires_in_seconds.map(Duration::seconds);

    let generator = TokenGenerator::new();

    const MAX_RETRIES: u32 = 3;
    for _ in 0..MAX_RETRIES {
        let issued = generator
            .issue(Some(&identity.uid), expires_in)
            .map_err(|_| ApiError::internal("Failed to generate token"))?;

        match state.store.create_token(&issued.token) {
            Ok(()) => {
                return Ok((
                    StatusCode::CREATED,
                    Json(ApiResponse::success(CreateTokenResponse {
                        token: issued.raw,
                        metadata: TokenResponse::from(issued.token),
                    })),
                ));
            }
            Err(Error::TokenLookupCollision) => continue,
            Err(_) => return Err(ApiError::internal("Failed to create token")),
        }
    }

    Err(ApiError::internal("Failed to create token after retries"))
}
