use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireIdentity;
use crate::collab::{self, InviteOutcome};
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{InviteRequest, InviteResponse, ShareRequest};
use crate::server::response::{ApiError, ApiResponse};

pub async fn invite(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let outcome = collab::invite(
        store,
        store,
        state.notifier.as_ref(),
        &identity,
        &id,
        &req.email,
        &state.public_base_url,
    )
    .await
    .map_err(|e| match e {
        Error::NotFound => ApiError::not_found("Document not found"),
        other => ApiError::from(other),
    })?;

    let (status, notified) = match &outcome {
        InviteOutcome::Invited { .. } => (StatusCode::CREATED, true),
        InviteOutcome::AlreadyMember => (StatusCode::OK, false),
        // Membership is committed even though the email was not delivered.
        InviteOutcome::NotificationFailed { .. } => (StatusCode::CREATED, false),
        InviteOutcome::NotFound => {
            return Err(ApiError::not_found("No user found with that email"));
        }
        InviteOutcome::Forbidden => {
            return Err(ApiError::forbidden(
                "Only the document owner can invite collaborators",
            ));
        }
    };

    Ok::<_, ApiError>((
        status,
        Json(ApiResponse::success(InviteResponse { outcome, notified })),
    ))
}

pub async fn remove_collaborator(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path((id, uid)): Path<(String, String)>,
) -> impl IntoResponse {
    let removed = collab::remove_collaborator(state.store.as_ref(), &identity, &id, &uid)
        .map_err(|e| match e {
            Error::NotFound => ApiError::not_found("Document not found"),
            other => ApiError::from(other),
        })?;

    if !removed {
        return Err(ApiError::not_found("Collaborator not found"));
    }

    tracing::info!("{} removed {} from {}", identity.uid, uid, id);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn share(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShareRequest>,
) -> impl IntoResponse {
    collab::share(
        state.notifier.as_ref(),
        &identity,
        &req.email,
        &req.code,
        req.language,
    )
    .await?;

    Ok::<_, ApiError>(StatusCode::ACCEPTED)
}
