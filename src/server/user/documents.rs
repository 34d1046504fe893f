use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireIdentity;
use crate::server::AppState;
use crate::server::dto::{CreateDocumentRequest, DocumentResponse, DocumentSummary};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::validate_title;
use crate::sync::{SaveOutcome, save_document as save};
use crate::types::{DocumentPatch, NewDocument, Role};

use super::access::{require_document, require_owner};

pub async fn list_documents(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let documents = state
        .store
        .list_member_documents(&identity.uid)
        .api_err("Failed to list documents")?;

    let summaries: Vec<DocumentSummary> = documents
        .into_iter()
        .map(|d| DocumentSummary {
            role: if d.is_owned_by(&identity.uid) {
                Role::Owner
            } else {
                Role::Collaborator
            },
            id: d.id,
            title: d.title,
            language: d.language,
            last_edited: d.last_edited,
        })
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(summaries)))
}

pub async fn create_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateDocumentRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let mut new_doc = NewDocument::for_owner(&identity.uid);
    if let Some(title) = req.title {
        validate_title(&title)?;
        new_doc.title = title;
    }
    if let Some(code) = req.code {
        new_doc.code = code;
    }
    if let Some(language) = req.language {
        new_doc.language = language;
    }

    let document = state
        .store
        .create_document(&new_doc)
        .api_err("Failed to create document")?;

    tracing::info!("{} created document {}", identity.uid, document.id);

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(DocumentResponse {
            document,
            role: Role::Owner,
        })),
    ))
}

pub async fn get_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (document, role) = require_document(state.store.as_ref(), &identity, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(DocumentResponse { document, role })))
}

pub async fn save_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<DocumentPatch>,
) -> impl IntoResponse {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }

    match save(state.store.as_ref(), &identity, &id, &patch)? {
        SaveOutcome::Saved(document) => {
            let role = if document.is_owned_by(&identity.uid) {
                Role::Owner
            } else {
                Role::Collaborator
            };
            Ok::<_, ApiError>(Json(ApiResponse::success(DocumentResponse { document, role })))
        }
        SaveOutcome::Gone => Err(ApiError::gone("Document no longer exists")),
        SaveOutcome::Denied => Err(ApiError::forbidden(
            "You no longer have access to this document",
        )),
    }
}

pub async fn delete_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let document = require_owner(state.store.as_ref(), &identity, &id)?;

    state
        .store
        .delete_document(&document.id)
        .api_err("Failed to delete document")?;

    tracing::info!("{} deleted document {}", identity.uid, document.id);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
