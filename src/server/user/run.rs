use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::IntoResponse,
};

use crate::auth::RequireIdentity;
use crate::exec;
use crate::export::export;
use crate::server::AppState;
use crate::server::dto::RunRequest;
use crate::server::response::{ApiError, ApiResponse};

use super::access::require_document;

/// Runs the editor's current (possibly unsaved) code. Nothing is persisted.
pub async fn run_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RunRequest>,
) -> impl IntoResponse {
    require_document(state.store.as_ref(), &identity, &id)?;

    let Some(executor) = state.executor.as_ref() else {
        return Err(ApiError::unavailable("Code execution is not configured"));
    };

    let key = format!("{}:{}", identity.uid, id);
    let output = exec::run(
        executor.as_ref(),
        &state.executions,
        &key,
        &req.code,
        req.language,
    )
    .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(output)))
}

pub async fn export_document(
    RequireIdentity(identity): RequireIdentity,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (document, _) = require_document(state.store.as_ref(), &identity, &id)?;
    let file = export(&document);

    // Header values must be visible ASCII.
    let ascii_name: String = file
        .file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{ascii_name}\""))
        .map_err(|_| ApiError::internal("Invalid export file name"))?;

    Ok::<_, ApiError>((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.contents,
    ))
}
