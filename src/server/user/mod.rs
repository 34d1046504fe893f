pub mod access;
mod documents;
mod identity;
mod live;
mod members;
mod run;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(identity::get_me))
        // Documents
        .route("/documents", get(documents::list_documents))
        .route("/documents", post(documents::create_document))
        .route("/documents/{id}", get(documents::get_document))
        .route("/documents/{id}", put(documents::save_document))
        .route("/documents/{id}", delete(documents::delete_document))
        .route("/documents/{id}/export", get(run::export_document))
        .route("/documents/{id}/run", post(run::run_document))
        .route("/documents/{id}/live", get(live::live_document))
        // Membership
        .route("/documents/{id}/invitations", post(members::invite))
        .route(
            "/documents/{id}/collaborators/{uid}",
            delete(members::remove_collaborator),
        )
        .route("/share", post(members::share))
}
