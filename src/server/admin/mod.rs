mod identities;
mod tokens;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // Identity routes
        .route("/identities", post(identities::create_identity))
        .route("/identities", get(identities::list_identities))
        .route("/identities/{uid}", get(identities::get_identity))
        .route("/identities/{uid}", delete(identities::delete_identity))
        .route(
            "/identities/{uid}/tokens",
            get(identities::list_identity_tokens),
        )
        .route(
            "/identities/{uid}/tokens",
            post(identities::create_identity_token),
        )
        // Token routes
        .route("/tokens/{id}", get(tokens::get_token))
        .route("/tokens/{id}", delete(tokens::delete_token))
}
