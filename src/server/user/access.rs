use crate::error::Error;
use crate::server::response::ApiError;
use crate::store::DocumentStore;
use crate::sync::open_document;
use crate::types::{Document, Identity, Role};

/// Loads a document the identity may edit, mapping each refusal to its response.
pub fn require_document<S>(
    store: &S,
    identity: &Identity,
    id: &str,
) -> Result<(Document, Role), ApiError>
where
    S: DocumentStore + ?Sized,
{
    open_document(store, identity, id).map_err(|e| match e {
        Error::NotFound => ApiError::not_found("Document not found"),
        other => ApiError::from(other),
    })
}

/// Loads a document and requires the identity to own it.
pub fn require_owner<S>(store: &S, identity: &Identity, id: &str) -> Result<Document, ApiError>
where
    S: DocumentStore + ?Sized,
{
    match require_document(store, identity, id)? {
        (document, Role::Owner) => Ok(document),
        (_, Role::Collaborator) => Err(ApiError::forbidden(
            "Only the document owner can do that",
        )),
    }
}
