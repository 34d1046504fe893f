mod feed;
mod schema;
mod sqlite;

pub use feed::{DocumentEvent, FEED_CAPACITY, Feed, Subscription};
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// The authoritative document store: point reads and writes plus live subscription.
pub trait DocumentStore: Send + Sync {
    fn create_document(&self, doc: &NewDocument) -> Result<Document>;
    fn get_document(&self, id: &str) -> Result<Option<Document>>;
    /// Applies `patch` and bumps `last_edited`. Returns `Error::NotFound` for a
    /// missing document rather than recreating it.
    fn update_document(&self, id: &str, patch: &DocumentPatch) -> Result<Document>;
    fn delete_document(&self, id: &str) -> Result<bool>;

    // Collaborator set operations. Both return whether the set changed.
    fn add_collaborator(&self, id: &str, uid: &str) -> Result<bool>;
    fn remove_collaborator(&self, id: &str, uid: &str) -> Result<bool>;

    /// Documents `uid` owns or collaborates on, most recently edited first.
    fn list_member_documents(&self, uid: &str) -> Result<Vec<Document>>;

    /// Opens a live subscription. The first event is the current state, or
    /// `DocumentEvent::Deleted` if the document does not exist.
    fn subscribe(&self, id: &str) -> Result<Subscription>;
}

/// Identity directory used to resolve invitation targets.
pub trait Directory: Send + Sync {
    fn get_identity(&self, uid: &str) -> Result<Option<Identity>>;
    fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>>;
}

/// Store defines the full database interface.
pub trait Store: DocumentStore + Directory {
    fn initialize(&self) -> Result<()>;

    // Identity operations
    fn create_identity(&self, identity: &Identity) -> Result<()>;
    fn list_identities(&self, cursor: &str, limit: i32) -> Result<Vec<Identity>>;
    fn delete_identity(&self, uid: &str) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_identity_tokens(&self, identity_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Admin token check
    fn has_admin_token(&self) -> Result<bool>;
}
