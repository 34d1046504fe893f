use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::feed::{DocumentEvent, Feed, Subscription};
use super::schema::SCHEMA;
use super::{Directory, DocumentStore, Store};
use crate::error::{Error, Result};
use crate::types::*;

const DOCUMENT_COLUMNS: &str =
    "id, owner, collaborators, title, code, language, created_at, last_edited";
const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, is_admin, identity_id, created_at, expires_at, last_used_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    feed: Feed,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
            feed: Feed::new(),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    /// Call [`SqliteStore::notify_changed`] afterwards so live subscribers see the write.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    /// Re-publishes the current state of a document to its live subscribers.
    pub fn notify_changed(&self, id: &str) -> Result<()> {
        let conn = self.conn();
        let event = match read_document(&conn, id)? {
            Some(doc) => DocumentEvent::Changed(doc),
            None => DocumentEvent::Deleted,
        };
        self.feed.publish(id, event);
        Ok(())
    }

    #[must_use]
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Reads the document under the held lock and publishes it.
    fn publish_current(&self, conn: &Connection, id: &str) -> Result<Document> {
        let doc = read_document(conn, id)?.ok_or(Error::NotFound)?;
        self.feed.publish(id, DocumentEvent::Changed(doc.clone()));
        Ok(doc)
    }

    fn write_collaborators<F>(&self, id: &str, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let row: Option<(Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT owner, collaborators FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (owner, raw) = row.ok_or(Error::NotFound)?;

        // Never replace a collaborator set that has not been written yet.
        let mut collaborators = parse_collaborators(id, raw.as_deref())
            .filter(|_| owner.is_some())
            .ok_or(Error::NotReady)?;
        if !mutate(&mut collaborators) {
            return Ok(false);
        }

        tx.execute(
            "UPDATE documents SET collaborators = ?1 WHERE id = ?2",
            params![serde_json::to_string(&collaborators)?, id],
        )?;
        tx.commit()?;

        self.publish_current(&conn, id)?;
        Ok(true)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Malformed or missing collaborator arrays mean the document is not initialized.
fn parse_collaborators(id: &str, raw: Option<&str>) -> Option<BTreeSet<String>> {
    let raw = raw?;
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(uids) => Some(uids.into_iter().collect()),
        Err(e) => {
            tracing::warn!("Malformed collaborators for document {id}: {e}");
            None
        }
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let collaborators = parse_collaborators(&id, row.get::<_, Option<String>>(2)?.as_deref());
    let language = Language::parse(&row.get::<_, String>(5)?).unwrap_or_default();

    Ok(Document {
        owner: row.get(1)?,
        collaborators,
        title: row.get(3)?,
        code: row.get(4)?,
        language,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        last_edited: parse_datetime(&row.get::<_, String>(7)?),
        id,
    })
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        identity_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

fn read_document(conn: &Connection, id: &str) -> Result<Option<Document>> {
    conn.query_row(
        &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
        params![id],
        document_from_row,
    )
    .optional()
    .map_err(Error::from)
}

impl DocumentStore for SqliteStore {
    fn create_document(&self, doc: &NewDocument) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = format_datetime(&Utc::now());
        let collaborators = doc
            .collaborators
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO documents (id, owner, collaborators, title, code, language, created_at, last_edited)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                doc.owner,
                collaborators,
                doc.title,
                doc.code,
                doc.language.as_str(),
                now,
            ],
        )?;

        self.publish_current(&conn, &id)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>> {
        read_document(&self.conn(), id)
    }

    fn update_document(&self, id: &str, patch: &DocumentPatch) -> Result<Document> {
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE documents SET
                title = COALESCE(?1, title),
                code = COALESCE(?2, code),
                language = COALESCE(?3, language),
                last_edited = ?4
             WHERE id = ?5",
            params![
                patch.title,
                patch.code,
                patch.language.map(Language::as_str),
                format_datetime(&Utc::now()),
                id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }

        self.publish_current(&conn, id)
    }

    fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.feed.publish(id, DocumentEvent::Deleted);
        }
        Ok(rows > 0)
    }

    fn add_collaborator(&self, id: &str, uid: &str) -> Result<bool> {
        self.write_collaborators(id, |set| set.insert(uid.to_string()))
    }

    fn remove_collaborator(&self, id: &str, uid: &str) -> Result<bool> {
        self.write_collaborators(id, |set| set.remove(uid))
    }

    fn list_member_documents(&self, uid: &str) -> Result<Vec<Document>> {
        let conn = self.conn();
        // instr() narrows candidates; membership is confirmed on the parsed set below
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE owner = ?1 OR instr(collaborators, ?2) > 0"
        ))?;

        let rows = stmt.query_map(params![uid, serde_json::to_string(uid)?], document_from_row)?;

        let mut docs = rows
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|d| {
                d.is_owned_by(uid)
                    || d.collaborators
                        .as_ref()
                        .is_some_and(|c| c.contains(uid))
            })
            .collect::<Vec<_>>();

        docs.sort_by(|a, b| b.last_edited.cmp(&a.last_edited));
        Ok(docs)
    }

    fn subscribe(&self, id: &str) -> Result<Subscription> {
        let conn = self.conn();
        let snapshot = match read_document(&conn, id)? {
            Some(doc) => DocumentEvent::Changed(doc),
            None => DocumentEvent::Deleted,
        };
        Ok(self.feed.subscribe(id, snapshot))
    }
}

impl Directory for SqliteStore {
    fn get_identity(&self, uid: &str) -> Result<Option<Identity>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT uid, email, display_name, created_at FROM identities WHERE uid = ?1",
            params![uid],
            identity_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT uid, email, display_name, created_at FROM identities WHERE email = ?1",
            params![email],
            identity_from_row,
        )
        .optional()
        .map_err(Error::from)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Identity operations

    fn create_identity(&self, identity: &Identity) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO identities (uid, email, display_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.uid,
                identity.email,
                identity.display_name,
                format_datetime(&identity.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyExists)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn list_identities(&self, cursor: &str, limit: i32) -> Result<Vec<Identity>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT uid, email, display_name, created_at
             FROM identities WHERE uid > ?1 ORDER BY uid LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], identity_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_identity(&self, uid: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM identities WHERE uid = ?1", params![uid])?;
        Ok(rows > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, identity_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.identity_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"),
            params![id],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_identity_tokens(&self, identity_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE identity_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![identity_id], token_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: uid.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = open_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"identities".to_string()));
        assert!(tables.contains(&"tokens".to_string()));
        assert!(tables.contains(&"documents".to_string()));
    }

    #[test]
    fn test_identity_crud() {
        let (_temp, store) = open_store();

        store.create_identity(&identity("alice")).unwrap();

        let fetched = store.get_identity("alice").unwrap().unwrap();
        assert_eq!(fetched.email, "alice@example.com");

        let by_email = store
            .find_identity_by_email("alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.uid, "alice");
        assert!(store.find_identity_by_email("nobody@example.com").unwrap().is_none());

        let duplicate = store.create_identity(&identity("alice"));
        assert!(matches!(duplicate, Err(Error::AlreadyExists)));

        assert!(store.delete_identity("alice").unwrap());
        assert!(store.get_identity("alice").unwrap().is_none());
    }

    #[test]
    fn test_document_create_and_update() {
        let (_temp, store) = open_store();

        let created = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        assert!(created.is_initialized());
        assert_eq!(created.title, "Untitled");
        assert_eq!(created.collaborators, Some(BTreeSet::new()));

        let patch = DocumentPatch {
            title: Some("hello".to_string()),
            code: Some("print('hi')".to_string()),
            language: Some(Language::Python),
        };
        let updated = store.update_document(&created.id, &patch).unwrap();
        assert_eq!(updated.title, "hello");
        assert_eq!(updated.language, Language::Python);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.last_edited >= created.last_edited);

        let partial = DocumentPatch {
            code: Some("print('bye')".to_string()),
            ..Default::default()
        };
        let updated = store.update_document(&created.id, &partial).unwrap();
        assert_eq!(updated.title, "hello");
        assert_eq!(updated.code, "print('bye')");
    }

    #[test]
    fn test_update_missing_document_does_not_recreate() {
        let (_temp, store) = open_store();

        let result = store.update_document("missing", &DocumentPatch::default());
        assert!(matches!(result, Err(Error::NotFound)));
        assert!(store.get_document("missing").unwrap().is_none());
    }

    #[test]
    fn test_add_collaborator_is_idempotent() {
        let (_temp, store) = open_store();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();

        assert!(store.add_collaborator(&doc.id, "bob").unwrap());
        assert!(!store.add_collaborator(&doc.id, "bob").unwrap());

        let fetched = store.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(fetched.collaborators.unwrap().len(), 1);

        assert!(store.remove_collaborator(&doc.id, "bob").unwrap());
        assert!(!store.remove_collaborator(&doc.id, "bob").unwrap());

        let missing = store.add_collaborator("missing", "bob");
        assert!(matches!(missing, Err(Error::NotFound)));
    }

    #[test]
    fn test_malformed_collaborators_read_as_uninitialized() {
        let (_temp, store) = open_store();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();

        store
            .connection()
            .execute(
                "UPDATE documents SET collaborators = 'not json' WHERE id = ?1",
                params![doc.id],
            )
            .unwrap();

        let fetched = store.get_document(&doc.id).unwrap().unwrap();
        assert!(fetched.collaborators.is_none());
        assert!(!fetched.is_initialized());
    }

    #[test]
    fn test_collaborator_writes_wait_for_initialization() {
        let (_temp, store) = open_store();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();

        store
            .connection()
            .execute(
                "UPDATE documents SET collaborators = '[\"bob\"' WHERE id = ?1",
                params![doc.id],
            )
            .unwrap();

        let added = store.add_collaborator(&doc.id, "carol");
        assert!(matches!(added, Err(Error::NotReady)));
        let removed = store.remove_collaborator(&doc.id, "bob");
        assert!(matches!(removed, Err(Error::NotReady)));

        let raw: String = store
            .connection()
            .query_row(
                "SELECT collaborators FROM documents WHERE id = ?1",
                params![doc.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, "[\"bob\"");

        let mut ownerless = NewDocument::for_owner("alice");
        ownerless.owner = None;
        let pending = store.create_document(&ownerless).unwrap();
        assert!(matches!(
            store.add_collaborator(&pending.id, "bob"),
            Err(Error::NotReady)
        ));
    }

    #[test]
    fn test_list_member_documents() {
        let (_temp, store) = open_store();

        let owned = store.create_document(&NewDocument::for_owner("alice")).unwrap();
        let shared = store.create_document(&NewDocument::for_owner("bob")).unwrap();
        let unrelated = store.create_document(&NewDocument::for_owner("carol")).unwrap();
        // "ali" is a substring of "alice"; it must not match
        store.add_collaborator(&unrelated.id, "ali").unwrap();
        store.add_collaborator(&shared.id, "alice").unwrap();

        store
            .update_document(&owned.id, &DocumentPatch::default())
            .unwrap();

        let docs = store.list_member_documents("alice").unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![owned.id.as_str(), shared.id.as_str()]);
    }

    #[tokio::test]
    async fn test_subscribe_snapshot_and_delete() {
        let (_temp, store) = open_store();
        let doc = store.create_document(&NewDocument::for_owner("alice")).unwrap();

        let mut sub = store.subscribe(&doc.id).unwrap();
        assert_eq!(sub.recv().await.unwrap(), DocumentEvent::Changed(doc.clone()));

        store.add_collaborator(&doc.id, "bob").unwrap();
        match sub.recv().await.unwrap() {
            DocumentEvent::Changed(d) => assert!(d.collaborators.unwrap().contains("bob")),
            DocumentEvent::Deleted => panic!("unexpected delete"),
        }

        assert!(store.delete_document(&doc.id).unwrap());
        assert_eq!(sub.recv().await.unwrap(), DocumentEvent::Deleted);
    }

    #[tokio::test]
    async fn test_subscribe_missing_document_signals_deleted() {
        let (_temp, store) = open_store();
        let mut sub = store.subscribe("missing").unwrap();
        assert_eq!(sub.recv().await.unwrap(), DocumentEvent::Deleted);
    }

    #[test]
    fn test_token_lookup_collision() {
        let (_temp, store) = open_store();

        let token1 = Token {
            id: "token-1".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup123".to_string(),
            is_admin: true,
            identity_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.create_token(&token1).unwrap();
        assert!(store.has_admin_token().unwrap());

        let token2 = Token {
            id: "token-2".to_string(),
            token_hash: "hash2".to_string(),
            token_lookup: "lookup123".to_string(), // Same lookup
            ..token1.clone()
        };

        let result = store.create_token(&token2);
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
    }

    #[test]
    fn test_identity_tokens_cascade() {
        let (_temp, store) = open_store();
        store.create_identity(&identity("alice")).unwrap();

        let token = Token {
            id: "token-1".to_string(),
            token_hash: "hash".to_string(),
            token_lookup: "abcd1234".to_string(),
            is_admin: false,
            identity_id: Some("alice".to_string()),
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.create_token(&token).unwrap();
        assert_eq!(store.list_identity_tokens("alice").unwrap().len(), 1);

        store.delete_identity("alice").unwrap();
        assert!(store.get_token_by_id("token-1").unwrap().is_none());
    }
}
