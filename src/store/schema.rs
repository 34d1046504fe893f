pub const SCHEMA: &str = r#"
-- Identities are registered by the identity provider; email is the directory lookup key
CREATE TABLE IF NOT EXISTS identities (
    uid TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are auth credentials; non-admin tokens must belong to an identity
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,  -- admin tokens only access /api/v1/admin/* routes

    -- Identity binding (required for non-admin tokens, NULL only for admin tokens)
    identity_id TEXT REFERENCES identities(uid) ON DELETE CASCADE,

    -- Lifecycle
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,            -- NULL = never
    last_used_at TEXT
);

-- Documents are not tied to identities by foreign key: deleting one never touches the other
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    owner TEXT,                 -- NULL until the record is initialized
    collaborators TEXT,         -- JSON array of uids; NULL or malformed = not initialized
    title TEXT NOT NULL DEFAULT 'Untitled',
    code TEXT NOT NULL DEFAULT '',
    language TEXT NOT NULL DEFAULT 'plaintext',
    created_at TEXT DEFAULT (datetime('now')),
    last_edited TEXT DEFAULT (datetime('now'))
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_identity ON tokens(identity_id);
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner);
"#;
