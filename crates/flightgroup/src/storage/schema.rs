//! `SQLite` schema of the local pilot store.

/// Key/value table; holds the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Single-row table with the local pilot's credentials and last group.
pub const CREATE_IDENTITY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS identity (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    public_id TEXT NOT NULL DEFAULT '',
    secret_id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    avatar TEXT,
    group_id TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Chat history, one row per message key.
pub const CREATE_CHAT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL,
    pilot_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    text TEXT NOT NULL,
    UNIQUE (group_id, pilot_id, timestamp, idx)
)
";

/// Lookup of a group's history in time order.
pub const CREATE_CHAT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_chat_group_time ON chat_messages(group_id, timestamp)
";

/// Tables present from the first schema version on.
pub const BASE_STATEMENTS: &[&str] = &[CREATE_METADATA_TABLE, CREATE_IDENTITY_TABLE];

/// Statements added by schema version 2.
pub const CHAT_STATEMENTS: &[&str] = &[CREATE_CHAT_TABLE, CREATE_CHAT_INDEX];
