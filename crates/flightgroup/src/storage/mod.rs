//! Local persistence: the pilot's identity, last confirmed group and chat
//! history.
//!
//! The client core never touches the store. The runtime writes to it when
//! the client reports identity, group or chat changes, and reads it once at
//! startup.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::protocol::{GroupId, PilotId, TextMessage};

/// What a previous run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedState {
    /// Credentials and profile.
    pub identity: Identity,
    /// Last group the server confirmed.
    pub group: GroupId,
}

/// `SQLite` store for one pilot.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// the schema cannot be migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// A throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // Identity

    /// Load the saved identity and group, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load(&self) -> Result<Option<SavedState>> {
        let state = self
            .conn
            .query_row(
                "SELECT public_id, secret_id, name, avatar, group_id FROM identity WHERE slot = 0",
                [],
                |row| {
                    Ok(SavedState {
                        identity: Identity {
                            public_id: PilotId::new(row.get::<_, String>(0)?),
                            secret_id: row.get(1)?,
                            name: row.get(2)?,
                            avatar: row.get(3)?,
                        },
                        group: GroupId::new(row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Load just the identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load_identity(&self) -> Result<Option<Identity>> {
        Ok(self.load()?.map(|state| state.identity))
    }

    /// Save credentials and profile, keeping the stored group.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_identity(&self, identity: &Identity) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO identity (slot, public_id, secret_id, name, avatar)
            VALUES (0, ?1, ?2, ?3, ?4)
            ON CONFLICT(slot) DO UPDATE SET
                public_id = excluded.public_id,
                secret_id = excluded.secret_id,
                name = excluded.name,
                avatar = excluded.avatar,
                updated_at = datetime('now')
            ",
            params![
                identity.public_id.as_str(),
                identity.secret_id,
                identity.name,
                identity.avatar,
            ],
        )?;
        debug!(pilot = %identity.public_id, "Saved identity");
        Ok(())
    }

    /// Save the confirmed group.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_group(&self, group: &GroupId) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO identity (slot, group_id) VALUES (0, ?1)
            ON CONFLICT(slot) DO UPDATE SET
                group_id = excluded.group_id,
                updated_at = datetime('now')
            ",
            [group.as_str()],
        )?;
        debug!(%group, "Saved group");
        Ok(())
    }

    /// Forget the identity and group. Chat history is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_identity(&self) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM identity", [])?;
        Ok(removed > 0)
    }

    // Chat

    /// Store a chat message. Returns `false` if it was already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn insert_message(&self, message: &TextMessage) -> Result<bool> {
        let inserted = self.conn.execute(
            r"
            INSERT OR IGNORE INTO chat_messages (group_id, pilot_id, timestamp, idx, text)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                message.group_id.as_str(),
                message.pilot_id.as_str(),
                message.timestamp,
                message.index,
                message.text,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// The newest `limit` messages of a group, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn messages_for_group(&self, group: &GroupId, limit: usize) -> Result<Vec<TextMessage>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT group_id, pilot_id, timestamp, idx, text FROM (
                SELECT * FROM chat_messages WHERE group_id = ?1
                ORDER BY timestamp DESC, pilot_id DESC, idx DESC LIMIT ?2
            ) ORDER BY timestamp, pilot_id, idx
            ",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let messages = stmt
            .query_map(params![group.as_str(), limit], |row| {
                Ok(TextMessage {
                    group_id: GroupId::new(row.get::<_, String>(0)?),
                    pilot_id: PilotId::new(row.get::<_, String>(1)?),
                    timestamp: row.get(2)?,
                    index: row.get(3)?,
                    text: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Timestamp of the newest stored message of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_timestamp(&self, group: &GroupId) -> Result<Option<i64>> {
        let latest = self.conn.query_row(
            "SELECT MAX(timestamp) FROM chat_messages WHERE group_id = ?1",
            [group.as_str()],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// Number of stored messages across all groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn message_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Delete messages older than `age`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn prune_messages_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = (Utc::now() - age).timestamp_millis();
        let removed = self
            .conn
            .execute("DELETE FROM chat_messages WHERE timestamp < ?1", [cutoff])?;
        if removed > 0 {
            info!(removed, "Pruned old chat messages");
        }
        Ok(removed)
    }
}
