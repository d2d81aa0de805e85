//! Per-client session state.
//!
//! The resolver and the login pipeline read and write a small key-value map
//! per browser session. [`SessionStore`] is that map; [`MemorySession`]
//! backs tests and embedding hosts, [`SqliteSession`] persists entries in the
//! `session_entries` table for the CLI.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;
use crate::error::KanbanError;
use crate::timestamp::now_us;

/// Session key holding the current guest's identity id.
pub const GUEST_IDENTITY_KEY: &str = "guest_identity_id";

/// Session key holding the one-shot guest migration intent.
pub const MIGRATION_INTENT_KEY: &str = "guest_migration_action";

/// Session key holding the authenticated registered identity id.
pub const AUTH_IDENTITY_KEY: &str = "auth_identity_id";

/// Key-value state scoped to one client session.
pub trait SessionStore {
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// In-process session map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySession {
    entries: HashMap<String, String>,
}

impl MemorySession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Session entries stored in SQLite under one session key.
pub struct SqliteSession<'conn> {
    conn: &'conn Connection,
    session_key: String,
}

impl<'conn> SqliteSession<'conn> {
    pub fn new(conn: &'conn Connection, session_key: impl Into<String>) -> Self {
        Self {
            conn,
            session_key: session_key.into(),
        }
    }

    #[must_use]
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Drop every entry of this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&mut self) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM session_entries WHERE session_key = ?1",
            [&self.session_key],
        )?)
    }
}

impl SessionStore for SqliteSession<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM session_entries WHERE session_key = ?1 AND entry_key = ?2",
                params![self.session_key, key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session_entries (session_key, entry_key, value, updated_at_us)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (session_key, entry_key)
             DO UPDATE SET value = excluded.value, updated_at_us = excluded.updated_at_us",
            params![self.session_key, key, value, now_us()],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM session_entries WHERE session_key = ?1 AND entry_key = ?2",
            params![self.session_key, key],
        )?;
        Ok(())
    }
}

/// What a guest wants done with its boards on its next login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationIntent {
    /// Hand the guest's boards to the registered identity.
    Merge,
    /// Throw the guest's boards away.
    Discard,
}

impl MigrationIntent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Discard => "discard",
        }
    }
}

impl fmt::Display for MigrationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationIntent {
    type Err = KanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "discard" => Ok(Self::Discard),
            other => Err(KanbanError::InvalidValue {
                field: "migration intent",
                value: other.to_string(),
            }),
        }
    }
}

/// Parse an id-valued session entry. Garbage reads as absent.
fn id_entry(session: &dyn SessionStore, key: &str) -> Result<Option<i64>> {
    Ok(session
        .get(key)?
        .and_then(|raw| raw.trim().parse::<i64>().ok()))
}

/// Guest identity id remembered by this session.
///
/// # Errors
///
/// Returns an error if the session store cannot be read.
pub fn guest_identity_id(session: &dyn SessionStore) -> Result<Option<i64>> {
    id_entry(session, GUEST_IDENTITY_KEY)
}

/// Registered identity id this session is logged in as.
///
/// # Errors
///
/// Returns an error if the session store cannot be read.
pub fn authenticated_identity_id(session: &dyn SessionStore) -> Result<Option<i64>> {
    id_entry(session, AUTH_IDENTITY_KEY)
}

/// Pending migration intent. Unknown values are ignored with a warning.
///
/// # Errors
///
/// Returns an error if the session store cannot be read.
pub fn migration_intent(session: &dyn SessionStore) -> Result<Option<MigrationIntent>> {
    let Some(raw) = session.get(MIGRATION_INTENT_KEY)? else {
        return Ok(None);
    };
    match raw.parse() {
        Ok(intent) => Ok(Some(intent)),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unknown migration intent");
            Ok(None)
        }
    }
}

/// Store the migration intent for the next login.
///
/// # Errors
///
/// Returns an error if the session store cannot be written.
pub fn set_migration_intent(
    session: &mut dyn SessionStore,
    intent: MigrationIntent,
) -> Result<()> {
    session.set(MIGRATION_INTENT_KEY, intent.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn memory_session_roundtrip() {
        let mut session = MemorySession::new();
        assert!(session.get(GUEST_IDENTITY_KEY).expect("get").is_none());
        session.set(GUEST_IDENTITY_KEY, "7").expect("set");
        assert_eq!(guest_identity_id(&session).expect("read"), Some(7));
        session.delete(GUEST_IDENTITY_KEY).expect("delete");
        session.delete(GUEST_IDENTITY_KEY).expect("delete twice");
        assert!(guest_identity_id(&session).expect("read").is_none());
    }

    #[test]
    fn sqlite_sessions_are_isolated_by_key() {
        let conn = open_in_memory().expect("open");
        let mut laptop = SqliteSession::new(&conn, "laptop");
        let phone = SqliteSession::new(&conn, "phone");

        laptop.set(GUEST_IDENTITY_KEY, "1").expect("set");
        laptop.set(GUEST_IDENTITY_KEY, "2").expect("overwrite");

        assert_eq!(guest_identity_id(&laptop).expect("read"), Some(2));
        assert!(guest_identity_id(&phone).expect("read").is_none());

        assert_eq!(laptop.clear().expect("clear"), 1);
        assert!(guest_identity_id(&laptop).expect("read").is_none());
    }

    #[test]
    fn intent_parsing() {
        let mut session = MemorySession::new();
        assert!(migration_intent(&session).expect("read").is_none());

        set_migration_intent(&mut session, MigrationIntent::Merge).expect("set");
        assert_eq!(
            migration_intent(&session).expect("read"),
            Some(MigrationIntent::Merge)
        );

        session.set(MIGRATION_INTENT_KEY, "explode").expect("set");
        assert!(migration_intent(&session).expect("read").is_none());
        assert!("explode".parse::<MigrationIntent>().is_err());
        assert_eq!(
            "Discard".parse::<MigrationIntent>().expect("parse"),
            MigrationIntent::Discard
        );
    }

    #[test]
    fn malformed_guest_id_reads_as_absent() {
        let mut session = MemorySession::new();
        session.set(GUEST_IDENTITY_KEY, "not-a-number").expect("set");
        assert!(guest_identity_id(&session).expect("read").is_none());
    }
}
