use std::fmt;
use std::path::PathBuf;

use crate::lock::LockError;
use crate::model::Entity;

/// Machine-readable error codes surfaced by the CLI and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    NotFound,
    GroupMismatch,
    IntegrityViolation,
    InvalidEnumValue,
    CorruptStore,
    StorageFailure,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::GroupMismatch => "E2002",
            Self::IntegrityViolation => "E2003",
            Self::InvalidEnumValue => "E2004",
            Self::CorruptStore => "E3001",
            Self::StorageFailure => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Not Found",
            Self::GroupMismatch => "Entities belong to different groups",
            Self::IntegrityViolation => "Invalid data. Please check your input.",
            Self::InvalidEnumValue => "Invalid priority/intent value",
            Self::CorruptStore => "Corrupt SQLite store",
            Self::StorageFailure => "Storage failure",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `kb init` to create the store."),
            Self::ConfigParseError => Some("Fix syntax in .kanban/config.toml and retry."),
            Self::NotFound | Self::GroupMismatch => None,
            Self::IntegrityViolation => Some("Titles must be non-empty and unique within a board."),
            Self::InvalidEnumValue => Some("Use one of: low, medium, high / merge, discard."),
            Self::CorruptStore => Some("Restore the database from a backup."),
            Self::StorageFailure => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Another sweep is running; retry on the next schedule."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the ordering engine, the board services and the guest
/// lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum KanbanError {
    /// A referenced entity is absent, or not visible to the requesting owner.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// A move was attempted across two different ordering groups.
    #[error("{entity} {id} and {target} are not in the same group")]
    GroupMismatch { entity: Entity, id: i64, target: i64 },

    /// A uniqueness or check constraint rejected the write.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// A textual value did not parse into one of the known variants.
    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// Any other SQLite failure.
    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    /// A login pipeline step needed the registered identity before the
    /// pre-create stage produced it.
    #[error("login step '{0}' ran before the registered identity was resolved")]
    IdentityUnresolved(&'static str),

    /// `.kanban/config.toml` exists but could not be read or parsed.
    #[error("failed to load {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// The database file is damaged, not SQLite, or written by a newer
    /// schema than this build understands.
    #[error("corrupt store: {0}")]
    CorruptStore(String),

    /// The sweep lock could not be acquired.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl KanbanError {
    #[must_use]
    pub const fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::GroupMismatch { .. } => ErrorCode::GroupMismatch,
            Self::IntegrityViolation(_) => ErrorCode::IntegrityViolation,
            Self::InvalidValue { .. } => ErrorCode::InvalidEnumValue,
            Self::Storage(_) => ErrorCode::StorageFailure,
            Self::IdentityUnresolved(_) => ErrorCode::InternalUnexpected,
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::CorruptStore(_) => ErrorCode::CorruptStore,
            Self::Lock(err) => err.code(),
        }
    }

    /// Whether the client should see a "Not Found" response.
    ///
    /// Cross-group moves are reported the same way as dangling ids.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::GroupMismatch { .. })
    }
}

impl From<rusqlite::Error> for KanbanError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::IntegrityViolation(message.unwrap_or_else(|| failure.to_string()))
            }
            rusqlite::Error::SqliteFailure(failure, message)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
                ) =>
            {
                Self::CorruptStore(message.unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Storage(other),
        }
    }
}

/// Result alias used across the library.
pub type Result<T, E = KanbanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{ErrorCode, KanbanError};
    use crate::model::Entity;
    use rusqlite::Connection;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::NotFound,
            ErrorCode::GroupMismatch,
            ErrorCode::IntegrityViolation,
            ErrorCode::InvalidEnumValue,
            ErrorCode::CorruptStore,
            ErrorCode::StorageFailure,
            ErrorCode::LockContention,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn constraint_failures_become_integrity_violations() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("CREATE TABLE t (name TEXT NOT NULL UNIQUE)")
            .expect("create table");
        conn.execute("INSERT INTO t (name) VALUES ('a')", [])
            .expect("first insert");
        let err: KanbanError = conn
            .execute("INSERT INTO t (name) VALUES ('a')", [])
            .expect_err("duplicate must fail")
            .into();

        assert!(matches!(err, KanbanError::IntegrityViolation(_)));
        assert_eq!(err.code(), ErrorCode::IntegrityViolation);
        assert!(!err.is_not_found());
    }

    #[test]
    fn garbage_file_is_a_corrupt_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("kanban.db");
        std::fs::write(&path, vec![0x5a_u8; 4096]).expect("write garbage");

        let conn = Connection::open(&path).expect("open is lazy");
        let err: KanbanError = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .expect_err("not a database")
            .into();
        assert_eq!(err.code(), ErrorCode::CorruptStore);
    }

    #[test]
    fn group_mismatch_is_reported_as_not_found() {
        let err = KanbanError::GroupMismatch {
            entity: Entity::Column,
            id: 3,
            target: 9,
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "column 3 and 9 are not in the same group");
        assert!(KanbanError::not_found(Entity::Card, 1).is_not_found());
    }
}
