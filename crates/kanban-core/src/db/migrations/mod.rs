//! Versioned upgrades of the kanban store.
//!
//! The applied version lives in two places that must agree: `PRAGMA
//! user_version` and the single `store_meta` row. A store whose version is
//! ahead of [`LATEST_SCHEMA_VERSION`], or whose two records disagree, is
//! refused as corrupt rather than written to.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use super::schema;
use crate::Result;
use crate::error::KanbanError;

/// One schema step.
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core tables",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "ordering and sweep indexes",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Schema version written by this build.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Version recorded in `PRAGMA user_version`.
///
/// # Errors
///
/// Returns [`KanbanError::CorruptStore`] for a negative or oversized value.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version)
        .map_err(|_| KanbanError::CorruptStore(format!("user_version {version} out of range")))
}

fn meta_version(conn: &Connection) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT schema_version FROM store_meta WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`].
///
/// Each pending step commits on its own together with both version records.
/// Returns the version the store ends at.
///
/// # Errors
///
/// Returns [`KanbanError::CorruptStore`] when the store is newer than this
/// build or its version records disagree, or any SQLite failure of a step.
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    let start = schema_version(conn)?;
    if start > LATEST_SCHEMA_VERSION {
        return Err(KanbanError::CorruptStore(format!(
            "store schema v{start} is newer than supported v{LATEST_SCHEMA_VERSION}"
        )));
    }

    for step in MIGRATIONS.iter().filter(|step| step.version > start) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;
        debug!(version = step.version, name = step.name, "applied store migration");
    }

    let version = schema_version(conn)?;
    match meta_version(conn)? {
        Some(recorded) if recorded == i64::from(version) => {}
        recorded => {
            return Err(KanbanError::CorruptStore(format!(
                "store_meta records {recorded:?}, user_version is {version}"
            )));
        }
    }
    if version != start {
        info!(from = start, to = version, "store migrated");
    }
    Ok(version)
}
