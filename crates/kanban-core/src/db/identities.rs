//! Identity rows: guests and registered accounts.

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;
use crate::error::KanbanError;
use crate::model::Entity;
use crate::model::identity::{Identity, NewIdentity, ProfileUpdate};

/// Insert an identity and return the stored row.
///
/// # Errors
///
/// Returns [`KanbanError::IntegrityViolation`] when the username is taken.
pub fn insert_identity(conn: &Connection, new: &NewIdentity) -> Result<Identity> {
    conn.execute(
        "INSERT INTO identities (
            username, is_guest, email, first_name, last_name,
            last_login_at_us, created_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.username,
            new.is_guest,
            new.email,
            new.first_name,
            new.last_name,
            new.last_login_at_us,
            new.created_at_us,
        ],
    )?;
    get_identity(conn, conn.last_insert_rowid())
}

/// Fetch an identity by id.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when no row matches.
pub fn get_identity(conn: &Connection, identity_id: i64) -> Result<Identity> {
    find_identity(conn, identity_id)?
        .ok_or_else(|| KanbanError::not_found(Entity::Identity, identity_id))
}

/// Fetch an identity by id, `None` when absent.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_identity(conn: &Connection, identity_id: i64) -> Result<Option<Identity>> {
    let sql = format!(
        "SELECT {} FROM identities WHERE identity_id = ?1",
        Identity::COLUMNS
    );
    Ok(conn
        .query_row(&sql, [identity_id], Identity::from_row)
        .optional()?)
}

/// Fetch a guest by id. Registered identities are never returned.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_guest(conn: &Connection, identity_id: i64) -> Result<Option<Identity>> {
    Ok(find_identity(conn, identity_id)?.filter(|identity| identity.is_guest))
}

/// Fetch a registered identity by id. Guests are never returned.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_registered(conn: &Connection, identity_id: i64) -> Result<Option<Identity>> {
    Ok(find_identity(conn, identity_id)?.filter(|identity| !identity.is_guest))
}

/// Look up a registered identity by email (case-insensitive).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_registered_by_email(conn: &Connection, email: &str) -> Result<Option<Identity>> {
    let sql = format!(
        "SELECT {} FROM identities
         WHERE is_guest = 0 AND email IS NOT NULL AND lower(email) = lower(?1)
         ORDER BY identity_id
         LIMIT 1",
        Identity::COLUMNS
    );
    Ok(conn
        .query_row(&sql, [email], Identity::from_row)
        .optional()?)
}

/// Look up a registered identity by username.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_registered_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<Identity>> {
    let sql = format!(
        "SELECT {} FROM identities WHERE is_guest = 0 AND username = ?1",
        Identity::COLUMNS
    );
    Ok(conn
        .query_row(&sql, [username], Identity::from_row)
        .optional()?)
}

/// Whether `username` is already held by any identity.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn username_taken(conn: &Connection, username: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM identities WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?)
}

/// Delete an identity; its boards, columns and cards cascade.
///
/// Returns `true` when a row was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_identity(conn: &Connection, identity_id: i64) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM identities WHERE identity_id = ?1",
        [identity_id],
    )?;
    Ok(removed > 0)
}

/// Stamp the last successful login.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the identity does not exist.
pub fn record_login(conn: &Connection, identity_id: i64, at_us: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE identities SET last_login_at_us = ?2 WHERE identity_id = ?1",
        params![identity_id, at_us],
    )?;
    if updated == 0 {
        return Err(KanbanError::not_found(Entity::Identity, identity_id));
    }
    Ok(())
}

/// Overwrite the provided profile fields, leaving `None` fields untouched.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the identity does not exist.
pub fn update_profile(conn: &Connection, identity_id: i64, update: &ProfileUpdate) -> Result<()> {
    let updated = conn.execute(
        "UPDATE identities SET
            first_name = COALESCE(?2, first_name),
            last_name = COALESCE(?3, last_name),
            email = COALESCE(?4, email),
            avatar_url = COALESCE(?5, avatar_url)
         WHERE identity_id = ?1",
        params![
            identity_id,
            update.first_name,
            update.last_name,
            update.email,
            update.avatar_url,
        ],
    )?;
    if updated == 0 {
        return Err(KanbanError::not_found(Entity::Identity, identity_id));
    }
    Ok(())
}
