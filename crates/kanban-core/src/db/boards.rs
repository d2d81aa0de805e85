//! Board, column and card rows.
//!
//! Lookups that take an `owner` are scoped through the ownership chain
//! (card -> column -> board -> identity) and report [`KanbanError::NotFound`]
//! for rows that exist but belong to someone else.

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;
use crate::error::KanbanError;
use crate::model::Entity;
use crate::model::board::{Board, Card, Column, NewCard};

fn board_query(filter: &str) -> String {
    format!("SELECT {} FROM boards b {filter}", Board::COLUMNS)
}

fn column_query(filter: &str) -> String {
    format!(
        "SELECT {} FROM columns c JOIN boards b ON b.board_id = c.board_id {filter}",
        Column::COLUMNS
    )
}

fn card_query(filter: &str) -> String {
    format!(
        "SELECT {} FROM cards k
         JOIN columns c ON c.column_id = k.column_id
         JOIN boards b ON b.board_id = c.board_id {filter}",
        Card::COLUMNS
    )
}

// ---------------------------------------------------------------------------
// Inserts
// ---------------------------------------------------------------------------

/// Insert a board at `position`.
///
/// # Errors
///
/// Returns an error if a constraint rejects the row.
pub fn insert_board(
    conn: &Connection,
    identity_id: i64,
    title: &str,
    is_default: bool,
    position: i64,
    now_us: i64,
) -> Result<Board> {
    conn.execute(
        "INSERT INTO boards (
            identity_id, title, starred, is_default, position, created_at_us, updated_at_us
        ) VALUES (?1, ?2, 0, ?3, ?4, ?5, ?5)",
        params![identity_id, title, is_default, position, now_us],
    )?;
    get_board(conn, conn.last_insert_rowid())
}

/// Insert a column at `position`.
///
/// # Errors
///
/// Returns [`KanbanError::IntegrityViolation`] for a duplicate title on the
/// same board.
pub fn insert_column(
    conn: &Connection,
    board_id: i64,
    title: &str,
    position: i64,
    now_us: i64,
) -> Result<Column> {
    conn.execute(
        "INSERT INTO columns (board_id, title, position, created_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![board_id, title, position, now_us],
    )?;
    get_column(conn, conn.last_insert_rowid())
}

/// Insert a card at `position`.
///
/// # Errors
///
/// Returns an error if a constraint rejects the row.
pub fn insert_card(
    conn: &Connection,
    column_id: i64,
    card: &NewCard,
    position: i64,
    now_us: i64,
) -> Result<Card> {
    conn.execute(
        "INSERT INTO cards (
            column_id, title, body, priority, position, created_at_us, updated_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            column_id,
            card.title,
            card.body,
            card.priority.as_str(),
            position,
            now_us
        ],
    )?;
    get_card(conn, conn.last_insert_rowid())
}

// ---------------------------------------------------------------------------
// Unscoped reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the board does not exist.
pub fn get_board(conn: &Connection, board_id: i64) -> Result<Board> {
    conn.query_row(
        &board_query("WHERE b.board_id = ?1"),
        [board_id],
        Board::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Board, board_id))
}

/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the column does not exist.
pub fn get_column(conn: &Connection, column_id: i64) -> Result<Column> {
    conn.query_row(
        &column_query("WHERE c.column_id = ?1"),
        [column_id],
        Column::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Column, column_id))
}

/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the card does not exist.
pub fn get_card(conn: &Connection, card_id: i64) -> Result<Card> {
    conn.query_row(&card_query("WHERE k.card_id = ?1"), [card_id], Card::from_row)
        .optional()?
        .ok_or_else(|| KanbanError::not_found(Entity::Card, card_id))
}

// ---------------------------------------------------------------------------
// Owner-scoped reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`KanbanError::NotFound`] unless `owner` owns the board.
pub fn owned_board(conn: &Connection, board_id: i64, owner: i64) -> Result<Board> {
    conn.query_row(
        &board_query("WHERE b.board_id = ?1 AND b.identity_id = ?2"),
        [board_id, owner],
        Board::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Board, board_id))
}

/// # Errors
///
/// Returns [`KanbanError::NotFound`] unless `owner` owns the column's board.
pub fn owned_column(conn: &Connection, column_id: i64, owner: i64) -> Result<Column> {
    conn.query_row(
        &column_query("WHERE c.column_id = ?1 AND b.identity_id = ?2"),
        [column_id, owner],
        Column::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Column, column_id))
}

/// Column lookup additionally pinned to `board_id`.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the column is on another board or
/// not visible to `owner`.
pub fn owned_column_on_board(
    conn: &Connection,
    board_id: i64,
    column_id: i64,
    owner: i64,
) -> Result<Column> {
    conn.query_row(
        &column_query("WHERE c.column_id = ?1 AND c.board_id = ?2 AND b.identity_id = ?3"),
        [column_id, board_id, owner],
        Column::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Column, column_id))
}

/// # Errors
///
/// Returns [`KanbanError::NotFound`] unless `owner` owns the card's board.
pub fn owned_card(conn: &Connection, card_id: i64, owner: i64) -> Result<Card> {
    conn.query_row(
        &card_query("WHERE k.card_id = ?1 AND b.identity_id = ?2"),
        [card_id, owner],
        Card::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Card, card_id))
}

/// Card lookup additionally pinned to `column_id`.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the card is in another column or
/// not visible to `owner`.
pub fn owned_card_in_column(
    conn: &Connection,
    column_id: i64,
    card_id: i64,
    owner: i64,
) -> Result<Card> {
    conn.query_row(
        &card_query("WHERE k.card_id = ?1 AND k.column_id = ?2 AND b.identity_id = ?3"),
        [card_id, column_id, owner],
        Card::from_row,
    )
    .optional()?
    .ok_or_else(|| KanbanError::not_found(Entity::Card, card_id))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Boards of `owner` in display order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_boards(conn: &Connection, owner: i64) -> Result<Vec<Board>> {
    let mut stmt = conn.prepare(&board_query(
        "WHERE b.identity_id = ?1 ORDER BY b.position, b.board_id",
    ))?;
    let rows = stmt.query_map([owner], Board::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Most recently touched board of `owner`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn latest_board(conn: &Connection, owner: i64) -> Result<Option<Board>> {
    Ok(conn
        .query_row(
            &board_query(
                "WHERE b.identity_id = ?1 ORDER BY b.updated_at_us DESC, b.board_id DESC LIMIT 1",
            ),
            [owner],
            Board::from_row,
        )
        .optional()?)
}

/// Columns of a board in display order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_columns(conn: &Connection, board_id: i64) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare(&column_query(
        "WHERE c.board_id = ?1 ORDER BY c.position, c.column_id",
    ))?;
    let rows = stmt.query_map([board_id], Column::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Cards of a column in display order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_cards(conn: &Connection, column_id: i64) -> Result<Vec<Card>> {
    let mut stmt = conn.prepare(&card_query(
        "WHERE k.column_id = ?1 ORDER BY k.position, k.card_id",
    ))?;
    let rows = stmt.query_map([column_id], Card::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Bump `updated_at_us`, strictly increasing even within one microsecond.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the board does not exist.
pub fn touch_board(conn: &Connection, board_id: i64, now_us: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE boards SET updated_at_us = MAX(updated_at_us + 1, ?2) WHERE board_id = ?1",
        params![board_id, now_us],
    )?;
    if updated == 0 {
        return Err(KanbanError::not_found(Entity::Board, board_id));
    }
    Ok(())
}

/// Hand a board to another identity at `position` in the new owner's group.
///
/// # Errors
///
/// Returns [`KanbanError::NotFound`] when the board does not exist.
pub fn reassign_board(
    conn: &Connection,
    board_id: i64,
    new_owner: i64,
    position: i64,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE boards SET identity_id = ?2, position = ?3 WHERE board_id = ?1",
        params![board_id, new_owner, position],
    )?;
    if updated == 0 {
        return Err(KanbanError::not_found(Entity::Board, board_id));
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if a constraint rejects the title.
pub fn rename_board(conn: &Connection, board_id: i64, title: &str, now_us: i64) -> Result<()> {
    conn.execute(
        "UPDATE boards SET title = ?2 WHERE board_id = ?1",
        params![board_id, title],
    )?;
    touch_board(conn, board_id, now_us)
}

/// # Errors
///
/// Returns an error if the update fails.
pub fn set_starred(conn: &Connection, board_id: i64, starred: bool, now_us: i64) -> Result<()> {
    conn.execute(
        "UPDATE boards SET starred = ?2 WHERE board_id = ?1",
        params![board_id, starred],
    )?;
    touch_board(conn, board_id, now_us)
}

/// # Errors
///
/// Returns [`KanbanError::IntegrityViolation`] for a duplicate title on the
/// same board.
pub fn rename_column(conn: &Connection, column_id: i64, title: &str) -> Result<()> {
    conn.execute(
        "UPDATE columns SET title = ?2 WHERE column_id = ?1",
        params![column_id, title],
    )?;
    Ok(())
}
