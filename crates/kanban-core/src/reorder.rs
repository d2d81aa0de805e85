//! Owner-scoped board, column and card mutations.
//!
//! [`ReorderService`] checks that every referenced row belongs to the
//! requesting identity (and to the stated parent) before handing the order
//! change to [`OrderIndex`]. Anything that changes a board's columns or
//! cards also touches the board's `updated_at_us`, which drives
//! [`crate::db::boards::latest_board`].
//!
//! Each public method is one `BEGIN IMMEDIATE` transaction, or joins the
//! caller's transaction when one is already open.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::Result;
use crate::db::{self, boards};
use crate::model::board::{Board, Card, Column, NewCard};
use crate::order::{Group, OrderIndex, Ordered};
use crate::timestamp::now_us;

/// Title of the board every new identity starts with.
pub const DEFAULT_BOARD_TITLE: &str = "Kanban Board";

/// Columns of the default board, left to right.
pub const DEFAULT_COLUMN_TITLES: [&str; 3] = ["To Do", "In Progress", "Done"];

pub struct ReorderService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ReorderService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn index(&self) -> OrderIndex<'conn> {
        OrderIndex::new(self.conn)
    }

    // -----------------------------------------------------------------------
    // Boards
    // -----------------------------------------------------------------------

    /// Create a board at the end of `owner`'s boards with the given columns.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::IntegrityViolation`] for an empty title
    /// or duplicate column titles.
    pub fn create_board(&self, owner: i64, title: &str, columns: &[&str]) -> Result<Board> {
        db::immediate(self.conn, |conn| self.insert_board_tree(conn, owner, title, columns, false))
    }

    /// Create the starter board ("Kanban Board" with To Do / In Progress /
    /// Done), flagged `is_default`.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn create_default_board(&self, owner: i64) -> Result<Board> {
        db::immediate(self.conn, |conn| {
            self.insert_board_tree(conn, owner, DEFAULT_BOARD_TITLE, &DEFAULT_COLUMN_TITLES, true)
        })
    }

    fn insert_board_tree(
        &self,
        conn: &Connection,
        owner: i64,
        title: &str,
        columns: &[&str],
        is_default: bool,
    ) -> Result<Board> {
        let now = now_us();
        let index = self.index();
        let position = index.append(Group::boards_of(owner))?;
        let board = boards::insert_board(conn, owner, title, is_default, position, now)?;
        for (column_title, column_position) in columns.iter().zip(0_i64..) {
            boards::insert_column(conn, board.board_id, column_title, column_position, now)?;
        }
        info!(
            board_id = board.board_id,
            owner,
            is_default,
            columns = columns.len(),
            "created board"
        );
        Ok(board)
    }

    /// Delete a board with all its columns and cards.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns it.
    pub fn delete_board(&self, board_id: i64, owner: i64) -> Result<()> {
        db::immediate(self.conn, |conn| {
            boards::owned_board(conn, board_id, owner)?;
            self.index().remove(Ordered::Board, board_id)?;
            info!(board_id, owner, "deleted board");
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns it.
    pub fn rename_board(&self, board_id: i64, owner: i64, title: &str) -> Result<Board> {
        db::immediate(self.conn, |conn| {
            boards::owned_board(conn, board_id, owner)?;
            boards::rename_board(conn, board_id, title, now_us())?;
            boards::get_board(conn, board_id)
        })
    }

    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns it.
    pub fn star_board(&self, board_id: i64, owner: i64, starred: bool) -> Result<Board> {
        db::immediate(self.conn, |conn| {
            boards::owned_board(conn, board_id, owner)?;
            boards::set_starred(conn, board_id, starred, now_us())?;
            boards::get_board(conn, board_id)
        })
    }

    // -----------------------------------------------------------------------
    // Columns
    // -----------------------------------------------------------------------

    /// Append a column to a board.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the board,
    /// or [`crate::KanbanError::IntegrityViolation`] for a duplicate title.
    pub fn add_column(&self, board_id: i64, owner: i64, title: &str) -> Result<Column> {
        db::immediate(self.conn, |conn| {
            boards::owned_board(conn, board_id, owner)?;
            let now = now_us();
            let position = self.index().append(Group::columns_of(board_id))?;
            let column = boards::insert_column(conn, board_id, title, position, now)?;
            boards::touch_board(conn, board_id, now)?;
            debug!(column_id = column.column_id, board_id, position, "added column");
            Ok(column)
        })
    }

    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the column.
    pub fn rename_column(&self, column_id: i64, owner: i64, title: &str) -> Result<Column> {
        db::immediate(self.conn, |conn| {
            let column = boards::owned_column(conn, column_id, owner)?;
            boards::rename_column(conn, column_id, title)?;
            boards::touch_board(conn, column.board_id, now_us())?;
            boards::get_column(conn, column_id)
        })
    }

    /// Delete a column and its cards.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the column.
    pub fn delete_column(&self, column_id: i64, owner: i64) -> Result<()> {
        db::immediate(self.conn, |conn| {
            let column = boards::owned_column(conn, column_id, owner)?;
            self.index().remove(Ordered::Column, column_id)?;
            boards::touch_board(conn, column.board_id, now_us())?;
            debug!(column_id, board_id = column.board_id, "deleted column");
            Ok(())
        })
    }

    /// Place `column_id` directly before `target_column_id` on `board_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] when either column is missing,
    /// sits on another board, or is not owned by `owner`.
    pub fn move_column_before(
        &self,
        board_id: i64,
        column_id: i64,
        target_column_id: i64,
        owner: i64,
    ) -> Result<()> {
        db::immediate(self.conn, |conn| {
            boards::owned_column_on_board(conn, board_id, column_id, owner)?;
            boards::owned_column_on_board(conn, board_id, target_column_id, owner)?;
            self.index()
                .move_before(Ordered::Column, column_id, target_column_id)?;
            boards::touch_board(conn, board_id, now_us())
        })
    }

    /// Move a column to the right end of its board.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the column.
    pub fn move_column_to_end(&self, column_id: i64, owner: i64) -> Result<()> {
        db::immediate(self.conn, |conn| {
            let column = boards::owned_column(conn, column_id, owner)?;
            self.index().move_to_end(Ordered::Column, column_id)?;
            boards::touch_board(conn, column.board_id, now_us())
        })
    }

    // -----------------------------------------------------------------------
    // Cards
    // -----------------------------------------------------------------------

    /// Append a card to a column.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the column.
    pub fn add_card(&self, column_id: i64, owner: i64, card: &NewCard) -> Result<Card> {
        db::immediate(self.conn, |conn| {
            let column = boards::owned_column(conn, column_id, owner)?;
            let now = now_us();
            let position = self.index().append(Group::cards_of(column_id))?;
            let card = boards::insert_card(conn, column_id, card, position, now)?;
            boards::touch_board(conn, column.board_id, now)?;
            debug!(card_id = card.card_id, column_id, position, "added card");
            Ok(card)
        })
    }

    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the card.
    pub fn delete_card(&self, card_id: i64, owner: i64) -> Result<()> {
        db::immediate(self.conn, |conn| {
            let card = boards::owned_card(conn, card_id, owner)?;
            let column = boards::get_column(conn, card.column_id)?;
            self.index().remove(Ordered::Card, card_id)?;
            boards::touch_board(conn, column.board_id, now_us())
        })
    }

    /// Place `card_id` directly before `target_card_id` within `column_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] when either card is missing,
    /// sits in another column, or is not owned by `owner`.
    pub fn move_card_before(
        &self,
        column_id: i64,
        card_id: i64,
        target_card_id: i64,
        owner: i64,
    ) -> Result<()> {
        db::immediate(self.conn, |conn| {
            boards::owned_card_in_column(conn, column_id, card_id, owner)?;
            boards::owned_card_in_column(conn, column_id, target_card_id, owner)?;
            let column = boards::get_column(conn, column_id)?;
            self.index()
                .move_before(Ordered::Card, card_id, target_card_id)?;
            boards::touch_board(conn, column.board_id, now_us())
        })
    }

    /// Move a card to the bottom of `target_column_id`, possibly on another
    /// board of the same owner. Both boards are touched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns both the
    /// card and the target column.
    pub fn move_card_to_column(
        &self,
        card_id: i64,
        target_column_id: i64,
        owner: i64,
    ) -> Result<Card> {
        db::immediate(self.conn, |conn| {
            let card = boards::owned_card(conn, card_id, owner)?;
            let source = boards::get_column(conn, card.column_id)?;
            let target = boards::owned_column(conn, target_column_id, owner)?;
            let position = self.index().move_to_group(
                Ordered::Card,
                card_id,
                Group::cards_of(target_column_id),
            )?;
            let now = now_us();
            boards::touch_board(conn, source.board_id, now)?;
            if target.board_id != source.board_id {
                boards::touch_board(conn, target.board_id, now)?;
            }
            debug!(
                card_id,
                from = source.column_id,
                to = target_column_id,
                position,
                "moved card to column"
            );
            boards::get_card(conn, card_id)
        })
    }

    /// Move a card to the bottom of its column.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KanbanError::NotFound`] unless `owner` owns the card.
    pub fn move_card_to_end(&self, card_id: i64, owner: i64) -> Result<()> {
        db::immediate(self.conn, |conn| {
            let card = boards::owned_card(conn, card_id, owner)?;
            let column = boards::get_column(conn, card.column_id)?;
            self.index().move_to_end(Ordered::Card, card_id)?;
            boards::touch_board(conn, column.board_id, now_us())
        })
    }
}
