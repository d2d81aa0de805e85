//! `kb board` subcommands.

use super::{Context, OrFail};
use crate::output::render;
use anyhow::Result;
use clap::{Args, Subcommand};
use kanban_core::db::boards;
use kanban_core::model::board::{Board, Card, Column};
use kanban_core::reorder::{DEFAULT_COLUMN_TITLES, ReorderService};
use rusqlite::Connection;
use serde::Serialize;
use std::io::{self, Write};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct BoardArgs {
    #[command(subcommand)]
    pub command: BoardCommand,
}

#[derive(Subcommand, Debug)]
pub enum BoardCommand {
    #[command(
        about = "List your boards",
        after_help = "EXAMPLES:\n    # Boards in display order\n    kb board list"
    )]
    List,

    #[command(
        about = "Create a board",
        after_help = "EXAMPLES:\n    # Board with the usual three columns\n    kb board create \"Launch\"\n\n    # Board with custom columns\n    kb board create \"Hiring\" --column Sourced --column Interview --column Offer"
    )]
    Create(CreateArgs),

    #[command(
        about = "Delete a board with its columns and cards",
        after_help = "EXAMPLES:\n    kb board delete 12"
    )]
    Delete(BoardIdArgs),

    #[command(
        about = "Show the most recently updated board",
        after_help = "EXAMPLES:\n    kb board latest --json"
    )]
    Latest,

    #[command(
        about = "Show a board with its columns and cards",
        after_help = "EXAMPLES:\n    kb board show 12"
    )]
    Show(BoardIdArgs),

    #[command(
        about = "Rename a board",
        after_help = "EXAMPLES:\n    kb board rename 12 \"Launch v2\""
    )]
    Rename(RenameArgs),

    #[command(
        about = "Star or unstar a board",
        after_help = "EXAMPLES:\n    kb board star 12\n\n    kb board star 12 --off"
    )]
    Star(StarArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub title: String,

    /// Column title, repeatable. Defaults to To Do / In Progress / Done.
    #[arg(long = "column", value_name = "TITLE")]
    pub columns: Vec<String>,
}

#[derive(Args, Debug)]
pub struct BoardIdArgs {
    pub board: i64,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    pub board: i64,
    pub title: String,
}

#[derive(Args, Debug)]
pub struct StarArgs {
    pub board: i64,

    /// Remove the star instead.
    #[arg(long)]
    pub off: bool,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ColumnView {
    #[serde(flatten)]
    column: Column,
    cards: Vec<Card>,
}

#[derive(Debug, Serialize)]
struct BoardView {
    #[serde(flatten)]
    board: Board,
    columns: Vec<ColumnView>,
}

#[derive(Debug, Serialize)]
struct Deleted {
    ok: bool,
    board_id: i64,
}

fn write_board_line(w: &mut dyn Write, board: &Board) -> io::Result<()> {
    let star = if board.starred { " *" } else { "" };
    writeln!(w, "{:>5}  {}{star}", board.board_id, board.title)
}

fn board_view(conn: &Connection, board: Board) -> kanban_core::Result<BoardView> {
    let columns = boards::list_columns(conn, board.board_id)?
        .into_iter()
        .map(|column| {
            let cards = boards::list_cards(conn, column.column_id)?;
            Ok(ColumnView { column, cards })
        })
        .collect::<kanban_core::Result<Vec<_>>>()?;
    Ok(BoardView { board, columns })
}

fn render_board_view(ctx: &Context, view: &BoardView) -> Result<()> {
    render(ctx.output, view, |view, w| {
        write_board_line(w, &view.board)?;
        for column in &view.columns {
            writeln!(w, "  [{}] {}", column.column.column_id, column.column.title)?;
            for card in &column.cards {
                writeln!(
                    w,
                    "      {:>5}  {} ({})",
                    card.card_id, card.title, card.priority
                )?;
            }
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Execute a `kb board` subcommand for the acting identity.
///
/// # Errors
///
/// Returns an error if the store is missing, the board is not the caller's,
/// or a write is rejected.
pub fn run_board(args: &BoardArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let owner = ctx.owner(&conn)?;
    let service = ReorderService::new(&conn);

    match &args.command {
        BoardCommand::List => {
            let list = boards::list_boards(&conn, owner).or_fail(ctx)?;
            render(ctx.output, &list, |list, w| {
                for board in list {
                    write_board_line(w, board)?;
                }
                Ok(())
            })
        }
        BoardCommand::Create(create) => {
            let columns: Vec<&str> = if create.columns.is_empty() {
                DEFAULT_COLUMN_TITLES.to_vec()
            } else {
                create.columns.iter().map(String::as_str).collect()
            };
            let board = service
                .create_board(owner, &create.title, &columns)
                .or_fail(ctx)?;
            let view = board_view(&conn, board).or_fail(ctx)?;
            render_board_view(ctx, &view)
        }
        BoardCommand::Delete(target) => {
            service.delete_board(target.board, owner).or_fail(ctx)?;
            let out = Deleted {
                ok: true,
                board_id: target.board,
            };
            render(ctx.output, &out, |_, w| writeln!(w, "ok"))
        }
        BoardCommand::Latest => {
            let latest = boards::latest_board(&conn, owner).or_fail(ctx)?;
            render(ctx.output, &latest, |latest, w| match latest {
                Some(board) => write_board_line(w, board),
                None => writeln!(w, "no boards"),
            })
        }
        BoardCommand::Show(target) => {
            let board = boards::owned_board(&conn, target.board, owner).or_fail(ctx)?;
            let view = board_view(&conn, board).or_fail(ctx)?;
            render_board_view(ctx, &view)
        }
        BoardCommand::Rename(rename) => {
            let board = service
                .rename_board(rename.board, owner, &rename.title)
                .or_fail(ctx)?;
            render(ctx.output, &board, |board, w| write_board_line(w, board))
        }
        BoardCommand::Star(star) => {
            let board = service
                .star_board(star.board, owner, !star.off)
                .or_fail(ctx)?;
            render(ctx.output, &board, |board, w| write_board_line(w, board))
        }
    }
}
