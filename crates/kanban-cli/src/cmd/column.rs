//! `kb column` subcommands.

use super::{Context, OrFail};
use crate::output::render;
use anyhow::Result;
use clap::{Args, Subcommand};
use kanban_core::reorder::ReorderService;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct ColumnArgs {
    #[command(subcommand)]
    pub command: ColumnCommand,
}

#[derive(Subcommand, Debug)]
pub enum ColumnCommand {
    #[command(
        about = "Append a column to a board",
        after_help = "EXAMPLES:\n    kb column add 12 \"Review\""
    )]
    Add {
        board: i64,
        title: String,
    },

    #[command(
        about = "Rename a column",
        after_help = "EXAMPLES:\n    kb column rename 40 \"QA\""
    )]
    Rename {
        column: i64,
        title: String,
    },

    #[command(
        about = "Delete a column and its cards",
        after_help = "EXAMPLES:\n    kb column delete 40"
    )]
    Delete {
        column: i64,
    },

    #[command(
        about = "Move a column to just before another column of the same board",
        after_help = "EXAMPLES:\n    # Put column 42 in front of column 40 on board 12\n    kb column move-before 12 42 40"
    )]
    MoveBefore {
        board: i64,
        column: i64,
        target: i64,
    },

    #[command(
        about = "Move a column to the end of its board",
        after_help = "EXAMPLES:\n    kb column move-end 40"
    )]
    MoveEnd {
        column: i64,
    },
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

fn ack(ctx: &Context) -> Result<()> {
    render(ctx.output, &Ack { ok: true }, |_, w| writeln!(w, "ok"))
}

/// Execute a `kb column` subcommand for the acting identity.
///
/// # Errors
///
/// Returns an error if the store is missing, an id is unknown or not the
/// caller's, or the write is rejected.
pub fn run_column(args: &ColumnArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let owner = ctx.owner(&conn)?;
    let service = ReorderService::new(&conn);

    match args.command {
        ColumnCommand::Add { board, ref title } => {
            let column = service.add_column(board, owner, title).or_fail(ctx)?;
            render(ctx.output, &column, |column, w| {
                writeln!(w, "{:>5}  {}", column.column_id, column.title)
            })
        }
        ColumnCommand::Rename { column, ref title } => {
            let column = service.rename_column(column, owner, title).or_fail(ctx)?;
            render(ctx.output, &column, |column, w| {
                writeln!(w, "{:>5}  {}", column.column_id, column.title)
            })
        }
        ColumnCommand::Delete { column } => {
            service.delete_column(column, owner).or_fail(ctx)?;
            ack(ctx)
        }
        ColumnCommand::MoveBefore {
            board,
            column,
            target,
        } => {
            service
                .move_column_before(board, column, target, owner)
                .or_fail(ctx)?;
            ack(ctx)
        }
        ColumnCommand::MoveEnd { column } => {
            service.move_column_to_end(column, owner).or_fail(ctx)?;
            ack(ctx)
        }
    }
}
