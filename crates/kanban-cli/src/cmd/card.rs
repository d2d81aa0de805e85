//! `kb card` subcommands.

use super::{Context, OrFail};
use crate::output::render;
use anyhow::Result;
use clap::{Args, Subcommand};
use kanban_core::db::boards;
use kanban_core::model::board::{Card, NewCard, Priority};
use kanban_core::reorder::ReorderService;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct CardArgs {
    #[command(subcommand)]
    pub command: CardCommand,
}

#[derive(Subcommand, Debug)]
pub enum CardCommand {
    #[command(
        about = "Append a card to a column",
        after_help = "EXAMPLES:\n    kb card add 40 \"Write release notes\"\n\n    kb card add 40 \"Fix login\" --priority high --body \"Safari only\""
    )]
    Add(AddArgs),

    #[command(
        about = "List the cards of a column in order",
        after_help = "EXAMPLES:\n    kb card list 40 --json"
    )]
    List { column: i64 },

    #[command(about = "Delete a card", after_help = "EXAMPLES:\n    kb card delete 301")]
    Delete { card: i64 },

    #[command(
        about = "Move a card to just before another card of the same column",
        after_help = "EXAMPLES:\n    # Put card 305 in front of card 301 in column 40\n    kb card move-before 40 305 301"
    )]
    MoveBefore { column: i64, card: i64, target: i64 },

    #[command(
        about = "Move a card to the end of its column",
        after_help = "EXAMPLES:\n    kb card move-end 301"
    )]
    MoveEnd { card: i64 },

    #[command(
        about = "Move a card to the bottom of another column",
        after_help = "EXAMPLES:\n    # Card 301 is done\n    kb card move-to 301 42"
    )]
    MoveTo { card: i64, column: i64 },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub column: i64,
    pub title: String,

    #[arg(long, default_value = "")]
    pub body: String,

    /// low, medium or high.
    #[arg(long, default_value = "medium")]
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

fn write_card_line(w: &mut dyn Write, card: &Card) -> io::Result<()> {
    writeln!(w, "{:>5}  {} ({})", card.card_id, card.title, card.priority)
}

/// Execute a `kb card` subcommand for the acting identity.
///
/// # Errors
///
/// Returns an error if the store is missing, an id is unknown or not the
/// caller's, or the write is rejected.
pub fn run_card(args: &CardArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let owner = ctx.owner(&conn)?;
    let service = ReorderService::new(&conn);

    match &args.command {
        CardCommand::Add(add) => {
            let new_card = NewCard {
                title: add.title.clone(),
                body: add.body.clone(),
                priority: add.priority,
            };
            let card = service.add_card(add.column, owner, &new_card).or_fail(ctx)?;
            render(ctx.output, &card, |card, w| write_card_line(w, card))
        }
        CardCommand::List { column } => {
            boards::owned_column(&conn, *column, owner).or_fail(ctx)?;
            let cards = boards::list_cards(&conn, *column).or_fail(ctx)?;
            render(ctx.output, &cards, |cards, w| {
                for card in cards {
                    write_card_line(w, card)?;
                }
                Ok(())
            })
        }
        CardCommand::Delete { card } => {
            service.delete_card(*card, owner).or_fail(ctx)?;
            render(ctx.output, &Ack { ok: true }, |_, w| writeln!(w, "ok"))
        }
        CardCommand::MoveBefore {
            column,
            card,
            target,
        } => {
            service
                .move_card_before(*column, *card, *target, owner)
                .or_fail(ctx)?;
            render(ctx.output, &Ack { ok: true }, |_, w| writeln!(w, "ok"))
        }
        CardCommand::MoveEnd { card } => {
            service.move_card_to_end(*card, owner).or_fail(ctx)?;
            render(ctx.output, &Ack { ok: true }, |_, w| writeln!(w, "ok"))
        }
        CardCommand::MoveTo { card, column } => {
            let card = service
                .move_card_to_column(*card, *column, owner)
                .or_fail(ctx)?;
            render(ctx.output, &card, |card, w| write_card_line(w, card))
        }
    }
}
