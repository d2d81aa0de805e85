//! Session commands: `kb guest-action`, `kb login`, `kb logout`.
//!
//! `kb login` stands in for the OAuth callback: it builds the provider
//! success event from flags and feeds it to the login pipeline for the
//! current session.

use super::{Context, OrFail};
use crate::output::render;
use anyhow::Result;
use clap::{Args, ValueEnum};
use kanban_core::guest::{GuestHandOff, IdentityMergeService, LoginDetails, LoginEvent};
use kanban_core::session::{MigrationIntent, set_migration_intent};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IntentArg {
    /// Keep the guest's boards after login.
    Merge,
    /// Throw the guest's boards away at login.
    Discard,
}

impl From<IntentArg> for MigrationIntent {
    fn from(arg: IntentArg) -> Self {
        match arg {
            IntentArg::Merge => Self::Merge,
            IntentArg::Discard => Self::Discard,
        }
    }
}

#[derive(Args, Debug)]
pub struct GuestActionArgs {
    #[arg(value_enum)]
    pub action: IntentArg,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Username suggested by the provider.
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,

    /// Avatar URL reported by the provider.
    #[arg(long)]
    pub picture: Option<String>,

    #[arg(long, default_value = "google-oauth2")]
    pub provider: String,

    /// Provider-side user id. Defaults to the username.
    #[arg(long)]
    pub uid: Option<String>,
}

impl LoginArgs {
    fn event(&self) -> LoginEvent {
        let mut response = Map::new();
        for (key, value) in [
            ("given_name", &self.first_name),
            ("family_name", &self.last_name),
            ("email", &self.email),
            ("picture", &self.picture),
        ] {
            if let Some(value) = value {
                response.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        LoginEvent {
            provider: self.provider.clone(),
            uid: self.uid.clone().unwrap_or_else(|| self.username.clone()),
            details: LoginDetails {
                username: self.username.clone(),
                email: self.email.clone(),
                first_name: self.first_name.clone(),
                last_name: self.last_name.clone(),
            },
            response: Value::Object(response),
        }
    }
}

#[derive(Debug, Serialize)]
struct IntentOutput {
    ok: bool,
    session: String,
    intent: &'static str,
}

#[derive(Debug, Serialize)]
struct LogoutOutput {
    ok: bool,
    session: String,
    cleared: usize,
}

/// Execute `kb guest-action <merge|discard>`.
///
/// # Errors
///
/// Returns an error if the store is missing or the session cannot be written.
pub fn run_guest_action(args: &GuestActionArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let intent = MigrationIntent::from(args.action);
    set_migration_intent(&mut ctx.session(&conn), intent).or_fail(ctx)?;

    let out = IntentOutput {
        ok: true,
        session: ctx.session_key.clone(),
        intent: intent.as_str(),
    };
    let verb = match intent {
        MigrationIntent::Merge => "kept",
        MigrationIntent::Discard => "discarded",
    };
    render(ctx.output, &out, |_, w| {
        writeln!(w, "guest boards will be {verb} at next login")
    })
}

/// Execute `kb login`.
///
/// # Errors
///
/// Returns an error if the store is missing or any login step fails; the
/// store and the session are left untouched in that case.
pub fn run_login(args: &LoginArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let mut session = ctx.session(&conn);
    let outcome = IdentityMergeService::new(&conn)
        .complete_login(&mut session, &args.event())
        .or_fail(ctx)?;

    render(ctx.output, &outcome, |outcome, w| {
        let identity = &outcome.identity;
        let status = if outcome.is_new { "new" } else { "existing" };
        writeln!(
            w,
            "logged in as {} ({status} account, id {})",
            identity.username, identity.identity_id
        )?;
        match outcome.hand_off {
            GuestHandOff::None => Ok(()),
            GuestHandOff::Skipped { guest_identity_id } => {
                writeln!(w, "  guest {guest_identity_id} no longer exists; nothing moved")
            }
            GuestHandOff::Merged {
                guest_identity_id,
                boards,
            } => writeln!(w, "  merged {boards} board(s) from guest {guest_identity_id}"),
            GuestHandOff::Discarded { guest_identity_id } => {
                writeln!(w, "  discarded guest {guest_identity_id}")
            }
        }
    })
}

/// Execute `kb logout`: forget every entry of the current session.
///
/// # Errors
///
/// Returns an error if the store is missing or the session cannot be cleared.
pub fn run_logout(ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let cleared = ctx.session(&conn).clear().or_fail(ctx)?;
    let out = LogoutOutput {
        ok: true,
        session: ctx.session_key.clone(),
        cleared,
    };
    render(ctx.output, &out, |out, w| {
        writeln!(w, "session {} cleared", out.session)
    })
}
