use super::Context;
use crate::output::render;
use anyhow::Result;
use kanban_core::guest::Resolution;
use std::io::Write;

/// Execute `kb whoami`: resolve the acting identity, minting a guest with a
/// starter board on a fresh session.
///
/// # Errors
///
/// Returns an error if the store is missing or resolution fails.
pub fn run_whoami(ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let resolved = ctx.resolve(&conn)?;

    render(ctx.output, &resolved, |resolved, w| {
        let identity = &resolved.identity;
        let kind = if identity.is_guest { "guest" } else { "registered" };
        writeln!(w, "{} ({kind}, id {})", identity.username, identity.identity_id)?;
        if let Some(email) = &identity.email {
            writeln!(w, "  email: {email}")?;
        }
        if resolved.via == Resolution::NewGuest {
            writeln!(w, "  new guest session: a starter board was created")?;
        }
        Ok(())
    })
}
