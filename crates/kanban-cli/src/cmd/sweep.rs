use super::{Context, OrFail};
use crate::output::render;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use kanban_core::config::KanbanConfig;
use kanban_core::guest::{SweepOptions, run_sweep_locked, sweep::DEFAULT_LOCK_TIMEOUT};
use std::io::Write;

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Delete guests whose last login is older than this many days.
    #[arg(long, value_name = "DAYS")]
    pub inactive_days: Option<u32>,

    /// Delete never-used guests created more than this many hours ago.
    #[arg(long = "grace-period-new-accounts", value_name = "HOURS")]
    pub grace_period_hours: Option<u32>,

    /// Count what would be deleted without deleting anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl SweepArgs {
    /// Flags override `[sweep]` in the config, which overrides the defaults.
    fn options(&self, ctx: &Context) -> SweepOptions {
        let from_config = SweepOptions::from(&ctx.config.sweep);
        SweepOptions {
            inactive_days: self.inactive_days.unwrap_or(from_config.inactive_days),
            grace_period_hours: self
                .grace_period_hours
                .unwrap_or(from_config.grace_period_hours),
            dry_run: self.dry_run,
        }
    }
}

/// Execute `kb sweep-guests`.
///
/// # Errors
///
/// Returns an error if the store is missing, another sweep holds the lock,
/// or a pass fails.
pub fn run_sweep_guests(args: &SweepArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let opts = args.options(ctx);
    let lock_path = KanbanConfig::sweep_lock_path(&ctx.project_root);

    let report = run_sweep_locked(&conn, &lock_path, DEFAULT_LOCK_TIMEOUT, Utc::now(), &opts)
        .or_fail(ctx)?;
    render(ctx.output, &report, |report, w| writeln!(w, "{report}"))
}
