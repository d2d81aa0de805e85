use super::Context;
use crate::output::{CliError, render, render_error};
use anyhow::{Context as _, Result};
use clap::Args;
use kanban_core::config::{KANBAN_DIR, KanbanConfig};
use kanban_core::db::open_store;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.kanban/config.toml` even if it already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    store: String,
    config: String,
}

/// Execute `kb init`. Creates the project skeleton:
///
/// ```text
/// .kanban/
///   config.toml   (sweep and store defaults)
///   kanban.db     (migrated SQLite store)
/// ```
///
/// Running it again on an initialized project only migrates the store.
///
/// # Errors
///
/// Returns an error if a file cannot be written or the store cannot be
/// created.
pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let kanban_dir = ctx.project_root.join(KANBAN_DIR);
    std::fs::create_dir_all(&kanban_dir)
        .with_context(|| format!("Failed to create {}", kanban_dir.display()))?;

    let config_path = kanban_dir.join("config.toml");
    if args.force || !config_path.exists() {
        let body = toml::to_string_pretty(&KanbanConfig::default())
            .context("Failed to serialize default config")?;
        std::fs::write(&config_path, body)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
    }

    if let Err(err) = open_store(&ctx.store_path) {
        render_error(
            ctx.output,
            &CliError::new(format!("could not create store: {err:#}")),
        )?;
        return Err(err);
    }

    let out = InitOutput {
        ok: true,
        store: ctx.store_path.display().to_string(),
        config: config_path.display().to_string(),
    };
    render(ctx.output, &out, |out, w| {
        writeln!(w, "Initialized {KANBAN_DIR}/")?;
        writeln!(w, "  Store:  {}", out.store)?;
        writeln!(w, "  Config: {}", out.config)
    })
}
