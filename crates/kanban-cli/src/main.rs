#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "kb: kanban boards with guest sessions",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Database path (overrides `[store] path` in .kanban/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Session to act in. Falls back to `KANBAN_SESSION`, then "default".
    #[arg(long, global = true, value_name = "KEY")]
    session: Option<String>,

    /// Act as this registered identity instead of the session's login.
    #[arg(long, global = true, value_name = "IDENTITY_ID")]
    user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.json)
    }

    fn session_key(&self) -> String {
        self.session
            .clone()
            .or_else(|| env::var("KANBAN_SESSION").ok())
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| cmd::DEFAULT_SESSION.to_string())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a kanban store",
        long_about = "Create .kanban/ with a default config and a migrated SQLite store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    kb init\n\n    # Store the database somewhere else\n    kb --db /var/lib/kanban/kanban.db init"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Identity",
        about = "Show who the current session acts as",
        long_about = "Resolve the acting identity. A fresh session becomes a guest with a starter board.",
        after_help = "EXAMPLES:\n    kb whoami\n\n    # Another browser\n    kb --session laptop whoami --json"
    )]
    Whoami,

    #[command(
        next_help_heading = "Boards",
        about = "Manage boards",
        after_help = "EXAMPLES:\n    kb board list\n\n    kb board show 12 --json"
    )]
    Board(cmd::board::BoardArgs),

    #[command(
        next_help_heading = "Boards",
        about = "Manage and reorder columns",
        after_help = "EXAMPLES:\n    kb column add 12 Review\n\n    kb column move-before 12 42 40"
    )]
    Column(cmd::column::ColumnArgs),

    #[command(
        next_help_heading = "Boards",
        about = "Manage and reorder cards",
        after_help = "EXAMPLES:\n    kb card add 40 \"Write release notes\"\n\n    kb card move-end 301"
    )]
    Card(cmd::card::CardArgs),

    #[command(
        next_help_heading = "Identity",
        about = "Choose what happens to guest boards at the next login",
        after_help = "EXAMPLES:\n    # Keep everything made as a guest\n    kb guest-action merge\n\n    # Start fresh\n    kb guest-action discard"
    )]
    GuestAction(cmd::login::GuestActionArgs),

    #[command(
        next_help_heading = "Identity",
        about = "Complete a provider sign-in for the current session",
        long_about = "Feed a provider success event to the login pipeline: match or create the registered identity, hand off the session guest, sync the profile and log the session in.",
        after_help = "EXAMPLES:\n    kb login --username morgan --email morgan@example.com --first-name Morgan"
    )]
    Login(cmd::login::LoginArgs),

    #[command(
        next_help_heading = "Identity",
        about = "Forget everything stored in the current session",
        after_help = "EXAMPLES:\n    kb logout"
    )]
    Logout,

    #[command(
        next_help_heading = "Maintenance",
        about = "Delete stale and never-used guest identities",
        long_about = "Delete guests inactive for longer than --inactive-days, then guests that never touched their starter board within --grace-period-new-accounts hours.",
        after_help = "EXAMPLES:\n    # See what would go\n    kb sweep-guests --dry-run\n\n    # Nightly cron\n    kb sweep-guests --inactive-days 30 --grace-period-new-accounts 48"
    )]
    SweepGuests(cmd::sweep::SweepArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KANBAN_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "kanban=debug,info"
        } else {
            "kanban=info,warn"
        })
    });

    let format = env::var("KANBAN_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let ctx = cmd::Context::load(
        &project_root,
        cli.db.clone(),
        cli.session_key(),
        cli.user,
        cli.output_mode(),
    )?;

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, &ctx),
        Commands::Whoami => cmd::whoami::run_whoami(&ctx),
        Commands::Board(ref args) => cmd::board::run_board(args, &ctx),
        Commands::Column(ref args) => cmd::column::run_column(args, &ctx),
        Commands::Card(ref args) => cmd::card::run_card(args, &ctx),
        Commands::GuestAction(ref args) => cmd::login::run_guest_action(args, &ctx),
        Commands::Login(ref args) => cmd::login::run_login(args, &ctx),
        Commands::Logout => cmd::login::run_logout(&ctx),
        Commands::SweepGuests(ref args) => cmd::sweep::run_sweep_guests(args, &ctx),
    }
}
