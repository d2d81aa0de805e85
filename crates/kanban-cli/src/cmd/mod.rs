pub mod board;
pub mod card;
pub mod column;
pub mod init;
pub mod login;
pub mod sweep;
pub mod whoami;

use crate::output::{CliError, OutputMode, render_error};
use anyhow::Result;
use kanban_core::KanbanError;
use kanban_core::config::{KanbanConfig, load_config};
use kanban_core::db::try_open_store;
use kanban_core::error::ErrorCode;
use kanban_core::guest::{
    CredentialCheck, FixedIdentity, GuestIdentityResolver, Resolved, SessionLogin,
};
use kanban_core::session::SqliteSession;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Session key used when neither `--session` nor `KANBAN_SESSION` is set.
pub const DEFAULT_SESSION: &str = "default";

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub project_root: PathBuf,
    pub config: KanbanConfig,
    pub store_path: PathBuf,
    pub session_key: String,
    pub user: Option<i64>,
    pub output: OutputMode,
}

impl Context {
    /// Build the context for `project_root`, applying the `--db` override.
    ///
    /// # Errors
    ///
    /// Returns an error (already rendered) if `.kanban/config.toml` exists
    /// but cannot be read or parsed.
    pub fn load(
        project_root: &Path,
        db: Option<PathBuf>,
        session_key: String,
        user: Option<i64>,
        output: OutputMode,
    ) -> Result<Self> {
        let config = load_config(project_root).map_err(|err| fail_with(output, &err))?;
        let store_path = db.unwrap_or_else(|| config.store_path(project_root));
        Ok(Self {
            project_root: project_root.to_path_buf(),
            config,
            store_path,
            session_key,
            user,
            output,
        })
    }

    /// Open the store created by `kb init`.
    ///
    /// # Errors
    ///
    /// Returns an error (already rendered) when the store does not exist or
    /// is refused as corrupt.
    pub fn open(&self) -> Result<Connection> {
        let opened = try_open_store(&self.store_path).map_err(|err| {
            match err.downcast_ref::<KanbanError>() {
                Some(core) => self.fail(core),
                None => err,
            }
        })?;
        if let Some(conn) = opened {
            return Ok(conn);
        }
        let code = ErrorCode::NotInitialized;
        render_error(
            self.output,
            &CliError::with_details(
                format!("no store at {}", self.store_path.display()),
                code.hint().unwrap_or_default(),
                code.code(),
            ),
        )?;
        anyhow::bail!("{}: {}", code.code(), code.message())
    }

    pub fn session<'conn>(&self, conn: &'conn Connection) -> SqliteSession<'conn> {
        SqliteSession::new(conn, self.session_key.as_str())
    }

    /// Resolve who is acting: `--user`, then the session login, then the
    /// session guest, creating one when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error (already rendered) if resolution fails.
    pub fn resolve(&self, conn: &Connection) -> Result<Resolved> {
        let fixed;
        let credentials: &dyn CredentialCheck = match self.user {
            Some(identity_id) => {
                fixed = FixedIdentity(identity_id);
                &fixed
            }
            None => &SessionLogin,
        };
        let mut session = self.session(conn);
        GuestIdentityResolver::new(conn, credentials)
            .resolve(&mut session)
            .or_fail(self)
    }

    /// Owner id of the acting identity.
    ///
    /// # Errors
    ///
    /// See [`Context::resolve`].
    pub fn owner(&self, conn: &Connection) -> Result<i64> {
        Ok(self.resolve(conn)?.identity.identity_id)
    }

    /// Render `err` for the user and turn it into the command's failure.
    pub fn fail(&self, err: &KanbanError) -> anyhow::Error {
        fail_with(self.output, err)
    }
}

fn fail_with(output: OutputMode, err: &KanbanError) -> anyhow::Error {
    if let Err(render) = render_error(output, &CliError::from(err)) {
        return render;
    }
    anyhow::anyhow!("{}: {err}", err.code())
}

/// Lift a core result into the command's result, rendering any error.
pub trait OrFail<T> {
    /// # Errors
    ///
    /// Returns the rendered error.
    fn or_fail(self, ctx: &Context) -> Result<T>;
}

impl<T> OrFail<T> for kanban_core::Result<T> {
    fn or_fail(self, ctx: &Context) -> Result<T> {
        self.map_err(|err| ctx.fail(&err))
    }
}
