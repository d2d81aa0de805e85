//! Login pipeline: reconcile a guest with the registered identity it signs
//! in as.
//!
//! The OAuth collaborator reports a successful sign-in as a [`LoginEvent`].
//! [`IdentityMergeService::complete_login`] then runs every step of
//! [`LOGIN_PIPELINE`] in order over one [`MigrationContext`]:
//!
//! | stage        | step                          |
//! |--------------|-------------------------------|
//! | pre-create   | resolve the registered identity (match or create) |
//! | post-create  | hand the guest off (merge / discard)             |
//! | post-create  | default board for a brand-new identity           |
//! | post-login   | copy provider profile fields                     |
//! | post-login   | record the login time                            |
//! | cleanup      | clear the one-shot migration intent              |
//!
//! All database work of one login is a single immediate transaction. The
//! session is written only after it commits, so a failed login leaves the
//! intent in place for a retry, and a replayed login on the same session
//! finds no intent and does not migrate again.

use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::Result;
use crate::db::{self, boards, identities};
use crate::error::KanbanError;
use crate::model::identity::{Identity, NewIdentity, ProfileUpdate};
use crate::order::{Group, OrderIndex};
use crate::reorder::ReorderService;
use crate::session::{
    self, AUTH_IDENTITY_KEY, GUEST_IDENTITY_KEY, MIGRATION_INTENT_KEY, MigrationIntent,
    SessionStore,
};
use crate::timestamp::now_us;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// User details extracted by the OAuth backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginDetails {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A successful third-party sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginEvent {
    /// Backend name, e.g. `google-oauth2`.
    pub provider: String,
    /// Provider-side user id.
    pub uid: String,
    pub details: LoginDetails,
    /// Raw provider profile response.
    pub response: Value,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What happened to the session's guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuestHandOff {
    /// No guest or no intent in the session.
    None,
    /// The session referenced a guest that no longer exists.
    Skipped { guest_identity_id: i64 },
    Merged { guest_identity_id: i64, boards: usize },
    Discarded { guest_identity_id: i64 },
}

impl GuestHandOff {
    /// Whether the guest row was consumed.
    #[must_use]
    pub const fn consumed_guest(self) -> bool {
        matches!(self, Self::Merged { .. } | Self::Discarded { .. })
    }
}

/// State threaded through the pipeline steps of one login.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub event: LoginEvent,
    pub now_us: i64,
    pub guest_identity_id: Option<i64>,
    pub intent: Option<MigrationIntent>,
    /// Set by the pre-create stage.
    pub identity: Option<Identity>,
    pub is_new: bool,
    pub hand_off: GuestHandOff,
    pub default_board_id: Option<i64>,
    /// Set by the cleanup stage; applied to the session after commit.
    pub clear_intent: bool,
}

impl MigrationContext {
    /// Seed a context from the event and the session's guest state.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    pub fn from_session(event: &LoginEvent, session: &dyn SessionStore) -> Result<Self> {
        Ok(Self {
            event: event.clone(),
            now_us: now_us(),
            guest_identity_id: session::guest_identity_id(session)?,
            intent: session::migration_intent(session)?,
            identity: None,
            is_new: false,
            hand_off: GuestHandOff::None,
            default_board_id: None,
            clear_intent: false,
        })
    }

    fn registered(&self, step: &'static str) -> Result<&Identity> {
        self.identity
            .as_ref()
            .ok_or(KanbanError::IdentityUnresolved(step))
    }
}

// ---------------------------------------------------------------------------
// Pipeline table
// ---------------------------------------------------------------------------

/// Lifecycle points at which the OAuth collaborator runs steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PreCreate,
    PostCreate,
    PostLogin,
    Cleanup,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreCreate => "pre-create",
            Self::PostCreate => "post-create",
            Self::PostLogin => "post-login",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Step = fn(&Connection, &mut MigrationContext) -> Result<()>;

pub struct PipelineStep {
    pub stage: Stage,
    pub name: &'static str,
    pub run: Step,
}

/// Every login step, in execution order.
pub const LOGIN_PIPELINE: &[PipelineStep] = &[
    PipelineStep {
        stage: Stage::PreCreate,
        name: "resolve_registered_identity",
        run: resolve_registered_identity,
    },
    PipelineStep {
        stage: Stage::PostCreate,
        name: "hand_off_guest",
        run: hand_off_guest,
    },
    PipelineStep {
        stage: Stage::PostCreate,
        name: "bootstrap_default_board",
        run: bootstrap_default_board,
    },
    PipelineStep {
        stage: Stage::PostLogin,
        name: "sync_profile",
        run: sync_profile,
    },
    PipelineStep {
        stage: Stage::PostLogin,
        name: "record_login",
        run: record_login,
    },
    PipelineStep {
        stage: Stage::Cleanup,
        name: "clear_migration_intent",
        run: clear_migration_intent,
    },
];

/// Provider response keys copied into the identity profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    FirstName,
    LastName,
    Email,
    AvatarUrl,
}

/// Profile field map per provider.
pub const PROVIDER_FIELD_MAP: &[(&str, &[(ProfileField, &str)])] = &[(
    "google-oauth2",
    &[
        (ProfileField::FirstName, "given_name"),
        (ProfileField::LastName, "family_name"),
        (ProfileField::Email, "email"),
        (ProfileField::AvatarUrl, "picture"),
    ],
)];

fn field_map(provider: &str) -> Option<&'static [(ProfileField, &'static str)]> {
    PROVIDER_FIELD_MAP
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, fields)| *fields)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn resolve_registered_identity(conn: &Connection, ctx: &mut MigrationContext) -> Result<()> {
    if ctx.identity.is_some() {
        return Ok(());
    }

    let details = &ctx.event.details;
    let email = non_empty(details.email.as_deref());
    let existing = match email.as_deref() {
        Some(email) => identities::find_registered_by_email(conn, email)?,
        None => None,
    };
    let existing = match existing {
        Some(identity) => Some(identity),
        None => identities::find_registered_by_username(conn, details.username.trim())?,
    };

    if let Some(identity) = existing {
        debug!(identity_id = identity.identity_id, "matched registered identity");
        ctx.identity = Some(identity);
        ctx.is_new = false;
        return Ok(());
    }

    let base = non_empty(Some(details.username.as_str())).unwrap_or_else(|| ctx.event.uid.clone());
    let username = available_username(conn, &base)?;
    let new = NewIdentity {
        first_name: non_empty(details.first_name.as_deref()),
        last_name: non_empty(details.last_name.as_deref()),
        ..NewIdentity::registered(username, ctx.now_us).with_email(email)
    };
    let identity = identities::insert_identity(conn, &new)?;
    info!(
        identity_id = identity.identity_id,
        provider = %ctx.event.provider,
        "created registered identity"
    );
    ctx.identity = Some(identity);
    ctx.is_new = true;
    Ok(())
}

fn available_username(conn: &Connection, base: &str) -> Result<String> {
    if !identities::username_taken(conn, base)? {
        return Ok(base.to_string());
    }
    loop {
        let candidate = format!("{base}{:04x}", rand::random::<u16>());
        if !identities::username_taken(conn, &candidate)? {
            return Ok(candidate);
        }
    }
}

fn hand_off_guest(conn: &Connection, ctx: &mut MigrationContext) -> Result<()> {
    let (Some(guest_identity_id), Some(intent)) = (ctx.guest_identity_id, ctx.intent) else {
        ctx.hand_off = GuestHandOff::None;
        return Ok(());
    };
    let registered_id = ctx.registered("hand_off_guest")?.identity_id;

    if identities::find_guest(conn, guest_identity_id)?.is_none() {
        warn!(guest_identity_id, %intent, "guest hand-off skipped: guest is gone");
        ctx.hand_off = GuestHandOff::Skipped { guest_identity_id };
        return Ok(());
    }

    ctx.hand_off = match intent {
        MigrationIntent::Merge => {
            let guest_boards = boards::list_boards(conn, guest_identity_id)?;
            let mut position = OrderIndex::new(conn).append(Group::boards_of(registered_id))?;
            for board in &guest_boards {
                boards::reassign_board(conn, board.board_id, registered_id, position)?;
                position += 1;
            }
            identities::delete_identity(conn, guest_identity_id)?;
            info!(
                guest_identity_id,
                identity_id = registered_id,
                boards = guest_boards.len(),
                "merged guest into registered identity"
            );
            GuestHandOff::Merged {
                guest_identity_id,
                boards: guest_boards.len(),
            }
        }
        MigrationIntent::Discard => {
            identities::delete_identity(conn, guest_identity_id)?;
            info!(guest_identity_id, "discarded guest identity");
            GuestHandOff::Discarded { guest_identity_id }
        }
    };
    Ok(())
}

fn bootstrap_default_board(conn: &Connection, ctx: &mut MigrationContext) -> Result<()> {
    if !ctx.is_new || ctx.intent == Some(MigrationIntent::Merge) {
        return Ok(());
    }
    let identity_id = ctx.registered("bootstrap_default_board")?.identity_id;
    let board = ReorderService::new(conn).create_default_board(identity_id)?;
    ctx.default_board_id = Some(board.board_id);
    Ok(())
}

fn sync_profile(conn: &Connection, ctx: &mut MigrationContext) -> Result<()> {
    let identity_id = ctx.registered("sync_profile")?.identity_id;
    let Some(fields) = field_map(&ctx.event.provider) else {
        debug!(provider = %ctx.event.provider, "no profile field map for provider");
        return Ok(());
    };

    let mut update = ProfileUpdate::default();
    for (field, key) in fields {
        let value = non_empty(ctx.event.response.get(*key).and_then(Value::as_str));
        if value.is_none() {
            continue;
        }
        match field {
            ProfileField::FirstName => update.first_name = value,
            ProfileField::LastName => update.last_name = value,
            ProfileField::Email => update.email = value,
            ProfileField::AvatarUrl => update.avatar_url = value,
        }
    }

    if !update.is_empty() {
        identities::update_profile(conn, identity_id, &update)?;
    }
    Ok(())
}

fn record_login(conn: &Connection, ctx: &mut MigrationContext) -> Result<()> {
    let identity_id = ctx.registered("record_login")?.identity_id;
    identities::record_login(conn, identity_id, ctx.now_us)?;
    ctx.identity = Some(identities::get_identity(conn, identity_id)?);
    Ok(())
}

fn clear_migration_intent(_conn: &Connection, ctx: &mut MigrationContext) -> Result<()> {
    ctx.clear_intent = true;
    Ok(())
}

/// Apply the session side of whatever `ctx` has committed so far.
fn write_session(session: &mut dyn SessionStore, ctx: &MigrationContext) -> Result<()> {
    if ctx.hand_off.consumed_guest() {
        session.delete(GUEST_IDENTITY_KEY)?;
    }
    if ctx.clear_intent {
        session.delete(MIGRATION_INTENT_KEY)?;
        if let Some(identity) = &ctx.identity {
            session.set(AUTH_IDENTITY_KEY, &identity.identity_id.to_string())?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Result of one completed login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub is_new: bool,
    pub hand_off: GuestHandOff,
    pub default_board_id: Option<i64>,
}

pub struct IdentityMergeService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> IdentityMergeService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Run the steps of one stage against `ctx` in a single transaction,
    /// then write what the stage settled back to `session`.
    ///
    /// A consumed guest is forgotten as soon as its stage commits. The
    /// cleanup stage removes the migration intent and logs the session in.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; the stage is rolled back and
    /// the session is left untouched.
    pub fn run_stage(
        &self,
        stage: Stage,
        ctx: &mut MigrationContext,
        session: &mut dyn SessionStore,
    ) -> Result<()> {
        db::immediate(self.conn, |conn| {
            for step in LOGIN_PIPELINE.iter().filter(|step| step.stage == stage) {
                debug!(stage = %stage, step = step.name, "running login step");
                (step.run)(conn, &mut *ctx)?;
            }
            Ok(())
        })?;
        write_session(session, ctx)
    }

    /// Run the full pipeline for `event` and update the session.
    ///
    /// On success the session is logged in as the registered identity, the
    /// migration intent is removed, and a consumed guest is forgotten.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. Nothing is written in that case.
    pub fn complete_login(
        &self,
        session: &mut dyn SessionStore,
        event: &LoginEvent,
    ) -> Result<LoginOutcome> {
        let mut ctx = MigrationContext::from_session(event, session)?;

        db::immediate(self.conn, |conn| {
            for step in LOGIN_PIPELINE {
                debug!(stage = %step.stage, step = step.name, "running login step");
                (step.run)(conn, &mut ctx)?;
            }
            Ok(())
        })?;

        let identity = ctx.registered("complete_login")?.clone();
        write_session(session, &ctx)?;

        info!(
            identity_id = identity.identity_id,
            is_new = ctx.is_new,
            hand_off = ?ctx.hand_off,
            "login completed"
        );
        Ok(LoginOutcome {
            identity,
            is_new: ctx.is_new,
            hand_off: ctx.hand_off,
            default_board_id: ctx.default_board_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::guest::resolver::{GuestIdentityResolver, NoCredentials};
    use crate::model::board::NewCard;
    use crate::reorder::DEFAULT_BOARD_TITLE;
    use crate::session::{MemorySession, set_migration_intent};
    use serde_json::json;

    fn google_login(username: &str, email: &str) -> LoginEvent {
        LoginEvent {
            provider: "google-oauth2".into(),
            uid: format!("uid-{username}"),
            details: LoginDetails {
                username: username.into(),
                email: Some(email.into()),
                ..LoginDetails::default()
            },
            response: json!({
                "given_name": "Ada",
                "family_name": "",
                "email": email,
                "picture": "https://img.example.com/ada.png",
            }),
        }
    }

    fn board_titles(conn: &Connection, owner: i64) -> Vec<(String, i64)> {
        boards::list_boards(conn, owner)
            .expect("boards")
            .into_iter()
            .map(|board| (board.title, board.position))
            .collect()
    }

    /// A guest with its default board plus one extra board holding a card.
    fn guest_with_work(conn: &Connection, session: &mut MemorySession) -> i64 {
        let guest = GuestIdentityResolver::new(conn, &NoCredentials)
            .resolve(session)
            .expect("guest")
            .identity
            .identity_id;
        let service = ReorderService::new(conn);
        let sprint = service
            .create_board(guest, "Sprint", &["Now"])
            .expect("board");
        let column = boards::list_columns(conn, sprint.board_id).expect("columns")[0].column_id;
        service
            .add_card(column, guest, &NewCard::titled("finish merge"))
            .expect("card");
        guest
    }

    #[test]
    fn pipeline_stages_run_in_declared_order() {
        let stages: Vec<Stage> = LOGIN_PIPELINE.iter().map(|step| step.stage).collect();
        let mut sorted = stages.clone();
        sorted.sort_by_key(|stage| {
            [Stage::PreCreate, Stage::PostCreate, Stage::PostLogin, Stage::Cleanup]
                .iter()
                .position(|s| s == stage)
        });
        assert_eq!(stages, sorted);
    }

    #[test]
    fn brand_new_identity_gets_default_board_and_profile() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();

        let outcome = IdentityMergeService::new(&conn)
            .complete_login(&mut session, &google_login("ada", "ada@example.com"))
            .expect("login");

        assert!(outcome.is_new);
        assert_eq!(outcome.hand_off, GuestHandOff::None);
        assert!(outcome.default_board_id.is_some());
        assert_eq!(
            board_titles(&conn, outcome.identity.identity_id),
            [(DEFAULT_BOARD_TITLE.to_string(), 0)]
        );
        assert_eq!(outcome.identity.first_name.as_deref(), Some("Ada"));
        assert!(outcome.identity.last_name.is_none(), "empty values are skipped");
        assert_eq!(
            outcome.identity.avatar_url.as_deref(),
            Some("https://img.example.com/ada.png")
        );
        assert!(outcome.identity.last_login_at_us.is_some());
        assert_eq!(
            session::authenticated_identity_id(&session).expect("read"),
            Some(outcome.identity.identity_id)
        );
    }

    #[test]
    fn returning_identity_is_matched_by_email() {
        let conn = open_in_memory().expect("open");
        let service = IdentityMergeService::new(&conn);
        let first = service
            .complete_login(&mut MemorySession::new(), &google_login("ada", "ada@example.com"))
            .expect("first login");

        let again = service
            .complete_login(
                &mut MemorySession::new(),
                &google_login("ada-renamed", "ADA@example.com"),
            )
            .expect("second login");

        assert!(!again.is_new);
        assert_eq!(again.identity.identity_id, first.identity.identity_id);
        assert!(again.default_board_id.is_none());
        assert_eq!(board_titles(&conn, first.identity.identity_id).len(), 1);
    }

    #[test]
    fn merge_appends_guest_boards_after_existing_ones() {
        let conn = open_in_memory().expect("open");
        let service = IdentityMergeService::new(&conn);
        let registered = service
            .complete_login(&mut MemorySession::new(), &google_login("ada", "ada@example.com"))
            .expect("register")
            .identity
            .identity_id;
        ReorderService::new(&conn)
            .create_board(registered, "Personal", &[])
            .expect("board");

        let mut session = MemorySession::new();
        let guest = guest_with_work(&conn, &mut session);
        set_migration_intent(&mut session, MigrationIntent::Merge).expect("intent");

        let outcome = service
            .complete_login(&mut session, &google_login("ada", "ada@example.com"))
            .expect("merge login");

        assert_eq!(
            outcome.hand_off,
            GuestHandOff::Merged {
                guest_identity_id: guest,
                boards: 2
            }
        );
        assert_eq!(
            board_titles(&conn, registered),
            [
                (DEFAULT_BOARD_TITLE.to_string(), 0),
                ("Personal".to_string(), 1),
                (DEFAULT_BOARD_TITLE.to_string(), 2),
                ("Sprint".to_string(), 3),
            ]
        );
        assert!(identities::find_identity(&conn, guest).expect("query").is_none());
        let cards: i64 = conn
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))
            .expect("count");
        assert_eq!(cards, 1, "cards travel with their board");
        assert!(session::migration_intent(&session).expect("read").is_none());
        assert!(session::guest_identity_id(&session).expect("read").is_none());
    }

    #[test]
    fn merge_into_new_identity_skips_default_board() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();
        guest_with_work(&conn, &mut session);
        set_migration_intent(&mut session, MigrationIntent::Merge).expect("intent");

        let outcome = IdentityMergeService::new(&conn)
            .complete_login(&mut session, &google_login("grace", "grace@example.com"))
            .expect("login");

        assert!(outcome.is_new);
        assert!(outcome.default_board_id.is_none());
        assert_eq!(
            board_titles(&conn, outcome.identity.identity_id),
            [
                (DEFAULT_BOARD_TITLE.to_string(), 0),
                ("Sprint".to_string(), 1),
            ]
        );
    }

    #[test]
    fn discard_deletes_guest_and_bootstraps_new_identity() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();
        let guest = guest_with_work(&conn, &mut session);
        set_migration_intent(&mut session, MigrationIntent::Discard).expect("intent");

        let outcome = IdentityMergeService::new(&conn)
            .complete_login(&mut session, &google_login("grace", "grace@example.com"))
            .expect("login");

        assert_eq!(
            outcome.hand_off,
            GuestHandOff::Discarded {
                guest_identity_id: guest
            }
        );
        assert!(outcome.default_board_id.is_some());
        assert!(boards::list_boards(&conn, guest).expect("boards").is_empty());
        let cards: i64 = conn
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))
            .expect("count");
        assert_eq!(cards, 0);
    }

    #[test]
    fn replayed_login_does_not_migrate_twice() {
        let conn = open_in_memory().expect("open");
        let service = IdentityMergeService::new(&conn);
        let mut session = MemorySession::new();
        guest_with_work(&conn, &mut session);
        set_migration_intent(&mut session, MigrationIntent::Merge).expect("intent");

        let event = google_login("grace", "grace@example.com");
        let first = service.complete_login(&mut session, &event).expect("first");
        assert!(matches!(first.hand_off, GuestHandOff::Merged { .. }));

        // A second guest appears on the same session before the replay.
        GuestIdentityResolver::new(&conn, &NoCredentials)
            .resolve(&mut session)
            .expect("new guest");

        let replay = service.complete_login(&mut session, &event).expect("replay");
        assert_eq!(replay.hand_off, GuestHandOff::None);
        assert_eq!(
            board_titles(&conn, first.identity.identity_id).len(),
            2,
            "replay must not pull in the second guest"
        );
    }

    #[test]
    fn missing_guest_is_skipped_but_intent_still_cleared() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();
        session.set(GUEST_IDENTITY_KEY, "4242").expect("set");
        set_migration_intent(&mut session, MigrationIntent::Discard).expect("intent");

        let outcome = IdentityMergeService::new(&conn)
            .complete_login(&mut session, &google_login("grace", "grace@example.com"))
            .expect("login");

        assert_eq!(
            outcome.hand_off,
            GuestHandOff::Skipped {
                guest_identity_id: 4242
            }
        );
        assert!(session::migration_intent(&session).expect("read").is_none());
    }

    #[test]
    fn stages_can_be_driven_one_at_a_time() {
        let conn = open_in_memory().expect("open");
        let service = IdentityMergeService::new(&conn);
        let mut session = MemorySession::new();
        let mut ctx =
            MigrationContext::from_session(&google_login("lin", "lin@example.com"), &session)
                .expect("context");

        let err = service
            .run_stage(Stage::PostLogin, &mut ctx, &mut session)
            .expect_err("identity not resolved yet");
        assert!(matches!(err, KanbanError::IdentityUnresolved("sync_profile")));

        service
            .run_stage(Stage::PreCreate, &mut ctx, &mut session)
            .expect("pre-create");
        assert!(ctx.is_new);
        service
            .run_stage(Stage::PostCreate, &mut ctx, &mut session)
            .expect("post-create");
        assert!(ctx.default_board_id.is_some());
        assert!(
            session::authenticated_identity_id(&session).expect("read").is_none(),
            "not logged in before cleanup"
        );
        service
            .run_stage(Stage::Cleanup, &mut ctx, &mut session)
            .expect("cleanup");
        assert!(ctx.clear_intent);
    }

    #[test]
    fn staged_merge_clears_intent_so_replay_is_inert() {
        let conn = open_in_memory().expect("open");
        let service = IdentityMergeService::new(&conn);
        let mut session = MemorySession::new();
        let guest = guest_with_work(&conn, &mut session);
        set_migration_intent(&mut session, MigrationIntent::Merge).expect("intent");

        let event = google_login("grace", "grace@example.com");
        let mut ctx = MigrationContext::from_session(&event, &session).expect("context");
        for stage in [Stage::PreCreate, Stage::PostCreate, Stage::PostLogin, Stage::Cleanup] {
            service
                .run_stage(stage, &mut ctx, &mut session)
                .unwrap_or_else(|err| panic!("{stage}: {err}"));
        }

        assert_eq!(
            ctx.hand_off,
            GuestHandOff::Merged {
                guest_identity_id: guest,
                boards: 2
            }
        );
        let registered = ctx.identity.as_ref().expect("identity").identity_id;
        assert!(session::migration_intent(&session).expect("read").is_none());
        assert!(session::guest_identity_id(&session).expect("read").is_none());
        assert_eq!(
            session::authenticated_identity_id(&session).expect("read"),
            Some(registered)
        );

        // A new guest on the same session must not be swept into the account.
        let second = GuestIdentityResolver::new(&conn, &NoCredentials)
            .resolve(&mut MemorySession::new())
            .expect("other guest")
            .identity
            .identity_id;
        session
            .set(GUEST_IDENTITY_KEY, &second.to_string())
            .expect("set");
        let mut replay = MigrationContext::from_session(&event, &session).expect("context");
        assert!(replay.intent.is_none());
        for stage in [Stage::PreCreate, Stage::PostCreate, Stage::PostLogin, Stage::Cleanup] {
            service
                .run_stage(stage, &mut replay, &mut session)
                .unwrap_or_else(|err| panic!("{stage}: {err}"));
        }
        assert_eq!(replay.hand_off, GuestHandOff::None);
        assert!(identities::find_identity(&conn, second).expect("query").is_some());
        assert_eq!(board_titles(&conn, registered).len(), 2);
    }

    #[test]
    fn consumed_guest_is_forgotten_once_post_create_commits() {
        let conn = open_in_memory().expect("open");
        let service = IdentityMergeService::new(&conn);
        let mut session = MemorySession::new();
        guest_with_work(&conn, &mut session);
        set_migration_intent(&mut session, MigrationIntent::Discard).expect("intent");

        let mut ctx =
            MigrationContext::from_session(&google_login("grace", "grace@example.com"), &session)
                .expect("context");
        service
            .run_stage(Stage::PreCreate, &mut ctx, &mut session)
            .expect("pre-create");
        service
            .run_stage(Stage::PostCreate, &mut ctx, &mut session)
            .expect("post-create");

        assert!(session::guest_identity_id(&session).expect("read").is_none());
        assert_eq!(
            session::migration_intent(&session).expect("read"),
            Some(MigrationIntent::Discard),
            "intent stays until cleanup"
        );
    }

    #[test]
    fn taken_username_gets_a_suffix() {
        let conn = open_in_memory().expect("open");
        identities::insert_identity(&conn, &NewIdentity::guest("ada", 1)).expect("guest");

        let outcome = IdentityMergeService::new(&conn)
            .complete_login(&mut MemorySession::new(), &google_login("ada", "ada@example.com"))
            .expect("login");

        assert!(outcome.is_new);
        assert!(outcome.identity.username.starts_with("ada"));
        assert_ne!(outcome.identity.username, "ada");
    }
}
