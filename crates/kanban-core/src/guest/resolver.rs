//! Three-tier identity resolution.
//!
//! 1. a registered identity from the credential check,
//! 2. the live guest remembered by the session,
//! 3. a fresh guest with a starter board.
//!
//! Two first requests racing on one session may each create a guest. The
//! loser's guest is never referenced again and the sweep reclaims it as an
//! unused new account.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::Result;
use crate::db::{self, identities};
use crate::model::identity::{Identity, NewIdentity};
use crate::reorder::ReorderService;
use crate::session::{self, GUEST_IDENTITY_KEY, SessionStore};
use crate::timestamp::now_us;

/// Prefix of generated guest usernames.
pub const GUEST_USERNAME_PREFIX: &str = "user_";

/// Checks whether the request carries a registered identity.
pub trait CredentialCheck {
    /// Returns the authenticated registered identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn try_authenticate(
        &self,
        conn: &Connection,
        session: &dyn SessionStore,
    ) -> Result<Option<Identity>>;
}

/// Never authenticates; every caller is a guest.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialCheck for NoCredentials {
    fn try_authenticate(
        &self,
        _conn: &Connection,
        _session: &dyn SessionStore,
    ) -> Result<Option<Identity>> {
        Ok(None)
    }
}

/// Authenticates from the registered identity id stored in the session by a
/// completed login.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLogin;

impl CredentialCheck for SessionLogin {
    fn try_authenticate(
        &self,
        conn: &Connection,
        session: &dyn SessionStore,
    ) -> Result<Option<Identity>> {
        match session::authenticated_identity_id(session)? {
            Some(identity_id) => identities::find_registered(conn, identity_id),
            None => Ok(None),
        }
    }
}

/// Authenticates as one fixed registered identity.
#[derive(Debug, Clone, Copy)]
pub struct FixedIdentity(pub i64);

impl CredentialCheck for FixedIdentity {
    fn try_authenticate(
        &self,
        conn: &Connection,
        _session: &dyn SessionStore,
    ) -> Result<Option<Identity>> {
        identities::find_registered(conn, self.0)
    }
}

/// Which tier answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Registered,
    ExistingGuest,
    NewGuest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub identity: Identity,
    pub via: Resolution,
}

pub struct GuestIdentityResolver<'a> {
    conn: &'a Connection,
    credentials: &'a dyn CredentialCheck,
}

impl<'a> GuestIdentityResolver<'a> {
    pub fn new(conn: &'a Connection, credentials: &'a dyn CredentialCheck) -> Self {
        Self { conn, credentials }
    }

    /// Resolve the identity behind `session`, creating a guest if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup or the guest creation fails.
    pub fn resolve(&self, session: &mut dyn SessionStore) -> Result<Resolved> {
        if let Some(identity) = self.credentials.try_authenticate(self.conn, session)? {
            return Ok(Resolved {
                identity,
                via: Resolution::Registered,
            });
        }

        if let Some(guest_id) = session::guest_identity_id(session)? {
            if let Some(identity) = identities::find_guest(self.conn, guest_id)? {
                debug!(identity_id = identity.identity_id, "resolved session guest");
                return Ok(Resolved {
                    identity,
                    via: Resolution::ExistingGuest,
                });
            }
            debug!(guest_id, "session guest no longer exists");
        }

        let identity = self.create_guest()?;
        session.set(GUEST_IDENTITY_KEY, &identity.identity_id.to_string())?;
        Ok(Resolved {
            identity,
            via: Resolution::NewGuest,
        })
    }

    /// Create a guest identity together with its default board.
    ///
    /// # Errors
    ///
    /// Returns an error if either insert fails; nothing is kept in that case.
    pub fn create_guest(&self) -> Result<Identity> {
        db::immediate(self.conn, |conn| {
            let username = unused_guest_username(conn)?;
            let identity =
                identities::insert_identity(conn, &NewIdentity::guest(username, now_us()))?;
            ReorderService::new(conn).create_default_board(identity.identity_id)?;
            info!(
                identity_id = identity.identity_id,
                username = %identity.username,
                "created guest identity"
            );
            Ok(identity)
        })
    }
}

/// `user_` followed by ten lowercase hex digits.
#[must_use]
pub fn random_guest_username() -> String {
    format!("{GUEST_USERNAME_PREFIX}{:010x}", rand::random::<u64>() >> 24)
}

fn unused_guest_username(conn: &Connection) -> Result<String> {
    loop {
        let candidate = random_guest_username();
        if !identities::username_taken(conn, &candidate)? {
            return Ok(candidate);
        }
        debug!(candidate, "guest username collision, drawing again");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{boards, open_in_memory};
    use crate::session::{AUTH_IDENTITY_KEY, MemorySession};

    #[test]
    fn guest_usernames_have_fixed_shape() {
        for _ in 0..64 {
            let name = random_guest_username();
            let suffix = name.strip_prefix(GUEST_USERNAME_PREFIX).expect("prefix");
            assert_eq!(suffix.len(), 10, "{name}");
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn first_call_creates_guest_with_default_board() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();
        let resolver = GuestIdentityResolver::new(&conn, &NoCredentials);

        let resolved = resolver.resolve(&mut session).expect("resolve");
        assert_eq!(resolved.via, Resolution::NewGuest);
        assert!(resolved.identity.is_guest);
        assert!(resolved.identity.email.is_none());
        assert_eq!(
            session::guest_identity_id(&session).expect("read"),
            Some(resolved.identity.identity_id)
        );

        let owned = boards::list_boards(&conn, resolved.identity.identity_id).expect("boards");
        assert_eq!(owned.len(), 1);
        assert!(owned[0].is_default);
    }

    #[test]
    fn second_call_reuses_session_guest() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();
        let resolver = GuestIdentityResolver::new(&conn, &NoCredentials);

        let first = resolver.resolve(&mut session).expect("first");
        let second = resolver.resolve(&mut session).expect("second");
        assert_eq!(second.via, Resolution::ExistingGuest);
        assert_eq!(first.identity.identity_id, second.identity.identity_id);
    }

    #[test]
    fn deleted_guest_is_replaced() {
        let conn = open_in_memory().expect("open");
        let mut session = MemorySession::new();
        let resolver = GuestIdentityResolver::new(&conn, &NoCredentials);

        let first = resolver.resolve(&mut session).expect("first");
        identities::delete_identity(&conn, first.identity.identity_id).expect("delete");

        let second = resolver.resolve(&mut session).expect("second");
        assert_eq!(second.via, Resolution::NewGuest);
        assert_ne!(first.identity.identity_id, second.identity.identity_id);
    }

    #[test]
    fn session_pointing_at_registered_identity_is_not_a_guest() {
        let conn = open_in_memory().expect("open");
        let alice = identities::insert_identity(&conn, &NewIdentity::registered("alice", 1))
            .expect("alice");
        let mut session = MemorySession::new();
        session
            .set(GUEST_IDENTITY_KEY, &alice.identity_id.to_string())
            .expect("set");

        let resolved = GuestIdentityResolver::new(&conn, &NoCredentials)
            .resolve(&mut session)
            .expect("resolve");
        assert_eq!(resolved.via, Resolution::NewGuest);
        assert_ne!(resolved.identity.identity_id, alice.identity_id);
    }

    #[test]
    fn registered_credentials_win() {
        let conn = open_in_memory().expect("open");
        let alice = identities::insert_identity(&conn, &NewIdentity::registered("alice", 1))
            .expect("alice");
        let mut session = MemorySession::new();
        session
            .set(AUTH_IDENTITY_KEY, &alice.identity_id.to_string())
            .expect("set");

        let resolved = GuestIdentityResolver::new(&conn, &SessionLogin)
            .resolve(&mut session)
            .expect("resolve");
        assert_eq!(resolved.via, Resolution::Registered);
        assert_eq!(resolved.identity.identity_id, alice.identity_id);
        assert!(session::guest_identity_id(&session).expect("read").is_none());

        let fixed = GuestIdentityResolver::new(&conn, &FixedIdentity(alice.identity_id))
            .resolve(&mut MemorySession::new())
            .expect("resolve");
        assert_eq!(fixed.via, Resolution::Registered);
    }
}
