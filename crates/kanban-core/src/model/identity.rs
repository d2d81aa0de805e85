use rusqlite::Row;
use serde::Serialize;

/// A registered or guest identity.
///
/// Guests are never promoted in place: a guest that signs up hands its
/// boards to a separate registered row and is then deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub identity_id: i64,
    pub username: String,
    pub is_guest: bool,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_login_at_us: Option<i64>,
    pub created_at_us: i64,
}

impl Identity {
    /// Column list matching [`Identity::from_row`].
    pub(crate) const COLUMNS: &'static str = "identity_id, username, is_guest, email, \
         first_name, last_name, avatar_url, last_login_at_us, created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identity_id: row.get(0)?,
            username: row.get(1)?,
            is_guest: row.get(2)?,
            email: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            avatar_url: row.get(6)?,
            last_login_at_us: row.get(7)?,
            created_at_us: row.get(8)?,
        })
    }
}

/// Insert payload for a new identity row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewIdentity {
    pub username: String,
    pub is_guest: bool,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub last_login_at_us: Option<i64>,
    pub created_at_us: i64,
}

impl NewIdentity {
    /// A guest without any usable credential.
    #[must_use]
    pub fn guest(username: impl Into<String>, created_at_us: i64) -> Self {
        Self {
            username: username.into(),
            is_guest: true,
            created_at_us,
            ..Self::default()
        }
    }

    /// A registered identity (credentials are held by the OAuth provider).
    #[must_use]
    pub fn registered(username: impl Into<String>, created_at_us: i64) -> Self {
        Self {
            username: username.into(),
            is_guest: false,
            created_at_us,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    #[must_use]
    pub const fn with_last_login(mut self, last_login_at_us: Option<i64>) -> Self {
        self.last_login_at_us = last_login_at_us;
        self
    }
}

/// Profile fields copied from an OAuth provider response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.avatar_url.is_none()
    }
}
