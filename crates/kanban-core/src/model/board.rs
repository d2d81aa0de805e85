use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::KanbanError;

/// A board owned by exactly one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    pub board_id: i64,
    pub identity_id: i64,
    pub title: String,
    pub starred: bool,
    /// Set only by the default-board bootstrap.
    pub is_default: bool,
    pub position: i64,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Board {
    pub(crate) const COLUMNS: &'static str = "b.board_id, b.identity_id, b.title, b.starred, \
         b.is_default, b.position, b.created_at_us, b.updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            board_id: row.get(0)?,
            identity_id: row.get(1)?,
            title: row.get(2)?,
            starred: row.get(3)?,
            is_default: row.get(4)?,
            position: row.get(5)?,
            created_at_us: row.get(6)?,
            updated_at_us: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub column_id: i64,
    pub board_id: i64,
    pub title: String,
    pub position: i64,
    pub created_at_us: i64,
}

impl Column {
    pub(crate) const COLUMNS: &'static str =
        "c.column_id, c.board_id, c.title, c.position, c.created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            column_id: row.get(0)?,
            board_id: row.get(1)?,
            title: row.get(2)?,
            position: row.get(3)?,
            created_at_us: row.get(4)?,
        })
    }
}

/// Card priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = KanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(KanbanError::InvalidValue {
                field: "priority",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub card_id: i64,
    pub column_id: i64,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub position: i64,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Card {
    pub(crate) const COLUMNS: &'static str = "k.card_id, k.column_id, k.title, k.body, \
         k.priority, k.position, k.created_at_us, k.updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let priority: String = row.get(4)?;
        Ok(Self {
            card_id: row.get(0)?,
            column_id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            priority: priority.parse().map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?,
            position: row.get(5)?,
            created_at_us: row.get(6)?,
            updated_at_us: row.get(7)?,
        })
    }
}

/// Insert payload for a card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewCard {
    pub title: String,
    pub body: String,
    pub priority: Priority,
}

impl NewCard {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}
