//! Dense sibling ordering.
//!
//! Boards are ordered per identity, columns per board and cards per column.
//! A member can change group only through [`OrderIndex::move_to_group`],
//! which keeps both the old and the new group dense. Within one [`Group`] the `position` values of live members are always
//! exactly `0..n`. Every mutation here runs inside the `order_index`
//! savepoint, so a shift that fails halfway is rolled back before the error
//! reaches the caller. Callers are expected to hold a `BEGIN IMMEDIATE`
//! transaction (see [`crate::db::immediate`]) so concurrent shifts on the
//! same group are serialized by SQLite's writer lock.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::Result;
use crate::error::KanbanError;
use crate::model::Entity;

/// The three ordered entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordered {
    Board,
    Column,
    Card,
}

impl Ordered {
    const fn table(self) -> &'static str {
        match self {
            Self::Board => "boards",
            Self::Column => "columns",
            Self::Card => "cards",
        }
    }

    const fn id_column(self) -> &'static str {
        match self {
            Self::Board => "board_id",
            Self::Column => "column_id",
            Self::Card => "card_id",
        }
    }

    /// Column holding the group key (the parent id).
    const fn group_column(self) -> &'static str {
        match self {
            Self::Board => "identity_id",
            Self::Column => "board_id",
            Self::Card => "column_id",
        }
    }

    #[must_use]
    pub const fn entity(self) -> Entity {
        match self {
            Self::Board => Entity::Board,
            Self::Column => Entity::Column,
            Self::Card => Entity::Card,
        }
    }
}

/// A sibling set sharing one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Group {
    pub kind: Ordered,
    pub key: i64,
}

impl Group {
    #[must_use]
    pub const fn boards_of(identity_id: i64) -> Self {
        Self {
            kind: Ordered::Board,
            key: identity_id,
        }
    }

    #[must_use]
    pub const fn columns_of(board_id: i64) -> Self {
        Self {
            kind: Ordered::Column,
            key: board_id,
        }
    }

    #[must_use]
    pub const fn cards_of(column_id: i64) -> Self {
        Self {
            kind: Ordered::Card,
            key: column_id,
        }
    }
}

/// One ordered row as seen by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: i64,
    pub group: Group,
    pub position: i64,
}

/// Applies order mutations to one connection.
pub struct OrderIndex<'conn> {
    conn: &'conn Connection,
}

impl<'conn> OrderIndex<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Load a member by id.
    ///
    /// # Errors
    ///
    /// Returns [`KanbanError::NotFound`] when no row matches.
    pub fn member(&self, kind: Ordered, id: i64) -> Result<Member> {
        let sql = format!(
            "SELECT {group}, position FROM {table} WHERE {id_col} = ?1",
            group = kind.group_column(),
            table = kind.table(),
            id_col = kind.id_column(),
        );
        self.conn
            .query_row(&sql, [id], |row| {
                Ok(Member {
                    id,
                    group: Group {
                        kind,
                        key: row.get(0)?,
                    },
                    position: row.get(1)?,
                })
            })
            .optional()?
            .ok_or_else(|| KanbanError::not_found(kind.entity(), id))
    }

    /// Number of live members in `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, group: Group) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE {group_col} = ?1",
            table = group.kind.table(),
            group_col = group.kind.group_column(),
        );
        Ok(self.conn.query_row(&sql, [group.key], |row| row.get(0))?)
    }

    /// Position a new member of `group` must take: the current member count.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn append(&self, group: Group) -> Result<i64> {
        self.count(group)
    }

    /// Move `id` directly in front of `target_id`.
    ///
    /// Positions are re-read inside the savepoint. Members between the two
    /// slots shift by one toward the vacated slot.
    ///
    /// # Errors
    ///
    /// Returns [`KanbanError::NotFound`] if either row is missing and
    /// [`KanbanError::GroupMismatch`] if they have different parents. No row
    /// is modified in either case.
    pub fn move_before(&self, kind: Ordered, id: i64, target_id: i64) -> Result<()> {
        self.savepoint(|| {
            let entity = self.member(kind, id)?;
            let target = self.member(kind, target_id)?;
            if entity.group != target.group {
                return Err(KanbanError::GroupMismatch {
                    entity: kind.entity(),
                    id,
                    target: target_id,
                });
            }

            let (from, to) = (entity.position, target.position);
            match from.cmp(&to) {
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Greater => {
                    self.shift(entity.group, to, from, 1)?;
                    self.set_position(kind, id, to)?;
                }
                std::cmp::Ordering::Less => {
                    self.shift(entity.group, from + 1, to, -1)?;
                    self.set_position(kind, id, to - 1)?;
                }
            }
            debug!(kind = ?kind, id, target_id, from, to, "moved before");
            Ok(())
        })
    }

    /// Move `id` to the last slot of its group.
    ///
    /// A member that is already last is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`KanbanError::NotFound`] if the row is missing.
    pub fn move_to_end(&self, kind: Ordered, id: i64) -> Result<()> {
        self.savepoint(|| {
            let entity = self.member(kind, id)?;
            let last = self.count(entity.group)? - 1;
            if entity.position >= last {
                return Ok(());
            }
            self.shift(entity.group, entity.position + 1, last + 1, -1)?;
            self.set_position(kind, id, last)?;
            debug!(kind = ?kind, id, from = entity.position, to = last, "moved to end");
            Ok(())
        })
    }

    /// Re-parent `id` into `target`, appending it there, and close the gap
    /// it leaves in its old group. Returns the new position.
    ///
    /// Moving into the group it already belongs to behaves like
    /// [`Self::move_to_end`].
    ///
    /// # Errors
    ///
    /// Returns [`KanbanError::NotFound`] if the row is missing and
    /// [`KanbanError::GroupMismatch`] if `target` holds another kind.
    pub fn move_to_group(&self, kind: Ordered, id: i64, target: Group) -> Result<i64> {
        self.savepoint(|| {
            let entity = self.member(kind, id)?;
            if target.kind != kind {
                return Err(KanbanError::GroupMismatch {
                    entity: kind.entity(),
                    id,
                    target: target.key,
                });
            }
            if entity.group == target {
                self.move_to_end(kind, id)?;
                return Ok(self.count(target)? - 1);
            }

            let position = self.count(target)?;
            let sql = format!(
                "UPDATE {table} SET {group_col} = ?2, position = ?3 WHERE {id_col} = ?1",
                table = kind.table(),
                group_col = kind.group_column(),
                id_col = kind.id_column(),
            );
            self.conn.execute(&sql, params![id, target.key, position])?;
            self.shift(entity.group, entity.position + 1, i64::MAX, -1)?;
            debug!(
                kind = ?kind,
                id,
                from_key = entity.group.key,
                to_key = target.key,
                position,
                "moved to group"
            );
            Ok(position)
        })
    }

    /// Delete `id` and close the gap it leaves.
    ///
    /// Child rows go with it through the schema's cascades.
    ///
    /// # Errors
    ///
    /// Returns [`KanbanError::NotFound`] if the row is missing.
    pub fn remove(&self, kind: Ordered, id: i64) -> Result<Member> {
        self.savepoint(|| {
            let entity = self.member(kind, id)?;
            let sql = format!(
                "DELETE FROM {table} WHERE {id_col} = ?1",
                table = kind.table(),
                id_col = kind.id_column(),
            );
            self.conn.execute(&sql, [id])?;
            self.shift(entity.group, entity.position + 1, i64::MAX, -1)?;
            debug!(kind = ?kind, id, position = entity.position, "removed");
            Ok(entity)
        })
    }

    /// Members of `group` in ascending position.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, group: Group) -> Result<Vec<Member>> {
        let sql = format!(
            "SELECT {id_col}, position FROM {table}
             WHERE {group_col} = ?1
             ORDER BY position, {id_col}",
            id_col = group.kind.id_column(),
            table = group.kind.table(),
            group_col = group.kind.group_column(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([group.key], |row| {
            Ok(Member {
                id: row.get(0)?,
                group,
                position: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Whether the positions of `group` are exactly `0..n`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_dense(&self, group: Group) -> Result<bool> {
        let members = self.list(group)?;
        Ok(members
            .iter()
            .zip(0_i64..)
            .all(|(member, expected)| member.position == expected))
    }

    /// Add `delta` to every member of `group` with position in `[lo, hi)`.
    fn shift(&self, group: Group, lo: i64, hi: i64, delta: i64) -> Result<usize> {
        if lo >= hi {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {table} SET position = position + ?4
             WHERE {group_col} = ?1 AND position >= ?2 AND position < ?3",
            table = group.kind.table(),
            group_col = group.kind.group_column(),
        );
        let shifted = self.conn.execute(&sql, params![group.key, lo, hi, delta])?;
        debug!(kind = ?group.kind, key = group.key, lo, hi, delta, shifted, "shifted range");
        Ok(shifted)
    }

    fn set_position(&self, kind: Ordered, id: i64, position: i64) -> Result<()> {
        let sql = format!(
            "UPDATE {table} SET position = ?2 WHERE {id_col} = ?1",
            table = kind.table(),
            id_col = kind.id_column(),
        );
        self.conn.execute(&sql, params![id, position])?;
        Ok(())
    }

    fn savepoint<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute_batch("SAVEPOINT order_index")?;
        match f() {
            Ok(value) => {
                self.conn.execute_batch("RELEASE order_index")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO order_index; RELEASE order_index")
                {
                    tracing::error!(error = %rollback, "rollback of order_index savepoint");
                }
                Err(err)
            }
        }
    }
}
