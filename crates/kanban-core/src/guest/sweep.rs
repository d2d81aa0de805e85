//! Offline reclamation of guest identities.
//!
//! Two independent passes, each deleting with full cascade:
//!
//! - **stale**: the guest last logged in before `now - inactive_days`
//!   (guests that never logged in are never stale);
//! - **unused new account**: the guest was created before
//!   `now - grace_period_hours`, owns exactly one board, that board is its
//!   untouched default board, and no card exists under it.
//!
//! Each pass selects and deletes inside one immediate transaction, so only
//! guests that still qualify at delete time are removed. The unused pass
//! never counts a guest the stale pass already matched, so a dry run
//! reports exactly what a real run would delete.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::Result;
use crate::config::SweepConfig;
use crate::db::{self, identities};
use crate::error::KanbanError;
use crate::lock::SweepLock;
use crate::timestamp::to_us;

/// How long a scheduled sweep waits for an overlapping run.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    pub inactive_days: u32,
    pub grace_period_hours: u32,
    pub dry_run: bool,
}

impl From<&SweepConfig> for SweepOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            inactive_days: config.inactive_days,
            grace_period_hours: config.grace_period_hours,
            dry_run: false,
        }
    }
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            inactive_days: 14,
            grace_period_hours: 24,
            dry_run: false,
        }
    }
}

/// Counts per pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stale: usize,
    pub unused_new: usize,
    pub dry_run: bool,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            f.write_str("[DRY RUN] ")?;
        }
        write!(
            f,
            "Deleted {} stale guests and {} unused new accounts",
            self.stale, self.unused_new
        )
    }
}

fn cutoff(
    now: DateTime<Utc>,
    age: Option<TimeDelta>,
    field: &'static str,
    value: u32,
) -> Result<i64> {
    age.and_then(|age| now.checked_sub_signed(age))
        .map(to_us)
        .ok_or_else(|| KanbanError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

fn collect_ids(conn: &Connection, sql: &str, cutoff_us: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([cutoff_us], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
}

/// Guests whose last login is strictly older than `cutoff_us`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn stale_guest_ids(conn: &Connection, cutoff_us: i64) -> Result<Vec<i64>> {
    collect_ids(
        conn,
        "SELECT identity_id FROM identities
         WHERE is_guest = 1
           AND last_login_at_us IS NOT NULL
           AND last_login_at_us < ?1
         ORDER BY identity_id",
        cutoff_us,
    )
}

/// Guests created before `cutoff_us` that still own nothing but an empty
/// default board.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn unused_guest_ids(conn: &Connection, cutoff_us: i64) -> Result<Vec<i64>> {
    collect_ids(
        conn,
        "SELECT i.identity_id FROM identities i
         WHERE i.is_guest = 1
           AND i.created_at_us < ?1
           AND (SELECT COUNT(*) FROM boards b WHERE b.identity_id = i.identity_id) = 1
           AND EXISTS (
               SELECT 1 FROM boards b
               WHERE b.identity_id = i.identity_id AND b.is_default = 1
           )
           AND NOT EXISTS (
               SELECT 1 FROM cards k
               JOIN columns c ON c.column_id = k.column_id
               JOIN boards b ON b.board_id = c.board_id
               WHERE b.identity_id = i.identity_id
           )
         ORDER BY i.identity_id",
        cutoff_us,
    )
}

/// Delete `ids` and return the ones that were actually removed.
fn delete_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<i64>> {
    let mut deleted = Vec::with_capacity(ids.len());
    for id in ids {
        if identities::delete_identity(conn, *id)? {
            deleted.push(*id);
        }
    }
    Ok(deleted)
}

/// Select matches with `select` and, unless `dry_run`, delete them in the
/// same immediate transaction so a guest cannot become ineligible between
/// the check and the delete.
fn sweep_pass(
    conn: &Connection,
    dry_run: bool,
    select: impl FnOnce(&Connection) -> Result<Vec<i64>>,
) -> Result<Vec<i64>> {
    if dry_run {
        return select(conn);
    }
    db::immediate(conn, |conn| {
        let ids = select(conn)?;
        delete_ids(conn, &ids)
    })
}

/// Staleness pass. Returns the matched guest ids (deleted unless `dry_run`).
///
/// # Errors
///
/// Returns an error if the cutoff is out of range or a query fails.
pub fn cleanup_stale_guests(
    conn: &Connection,
    now: DateTime<Utc>,
    inactive_days: u32,
    dry_run: bool,
) -> Result<Vec<i64>> {
    let cutoff_us = cutoff(
        now,
        TimeDelta::try_days(i64::from(inactive_days)),
        "inactive_days",
        inactive_days,
    )?;
    let ids = sweep_pass(conn, dry_run, |conn| stale_guest_ids(conn, cutoff_us))?;
    info!(matched = ids.len(), dry_run, inactive_days, "stale guest pass");
    Ok(ids)
}

/// Unused-new-account pass. Ids in `exclude` are never matched.
///
/// # Errors
///
/// Returns an error if the cutoff is out of range or a query fails.
pub fn cleanup_unused_guests(
    conn: &Connection,
    now: DateTime<Utc>,
    grace_period_hours: u32,
    dry_run: bool,
    exclude: &[i64],
) -> Result<Vec<i64>> {
    let cutoff_us = cutoff(
        now,
        TimeDelta::try_hours(i64::from(grace_period_hours)),
        "grace_period_hours",
        grace_period_hours,
    )?;
    let ids = sweep_pass(conn, dry_run, |conn| {
        Ok(unused_guest_ids(conn, cutoff_us)?
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .collect())
    })?;
    info!(matched = ids.len(), dry_run, grace_period_hours, "unused guest pass");
    Ok(ids)
}

/// Run both passes against `now`.
///
/// # Errors
///
/// Returns an error if either pass fails. A failed pass leaves no partial
/// deletes; an earlier pass stays committed.
pub fn run_sweep(
    conn: &Connection,
    now: DateTime<Utc>,
    opts: &SweepOptions,
) -> Result<SweepReport> {
    let stale = cleanup_stale_guests(conn, now, opts.inactive_days, opts.dry_run)?;
    let unused =
        cleanup_unused_guests(conn, now, opts.grace_period_hours, opts.dry_run, &stale)?;
    let report = SweepReport {
        stale: stale.len(),
        unused_new: unused.len(),
        dry_run: opts.dry_run,
    };
    info!(
        stale = report.stale,
        unused_new = report.unused_new,
        dry_run = report.dry_run,
        "guest sweep finished"
    );
    Ok(report)
}

/// [`run_sweep`] under the exclusive advisory lock at `lock_path`.
///
/// # Errors
///
/// Returns [`KanbanError::Lock`] when another sweep holds the lock past
/// `timeout`, or any sweep error.
pub fn run_sweep_locked(
    conn: &Connection,
    lock_path: &Path,
    timeout: Duration,
    now: DateTime<Utc>,
    opts: &SweepOptions,
) -> Result<SweepReport> {
    let lock = SweepLock::acquire(lock_path, timeout)?;
    let report = run_sweep(conn, now, opts);
    lock.release();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{boards, open_in_memory};
    use crate::model::board::NewCard;
    use crate::model::identity::NewIdentity;
    use crate::reorder::ReorderService;

    const HOUR_US: i64 = 3_600_000_000;
    const DAY_US: i64 = 24 * HOUR_US;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_800_000_000, 0).expect("valid timestamp")
    }

    /// Insert a guest with its default board.
    fn guest(
        conn: &Connection,
        name: &str,
        created_at_us: i64,
        last_login_us: Option<i64>,
    ) -> i64 {
        let id = identities::insert_identity(
            conn,
            &NewIdentity::guest(name, created_at_us).with_last_login(last_login_us),
        )
        .expect("guest")
        .identity_id;
        ReorderService::new(conn)
            .create_default_board(id)
            .expect("default board");
        id
    }

    fn exists(conn: &Connection, id: i64) -> bool {
        identities::find_identity(conn, id).expect("query").is_some()
    }

    #[test]
    fn options_follow_config_defaults() {
        let opts = SweepOptions::from(&SweepConfig::default());
        assert_eq!(opts, SweepOptions::default());
    }

    #[test]
    fn report_summary_format() {
        let report = SweepReport {
            stale: 3,
            unused_new: 1,
            dry_run: false,
        };
        assert_eq!(
            report.to_string(),
            "Deleted 3 stale guests and 1 unused new accounts"
        );
        let dry = SweepReport {
            dry_run: true,
            ..report
        };
        assert_eq!(
            dry.to_string(),
            "[DRY RUN] Deleted 3 stale guests and 1 unused new accounts"
        );
    }

    #[test]
    fn staleness_is_strict_and_ignores_never_logged_in() {
        let conn = open_in_memory().expect("open");
        let now_us = to_us(now());
        let cutoff_us = now_us - 14 * DAY_US;

        let old = guest(&conn, "user_old", 0, Some(cutoff_us - 1));
        let edge = guest(&conn, "user_edge", 0, Some(cutoff_us));
        let never = guest(&conn, "user_never", 0, None);

        let matched = cleanup_stale_guests(&conn, now(), 14, false).expect("sweep");
        assert_eq!(matched, vec![old]);
        assert!(!exists(&conn, old));
        assert!(exists(&conn, edge));
        assert!(exists(&conn, never));
    }

    #[test]
    fn registered_identities_are_never_swept() {
        let conn = open_in_memory().expect("open");
        let alice = identities::insert_identity(
            &conn,
            &NewIdentity::registered("alice", 0).with_last_login(Some(0)),
        )
        .expect("alice")
        .identity_id;
        ReorderService::new(&conn)
            .create_default_board(alice)
            .expect("board");

        let report = run_sweep(&conn, now(), &SweepOptions::default()).expect("sweep");
        assert_eq!(report, SweepReport::default());
        assert!(exists(&conn, alice));
    }

    #[test]
    fn unused_pass_requires_pristine_default_board() {
        let conn = open_in_memory().expect("open");
        let old = to_us(now()) - 2 * DAY_US;
        let service = ReorderService::new(&conn);

        let pristine = guest(&conn, "user_pristine", old, None);
        let young = guest(&conn, "user_young", to_us(now()) - HOUR_US, None);

        let with_card = guest(&conn, "user_card", old, None);
        let board = boards::list_boards(&conn, with_card).expect("boards")[0].board_id;
        let column = boards::list_columns(&conn, board).expect("columns")[0].column_id;
        service
            .add_card(column, with_card, &NewCard::titled("keep me"))
            .expect("card");

        let two_boards = guest(&conn, "user_two", old, None);
        service
            .create_board(two_boards, "Extra", &[])
            .expect("board");

        let custom = identities::insert_identity(&conn, &NewIdentity::guest("user_custom", old))
            .expect("guest")
            .identity_id;
        service.create_board(custom, "Mine", &["A"]).expect("board");

        let boards_before: i64 = conn
            .query_row("SELECT COUNT(*) FROM boards", [], |row| row.get(0))
            .expect("count");

        let matched = cleanup_unused_guests(&conn, now(), 24, false, &[]).expect("sweep");
        assert_eq!(matched, vec![pristine]);
        assert!(!exists(&conn, pristine));
        assert!(boards::list_boards(&conn, pristine).expect("boards").is_empty());
        let boards_after: i64 = conn
            .query_row("SELECT COUNT(*) FROM boards", [], |row| row.get(0))
            .expect("count");
        assert_eq!(boards_after, boards_before - 1);
        let orphan_columns: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM columns
                 WHERE board_id NOT IN (SELECT board_id FROM boards)",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(orphan_columns, 0);
        for kept in [young, with_card, two_boards, custom] {
            assert!(exists(&conn, kept), "guest {kept} must survive");
        }
    }

    #[test]
    fn guest_that_gains_a_card_mid_sweep_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kanban.db");
        let sweeper = db::open_store(&path).expect("open");
        let old = to_us(now()) - 2 * DAY_US;
        let busy = guest(&sweeper, "user_busy", old, None);
        let board = boards::list_boards(&sweeper, busy).expect("boards")[0].board_id;
        let column = boards::list_columns(&sweeper, board).expect("columns")[0].column_id;

        // Another request holds the writer lock while it adds a card.
        let request = db::open_store(&path).expect("open");
        request.execute_batch("BEGIN IMMEDIATE").expect("begin");
        ReorderService::new(&request)
            .add_card(column, busy, &NewCard::titled("just in time"))
            .expect("card");
        let committer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            request.execute_batch("COMMIT").expect("commit");
        });

        let report = run_sweep(&sweeper, now(), &SweepOptions::default()).expect("sweep");
        committer.join().expect("committer");

        assert_eq!(report.unused_new, 0);
        assert!(exists(&sweeper, busy));
        assert_eq!(boards::list_cards(&sweeper, column).expect("cards").len(), 1);
    }

    #[test]
    fn pass_joins_an_open_transaction() {
        let conn = open_in_memory().expect("open");
        let now_us = to_us(now());
        let stale = guest(&conn, "user_stale", 0, Some(now_us - 20 * DAY_US));

        conn.execute_batch("BEGIN IMMEDIATE").expect("begin");
        let deleted = cleanup_stale_guests(&conn, now(), 14, false).expect("sweep");
        assert_eq!(deleted, vec![stale]);
        conn.execute_batch("ROLLBACK").expect("rollback");

        assert!(exists(&conn, stale));
    }

    #[test]
    fn dry_run_matches_real_run_without_deleting() {
        let conn = open_in_memory().expect("open");
        let now_us = to_us(now());
        // Matches both passes: counted once, as stale.
        guest(&conn, "user_both", now_us - 30 * DAY_US, Some(now_us - 20 * DAY_US));
        guest(&conn, "user_unused", now_us - 2 * DAY_US, None);
        let active = guest(&conn, "user_active", now_us - 30 * DAY_US, Some(now_us - DAY_US));
        ReorderService::new(&conn)
            .create_board(active, "Plans", &[])
            .expect("board");

        let opts = SweepOptions {
            dry_run: true,
            ..SweepOptions::default()
        };
        let dry = run_sweep(&conn, now(), &opts).expect("dry run");
        assert_eq!((dry.stale, dry.unused_new), (1, 1));
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .expect("count");
        assert_eq!(remaining, 3);

        let real = run_sweep(&conn, now(), &SweepOptions::default()).expect("real run");
        assert_eq!((real.stale, real.unused_new), (dry.stale, dry.unused_new));
        assert!(!real.dry_run);

        let again = run_sweep(&conn, now(), &SweepOptions::default()).expect("rerun");
        assert_eq!((again.stale, again.unused_new), (0, 0));
    }

    #[test]
    fn locked_sweep_releases_lock() {
        let conn = open_in_memory().expect("open");
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("sweep.lock");

        let opts = SweepOptions::default();
        run_sweep_locked(&conn, &lock_path, DEFAULT_LOCK_TIMEOUT, now(), &opts).expect("first");
        run_sweep_locked(&conn, &lock_path, Duration::from_millis(50), now(), &opts)
            .expect("lock was released");
    }

    #[test]
    fn locked_sweep_times_out_while_held() {
        let conn = open_in_memory().expect("open");
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("sweep.lock");
        let _held = SweepLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT).expect("hold");

        let err = run_sweep_locked(
            &conn,
            &lock_path,
            Duration::from_millis(50),
            now(),
            &SweepOptions::default(),
        )
        .expect_err("contended");
        assert!(matches!(err, KanbanError::Lock(_)));
    }
}
