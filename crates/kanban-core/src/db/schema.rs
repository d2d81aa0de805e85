//! Canonical SQLite schema for the kanban store.
//!
//! - `identities` holds registered and guest identities
//! - `boards`, `columns`, `cards` form the ownership hierarchy; each carries a
//!   `position` that is dense within its parent (see [`crate::order`])
//! - deletes cascade identity -> board -> column -> card through foreign keys
//! - `session_entries` backs the SQLite session store
//! - `store_meta` tracks the applied schema version

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS identities (
    identity_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE CHECK (length(trim(username)) > 0),
    is_guest INTEGER NOT NULL DEFAULT 0 CHECK (is_guest IN (0, 1)),
    email TEXT,
    first_name TEXT,
    last_name TEXT,
    avatar_url TEXT CHECK (avatar_url IS NULL OR length(avatar_url) <= 500),
    last_login_at_us INTEGER,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS boards (
    board_id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id INTEGER NOT NULL REFERENCES identities(identity_id) ON DELETE CASCADE,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0 AND length(title) <= 255),
    starred INTEGER NOT NULL DEFAULT 0 CHECK (starred IN (0, 1)),
    is_default INTEGER NOT NULL DEFAULT 0 CHECK (is_default IN (0, 1)),
    position INTEGER NOT NULL CHECK (position >= 0),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS columns (
    column_id INTEGER PRIMARY KEY AUTOINCREMENT,
    board_id INTEGER NOT NULL REFERENCES boards(board_id) ON DELETE CASCADE,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0 AND length(title) <= 255),
    position INTEGER NOT NULL CHECK (position >= 0),
    created_at_us INTEGER NOT NULL,
    UNIQUE (board_id, title)
);

CREATE TABLE IF NOT EXISTS cards (
    card_id INTEGER PRIMARY KEY AUTOINCREMENT,
    column_id INTEGER NOT NULL REFERENCES columns(column_id) ON DELETE CASCADE,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0 AND length(title) <= 255),
    body TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high')),
    position INTEGER NOT NULL CHECK (position >= 0),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS session_entries (
    session_key TEXT NOT NULL CHECK (length(trim(session_key)) > 0),
    entry_key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at_us INTEGER NOT NULL,
    PRIMARY KEY (session_key, entry_key)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER));
";

/// Migration v2: ordering and sweep indexes.
///
/// Positions are deliberately not UNIQUE: a range shift rewrites rows one at
/// a time and would trip a unique index halfway through the statement.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_boards_identity_position
    ON boards(identity_id, position);

CREATE INDEX IF NOT EXISTS idx_boards_identity_updated
    ON boards(identity_id, updated_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_columns_board_position
    ON columns(board_id, position);

CREATE INDEX IF NOT EXISTS idx_cards_column_position
    ON cards(column_id, position);

CREATE INDEX IF NOT EXISTS idx_identities_guest_created
    ON identities(is_guest, created_at_us);

CREATE INDEX IF NOT EXISTS idx_identities_guest_last_login
    ON identities(is_guest, last_login_at_us);
";

/// Indexes every migrated store must carry.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_boards_identity_position",
    "idx_boards_identity_updated",
    "idx_columns_board_position",
    "idx_cards_column_position",
    "idx_identities_guest_created",
    "idx_identities_guest_last_login",
];
