use rusqlite::Connection;

// Idempotent; the store is expected to exist already in production, so this
// only fills in what is missing.
const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    size INTEGER,
    hash TEXT,
    modified_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_hash ON records(lower(hash));
CREATE INDEX IF NOT EXISTS idx_records_name ON records(name);

-- Append-only log written in the same transaction as each mutation
CREATE TABLE IF NOT EXISTS record_changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    snapshot TEXT,
    changed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_record_changes_record_id ON record_changes(record_id);
"#;

pub(crate) fn ensure(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
