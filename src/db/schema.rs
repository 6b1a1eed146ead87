//! SQL DDL for initializing the site storage.

/// SQLite schema with:
/// - `counter`: exactly one row (`id = 1`) holding the global chat counter
/// - `config`: flat key/value settings, `updated_at` as RFC3339 text
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS counter (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    value INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO counter (id, value) VALUES (1, 0);

CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL -- RFC3339
);
"#;
