//! Database schema definitions

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    backup_id TEXT NOT NULL UNIQUE,
    success INTEGER NOT NULL,
    duration_total INTEGER NOT NULL,
    duration_snapshot INTEGER DEFAULT 0,
    duration_archive INTEGER DEFAULT 0,
    duration_volumes INTEGER DEFAULT 0,
    duration_upload INTEGER DEFAULT 0,
    size_bytes INTEGER NOT NULL,
    volume_bytes INTEGER DEFAULT 0,
    error_category TEXT,
    error_message TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

// For retention eviction and all time-windowed queries
pub const CREATE_INDEX_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_timestamp ON backups(timestamp)";

/// Columns added after the first schema version, paired with the ALTER that
/// backfills them on an older database. Additive only: columns are never
/// dropped or renamed, so pre-migration rows stay valid.
pub const COLUMN_MIGRATIONS: &[(&str, &str)] = &[
    (
        "volume_bytes",
        "ALTER TABLE backups ADD COLUMN volume_bytes INTEGER DEFAULT 0",
    ),
    (
        "error_category",
        "ALTER TABLE backups ADD COLUMN error_category TEXT",
    ),
    (
        "error_message",
        "ALTER TABLE backups ADD COLUMN error_message TEXT",
    ),
];
