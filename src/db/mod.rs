//! Durable store for backup-run records
//!
//! One SQLite table keyed by `backup_id`, with additive-only schema migrations
//! applied on every startup. The `INSERT OR IGNORE` insert is the single write
//! synchronization point: racing import passes can never double-count a run.

mod schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use crate::record::BackupRecord;

/// Raw aggregate row behind [`crate::stats::Aggregator::summarize`].
///
/// Counts cover every row in the window; duration, size and rate aggregates
/// only cover rows with `duration_total > 0`, and each rate average only rows
/// where its own denominator is positive.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub total_backups: i64,
    pub successful: i64,
    pub avg_duration: Option<f64>,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
    pub avg_size_bytes: Option<f64>,
    pub avg_overall_bps: Option<f64>,
    pub avg_archive_bps: Option<f64>,
    pub avg_upload_bps: Option<f64>,
    pub avg_volumes_bps: Option<f64>,
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Idempotent, additive-only schema setup. Safe to call on every startup;
    /// never drops or truncates existing data.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(schema::CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(schema::CREATE_INDEX_TIMESTAMP)
            .execute(&self.pool)
            .await?;

        // Backfill columns on databases created under an older schema
        for (column, ddl) in schema::COLUMN_MIGRATIONS {
            if !self.column_exists(column).await? {
                info!("Migrating database: adding column backups.{}", column);
                sqlx::query(ddl).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    async fn column_exists(&self, column: &str) -> Result<bool> {
        let rows = sqlx::query("PRAGMA table_info(backups)")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().any(|r| r.get::<String, _>("name") == column))
    }

    /// Insert a record unless its `backup_id` is already present.
    /// Returns whether a row was newly created. Atomic: concurrent calls with
    /// the same `backup_id` succeed exactly once.
    pub async fn insert_if_absent(&self, record: &BackupRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO backups
            (timestamp, backup_id, success, duration_total, duration_snapshot,
             duration_archive, duration_volumes, duration_upload, size_bytes,
             volume_bytes, error_category, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.timestamp)
        .bind(&record.backup_id)
        .bind(record.success)
        .bind(record.duration_total)
        .bind(record.duration_snapshot)
        .bind(record.duration_archive)
        .bind(record.duration_volumes)
        .bind(record.duration_upload)
        .bind(record.size_bytes)
        .bind(record.volume_bytes)
        .bind(&record.error_category)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Most recent `limit` records, returned chronological ascending.
    /// Equal timestamps keep insertion order.
    pub async fn recent_records(&self, limit: i64) -> Result<Vec<BackupRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORD} ORDER BY timestamp DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().rev().map(into_record).collect())
    }

    /// All records with `timestamp >= since`, chronological ascending.
    pub async fn records_since(&self, since: &str) -> Result<Vec<BackupRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORD} WHERE timestamp >= ? ORDER BY timestamp ASC, id ASC"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    /// Physically delete all rows strictly older than `cutoff`.
    /// Idempotent: re-running with the same cutoff deletes nothing further.
    pub async fn evict_older_than(&self, cutoff: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backups WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Aggregates over all rows with `timestamp >= since`.
    ///
    /// Rate averages are the mean of per-record ratios, not a ratio of sums,
    /// and every denominator is guarded by a positivity check.
    pub async fn summary_row(&self, since: &str) -> Result<SummaryRow> {
        let row: (
            i64,
            Option<i64>,
            Option<f64>,
            Option<i64>,
            Option<i64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) as total_backups,
                SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END) as successful,
                AVG(CASE WHEN duration_total > 0 THEN duration_total END) as avg_duration,
                MIN(CASE WHEN duration_total > 0 THEN duration_total END) as min_duration,
                MAX(CASE WHEN duration_total > 0 THEN duration_total END) as max_duration,
                AVG(CASE WHEN duration_total > 0 THEN size_bytes END) as avg_size,
                AVG(CASE WHEN duration_total > 0
                    THEN CAST(size_bytes AS REAL) / duration_total
                END) as avg_overall_bps,
                AVG(CASE WHEN duration_total > 0 AND duration_archive > 0
                    THEN CAST(size_bytes AS REAL) / duration_archive
                END) as avg_archive_bps,
                AVG(CASE WHEN duration_total > 0 AND duration_upload > 0
                    THEN CAST(size_bytes AS REAL) / duration_upload
                END) as avg_upload_bps,
                AVG(CASE WHEN duration_total > 0 AND duration_volumes > 0
                    THEN CAST(volume_bytes AS REAL) / duration_volumes
                END) as avg_volumes_bps
            FROM backups
            WHERE timestamp >= ?
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(SummaryRow {
            total_backups: row.0,
            successful: row.1.unwrap_or(0),
            avg_duration: row.2,
            min_duration: row.3,
            max_duration: row.4,
            avg_size_bytes: row.5,
            avg_overall_bps: row.6,
            avg_archive_bps: row.7,
            avg_upload_bps: row.8,
            avg_volumes_bps: row.9,
        })
    }

    /// Failed runs with `timestamp >= since` as (timestamp, category) pairs,
    /// chronological ascending. Unset categories read back as "unknown".
    pub async fn failed_since(&self, since: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT timestamp, COALESCE(error_category, 'unknown')
            FROM backups
            WHERE success = 0 AND timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Most recent `limit` failed runs, most-recent first.
    pub async fn recent_failures(
        &self,
        limit: i64,
    ) -> Result<Vec<(String, String, String, Option<String>)>> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT timestamp, backup_id, COALESCE(error_category, 'unknown'), error_message
            FROM backups
            WHERE success = 0
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// COALESCE keeps rows inserted before a column migration decodable as plain
// integers.
const SELECT_RECORD: &str = r#"
    SELECT timestamp, backup_id, success, duration_total,
           COALESCE(duration_snapshot, 0), COALESCE(duration_archive, 0),
           COALESCE(duration_volumes, 0), COALESCE(duration_upload, 0),
           size_bytes, COALESCE(volume_bytes, 0), error_category, error_message
    FROM backups
"#;

type RecordRow = (
    String,
    String,
    bool,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    Option<String>,
    Option<String>,
);

fn into_record(row: RecordRow) -> BackupRecord {
    let (
        timestamp,
        backup_id,
        success,
        duration_total,
        duration_snapshot,
        duration_archive,
        duration_volumes,
        duration_upload,
        size_bytes,
        volume_bytes,
        error_category,
        error_message,
    ) = row;
    BackupRecord {
        timestamp,
        backup_id,
        success,
        duration_total,
        duration_snapshot,
        duration_archive,
        duration_volumes,
        duration_upload,
        size_bytes,
        volume_bytes,
        error_category,
        error_message,
    }
}
