//! Windowed summary statistics and failure trend breakdowns

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::Database;

/// Trailing window used by the default summary and trend views
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
/// Default bound for the "recent records" view
pub const DEFAULT_RECENT_LIMIT: i64 = 30;
/// Default bound for the "recent failures" view
pub const DEFAULT_FAILURE_LIMIT: i64 = 10;

/// Summary statistics over a trailing window.
///
/// Counts cover every record in the window; duration, size and rate figures
/// exclude zero-duration records. Rates carry full precision in bytes/sec,
/// with the MiB/s fields rounded to 2 decimals for presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_backups: i64,
    pub successful: i64,
    pub failed_backups: i64,
    /// Integer percent, rounded down
    pub success_rate: i64,
    pub avg_duration: i64,
    pub min_duration: i64,
    pub max_duration: i64,
    pub avg_size_bytes: i64,
    pub avg_overall_bps: f64,
    pub avg_archive_bps: f64,
    pub avg_upload_bps: f64,
    pub avg_volumes_bps: f64,
    pub avg_overall_mb_per_sec: f64,
    pub avg_archive_mb_per_sec: f64,
    pub avg_upload_mb_per_sec: f64,
    pub avg_volumes_mb_per_sec: f64,
}

/// Failure count for one (ISO week, category) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub week: String,
    pub error_category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    pub timestamp: String,
    pub backup_id: String,
    pub error_category: String,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct Aggregator {
    db: Database,
}

impl Aggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Summary over the trailing `window_days`. An empty window yields the
    /// all-zero summary, never an error.
    pub async fn summarize(&self, window_days: i64) -> Result<Summary> {
        let row = self.db.summary_row(&window_start(window_days)).await?;
        if row.total_backups == 0 {
            return Ok(Summary::default());
        }

        let avg_overall_bps = row.avg_overall_bps.unwrap_or(0.0);
        let avg_archive_bps = row.avg_archive_bps.unwrap_or(0.0);
        let avg_upload_bps = row.avg_upload_bps.unwrap_or(0.0);
        let avg_volumes_bps = row.avg_volumes_bps.unwrap_or(0.0);

        Ok(Summary {
            total_backups: row.total_backups,
            successful: row.successful,
            failed_backups: row.total_backups - row.successful,
            success_rate: row.successful * 100 / row.total_backups,
            avg_duration: row.avg_duration.unwrap_or(0.0) as i64,
            min_duration: row.min_duration.unwrap_or(0),
            max_duration: row.max_duration.unwrap_or(0),
            avg_size_bytes: row.avg_size_bytes.unwrap_or(0.0) as i64,
            avg_overall_bps,
            avg_archive_bps,
            avg_upload_bps,
            avg_volumes_bps,
            avg_overall_mb_per_sec: to_mb_per_sec(avg_overall_bps),
            avg_archive_mb_per_sec: to_mb_per_sec(avg_archive_bps),
            avg_upload_mb_per_sec: to_mb_per_sec(avg_upload_bps),
            avg_volumes_mb_per_sec: to_mb_per_sec(avg_volumes_bps),
        })
    }

    /// Failure counts per (ISO week, category) over the trailing window,
    /// ordered by week ascending.
    pub async fn failure_trends(&self, window_days: i64) -> Result<Vec<TrendPoint>> {
        let failed = self.db.failed_since(&window_start(window_days)).await?;

        let mut counts: BTreeMap<(String, String), i64> = BTreeMap::new();
        for (timestamp, category) in failed {
            let Some(week) = week_key(&timestamp) else {
                debug!("Skipping failure with unparseable timestamp {}", timestamp);
                continue;
            };
            *counts.entry((week, category)).or_insert(0) += 1;
        }

        Ok(counts
            .into_iter()
            .map(|((week, error_category), count)| TrendPoint {
                week,
                error_category,
                count,
            })
            .collect())
    }

    /// Most recent `limit` failed runs with their error details,
    /// most-recent first.
    pub async fn recent_failures(&self, limit: i64) -> Result<Vec<FailureDetail>> {
        let rows = self.db.recent_failures(limit).await?;
        Ok(rows
            .into_iter()
            .map(
                |(timestamp, backup_id, error_category, error_message)| FailureDetail {
                    timestamp,
                    backup_id,
                    error_category,
                    error_message,
                },
            )
            .collect())
    }
}

fn window_start(window_days: i64) -> String {
    (Utc::now() - chrono::Duration::days(window_days))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// ISO week period key, e.g. "2026-W34". Locale-independent: the week year
/// can differ from the calendar year around January 1st.
fn week_key(timestamp: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(timestamp.get(..10)?, "%Y-%m-%d").ok()?;
    let week = date.iso_week();
    Some(format!("{}-W{:02}", week.year(), week.week()))
}

/// 2-decimal MiB/s, the presentation rounding the raw bps fields avoid
fn to_mb_per_sec(bps: f64) -> f64 {
    (bps / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BackupRecord;
    use tempfile::TempDir;

    async fn open_db(dir: &TempDir) -> Database {
        let db = Database::new(dir.path().join("backups.db")).await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    fn record(backup_id: &str, timestamp: &str) -> BackupRecord {
        BackupRecord {
            timestamp: timestamp.to_string(),
            backup_id: backup_id.to_string(),
            success: true,
            duration_total: 60,
            duration_snapshot: 0,
            duration_archive: 0,
            duration_volumes: 0,
            duration_upload: 0,
            size_bytes: 1024,
            volume_bytes: 0,
            error_category: None,
            error_message: None,
        }
    }

    fn now_iso() -> String {
        Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    #[test]
    fn week_key_uses_iso_week_numbering() {
        // 2026-01-01 is a Thursday: still ISO week 1 of 2026
        assert_eq!(week_key("2026-01-01T12:00:00").as_deref(), Some("2026-W01"));
        assert_eq!(week_key("2026-01-05T00:00:00").as_deref(), Some("2026-W02"));
        // 2027-01-01 is a Friday: it belongs to 2026's last ISO week
        assert_eq!(week_key("2027-01-01T00:00:00").as_deref(), Some("2026-W53"));
        assert_eq!(week_key("garbage"), None);
    }

    #[tokio::test]
    async fn empty_window_yields_all_zero_summary() {
        let dir = TempDir::new().unwrap();
        let agg = Aggregator::new(open_db(&dir).await);
        assert_eq!(agg.summarize(30).await.unwrap(), Summary::default());
    }

    #[tokio::test]
    async fn archive_rate_is_mean_of_ratios_over_positive_denominators() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir).await;

        let mut fast = record("fast", &now_iso());
        fast.size_bytes = 104_857_600;
        fast.duration_total = 200;
        fast.duration_archive = 100;
        db.insert_if_absent(&fast).await.unwrap();

        // Zero archive duration: excluded from the archive average entirely
        let mut idle = record("idle", &now_iso());
        idle.size_bytes = 0;
        idle.duration_total = 50;
        idle.duration_archive = 0;
        db.insert_if_absent(&idle).await.unwrap();

        let summary = Aggregator::new(db).summarize(30).await.unwrap();
        assert_eq!(summary.avg_archive_bps, 1_048_576.0);
        assert_eq!(summary.avg_archive_mb_per_sec, 1.00);
    }

    #[tokio::test]
    async fn success_rate_is_floored_integer_percent() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir).await;

        for i in 0..7 {
            let mut r = record(&format!("run-{}", i), &now_iso());
            r.success = i < 5;
            if !r.success {
                r.error_category = Some("unknown".to_string());
            }
            db.insert_if_absent(&r).await.unwrap();
        }

        let summary = Aggregator::new(db).summarize(30).await.unwrap();
        assert_eq!(summary.total_backups, 7);
        assert_eq!(summary.successful, 5);
        assert_eq!(summary.failed_backups, 2);
        assert_eq!(summary.success_rate, 71);
    }

    #[tokio::test]
    async fn zero_duration_records_count_but_carry_no_stats() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir).await;

        let mut timed = record("timed", &now_iso());
        timed.duration_total = 100;
        timed.size_bytes = 5000;
        db.insert_if_absent(&timed).await.unwrap();

        let mut untimed = record("untimed", &now_iso());
        untimed.duration_total = 0;
        untimed.size_bytes = 1;
        db.insert_if_absent(&untimed).await.unwrap();

        let summary = Aggregator::new(db).summarize(30).await.unwrap();
        assert_eq!(summary.total_backups, 2);
        assert_eq!(summary.avg_duration, 100);
        assert_eq!(summary.min_duration, 100);
        assert_eq!(summary.max_duration, 100);
        assert_eq!(summary.avg_size_bytes, 5000);
        assert_eq!(summary.avg_overall_bps, 50.0);
    }

    #[tokio::test]
    async fn failure_trends_group_by_week_and_category() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir).await;

        let failures = [
            ("f1", "2026-01-01T03:00:00", Some("network")),
            ("f2", "2026-01-02T03:00:00", Some("network")),
            ("f3", "2026-01-02T09:00:00", None),
            ("f4", "2026-01-05T03:00:00", Some("disk")),
        ];
        for (id, ts, category) in failures {
            let mut r = record(id, ts);
            r.success = false;
            r.error_category = category.map(str::to_string);
            db.insert_if_absent(&r).await.unwrap();
        }

        let trends = Aggregator::new(db)
            .failure_trends(3650)
            .await
            .unwrap();
        let expected = [
            ("2026-W01", "network", 2),
            ("2026-W01", "unknown", 1),
            ("2026-W02", "disk", 1),
        ];
        assert_eq!(trends.len(), expected.len());
        for (point, (week, category, count)) in trends.iter().zip(expected) {
            assert_eq!(point.week, week);
            assert_eq!(point.error_category, category);
            assert_eq!(point.count, count);
        }
    }

    #[tokio::test]
    async fn recent_failures_are_bounded_and_newest_first() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir).await;

        for day in 1..=4 {
            let ts = format!("2026-08-0{}T02:00:00", day);
            let mut r = record(&format!("fail-{}", day), &ts);
            r.success = false;
            r.error_category = (day % 2 == 0).then(|| "network".to_string());
            r.error_message = Some(format!("boom {}", day));
            db.insert_if_absent(&r).await.unwrap();
        }
        // Successful runs never show up in the failure list
        db.insert_if_absent(&record("ok", "2026-08-05T02:00:00"))
            .await
            .unwrap();

        let failures = Aggregator::new(db).recent_failures(3).await.unwrap();
        let ids: Vec<_> = failures.iter().map(|f| f.backup_id.as_str()).collect();
        assert_eq!(ids, ["fail-4", "fail-3", "fail-2"]);
        assert_eq!(failures[0].error_category, "network");
        assert_eq!(failures[1].error_category, "unknown");
        assert_eq!(failures[0].error_message.as_deref(), Some("boom 4"));
    }
}
