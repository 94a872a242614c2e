//! Metrics log importer
//!
//! Reads the append-only JSONL log line by line, validates each line into a
//! [`BackupRecord`], and inserts it with dedup semantics. Every pass ends with
//! a retention eviction. A missing log file means "no data yet", not an error.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::record::BackupRecord;

/// Timestamps are compared as ISO-8601 strings, so cutoffs use the same
/// naive-UTC shape the producers write.
pub fn retention_cutoff(retention_days: i64) -> String {
    (Utc::now() - chrono::Duration::days(retention_days))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

pub struct Importer {
    db: Database,
    source: PathBuf,
    retention_days: i64,
}

impl Importer {
    pub fn new(db: Database, source: PathBuf, retention_days: i64) -> Self {
        Self {
            db,
            source,
            retention_days,
        }
    }

    /// Import every new record from the source log, then evict rows beyond
    /// the retention window. Returns the count of genuinely new records, not
    /// lines read and not duplicates.
    ///
    /// Idempotent: a second pass over an unchanged log inserts nothing.
    pub async fn import_batch(&self) -> Result<u64> {
        let inserted = match File::open(&self.source).await {
            Ok(file) => self.ingest(file).await?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Metrics file {} not found yet", self.source.display());
                0
            }
            Err(e) => return Err(e.into()),
        };

        let cutoff = retention_cutoff(self.retention_days);
        let evicted = self.db.evict_older_than(&cutoff).await?;
        if evicted > 0 {
            info!("Evicted {} records older than {}", evicted, cutoff);
        }

        Ok(inserted)
    }

    async fn ingest(&self, file: File) -> Result<u64> {
        let mut lines = BufReader::new(file).lines();
        let mut inserted = 0u64;
        let mut line_no = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match BackupRecord::from_line(&line) {
                Ok(record) => {
                    if self.db.insert_if_absent(&record).await? {
                        inserted += 1;
                    }
                }
                Err(e) => warn!("Skipping invalid line {}: {}", line_no, e),
            }
        }

        Ok(inserted)
    }
}
