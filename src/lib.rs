//! Backup Monitor core - ingestion and statistics for backup-run metrics
//!
//! Imports backup-run events from an append-only JSONL log into SQLite and
//! derives time-series statistics for a dashboard:
//! - Exactly-once insertion keyed by `backup_id`, safe under repeated imports
//! - Additive-only schema migrations applied on every startup
//! - Retention eviction after each import pass
//! - Windowed summaries with per-record throughput averages and failure trends

pub mod config;
pub mod db;
pub mod importer;
pub mod record;
pub mod scheduler;
pub mod stats;
