//! Configuration management
//!
//! Every setting has a documented default and an environment override; invalid
//! values fall back with a warning instead of failing startup. Fallback is per
//! setting: a bad retention value never touches the storage path.

use std::time::Duration;

use tracing::warn;

/// Floor for the import interval; smaller configured values are clamped
pub const MIN_IMPORT_INTERVAL: Duration = Duration::from_secs(60);
/// Ceiling for the import interval; larger (or non-finite) configured values
/// would overflow `Duration`
pub const MAX_IMPORT_INTERVAL: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug, Clone)]
pub struct Config {
    /// IMPORT_INTERVAL_HOURS, fractional hours between import passes
    pub import_interval_hours: f64,
    /// RETENTION_DAYS, records older than this are evicted
    pub retention_days: i64,
    /// DB_PATH, SQLite database location
    pub db_path: String,
    /// METRICS_FILE, append-only JSONL source log
    pub metrics_file: String,
}

fn default_import_interval_hours() -> f64 {
    12.0
}

fn default_retention_days() -> i64 {
    90
}

fn default_db_path() -> String {
    "/data/backups.db".to_string()
}

fn default_metrics_file() -> String {
    "/data/metrics.jsonl".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            import_interval_hours: default_import_interval_hours(),
            retention_days: default_retention_days(),
            db_path: default_db_path(),
            metrics_file: default_metrics_file(),
        }
    }
}

impl Config {
    /// Load from the environment. Never fails: each unparseable setting is
    /// replaced by its own default with a warning, leaving the others intact.
    pub fn load() -> Self {
        let settings = match config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to read environment, using defaults: {}", e);
                return Self::default();
            }
        };

        Self {
            import_interval_hours: field(
                &settings,
                "import_interval_hours",
                default_import_interval_hours(),
            ),
            retention_days: field(&settings, "retention_days", default_retention_days()),
            db_path: field(&settings, "db_path", default_db_path()),
            metrics_file: field(&settings, "metrics_file", default_metrics_file()),
        }
        .validated()
    }

    fn validated(mut self) -> Self {
        if self.retention_days < 1 {
            warn!(
                "RETENTION_DAYS must be positive (got {}), using default {}",
                self.retention_days,
                default_retention_days()
            );
            self.retention_days = default_retention_days();
        }
        self
    }

    /// Interval between import passes, clamped to
    /// [`MIN_IMPORT_INTERVAL`]..=[`MAX_IMPORT_INTERVAL`].
    /// Non-finite values take the default; never panics.
    pub fn import_interval(&self) -> Duration {
        let seconds = self.import_interval_hours * 3600.0;
        if !seconds.is_finite() {
            warn!(
                "IMPORT_INTERVAL_HOURS is not a finite number ({}), using default {}h",
                self.import_interval_hours,
                default_import_interval_hours()
            );
            return Duration::from_secs_f64(default_import_interval_hours() * 3600.0);
        }
        if seconds > MAX_IMPORT_INTERVAL.as_secs_f64() {
            warn!(
                "IMPORT_INTERVAL_HOURS too large ({}h), using maximum {} days",
                self.import_interval_hours,
                MAX_IMPORT_INTERVAL.as_secs() / (24 * 3600)
            );
            return MAX_IMPORT_INTERVAL;
        }
        if seconds < MIN_IMPORT_INTERVAL.as_secs_f64() {
            warn!(
                "IMPORT_INTERVAL_HOURS too small ({}h), using minimum 1 minute",
                self.import_interval_hours
            );
            return MIN_IMPORT_INTERVAL;
        }
        Duration::from_secs_f64(seconds)
    }
}

/// One setting with its own fallback: absent is normal, anything unparseable
/// warns and takes the default without disturbing the other settings.
fn field<T>(settings: &config::Config, key: &str, default: T) -> T
where
    T: serde::de::DeserializeOwned + std::fmt::Debug,
{
    match settings.get::<T>(key) {
        Ok(value) => value,
        Err(config::ConfigError::NotFound(_)) => default,
        Err(e) => {
            warn!(
                "Invalid {}, using default {:?}: {}",
                key.to_uppercase(),
                default,
                e
            );
            default
        }
    }
}
