//! Backup-run record model and log-line validation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a source log line was rejected instead of stored
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line is not a JSON object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),
    #[error("field '{0}' must be non-negative")]
    Negative(&'static str),
}

/// One completed backup run, as imported from the metrics log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Event time, ISO-8601. Ordering and retention key.
    pub timestamp: String,
    /// Globally unique run identifier. Deduplication key.
    pub backup_id: String,
    pub success: bool,
    pub duration_total: i64,
    pub duration_snapshot: i64,
    pub duration_archive: i64,
    pub duration_volumes: i64,
    pub duration_upload: i64,
    pub size_bytes: i64,
    pub volume_bytes: i64,
    /// Set only when `success` is false; defaults to "unknown" on failed runs.
    pub error_category: Option<String>,
    /// Set only when `success` is false.
    pub error_message: Option<String>,
}

impl BackupRecord {
    /// Parse and validate one line of the metrics log.
    ///
    /// Required fields must be present and coercible; optional numeric fields
    /// default to 0 when absent or null. Error fields are only kept on failed
    /// runs, even if the source line carries them on a success.
    pub fn from_line(line: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let timestamp = required_str(obj, "timestamp")?;
        let backup_id = required_str(obj, "backup_id")?;
        let success = match obj.get("success") {
            None | Some(Value::Null) => return Err(RecordError::MissingField("success")),
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(RecordError::WrongType("success")),
        };
        let duration_total = required_int(obj, "duration_total")?;
        let size_bytes = required_int(obj, "size_bytes")?;

        let duration_snapshot = optional_int(obj, "duration_snapshot")?;
        let duration_archive = optional_int(obj, "duration_archive")?;
        let duration_volumes = optional_int(obj, "duration_volumes")?;
        let duration_upload = optional_int(obj, "duration_upload")?;
        let volume_bytes = optional_int(obj, "volume_bytes")?;

        // Error details only carry meaning on a failed run
        let (error_category, error_message) = if success {
            (None, None)
        } else {
            let category = obj
                .get("error_category")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = obj
                .get("error_message")
                .and_then(Value::as_str)
                .map(str::to_string);
            (Some(category), message)
        };

        Ok(Self {
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
        })
    }

    /// Overall throughput in bytes/sec, 0.0 when the run recorded no duration
    pub fn overall_bps(&self) -> f64 {
        rate(self.size_bytes, self.duration_total)
    }

    pub fn archive_bps(&self) -> f64 {
        rate(self.size_bytes, self.duration_archive)
    }

    pub fn upload_bps(&self) -> f64 {
        rate(self.size_bytes, self.duration_upload)
    }

    pub fn volumes_bps(&self) -> f64 {
        rate(self.volume_bytes, self.duration_volumes)
    }
}

fn rate(bytes: i64, seconds: i64) -> f64 {
    if seconds > 0 {
        bytes as f64 / seconds as f64
    } else {
        0.0
    }
}

fn required_str(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, RecordError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(RecordError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RecordError::WrongType(field)),
    }
}

fn required_int(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<i64, RecordError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(RecordError::MissingField(field)),
        Some(v) => coerce_int(v, field),
    }
}

fn optional_int(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<i64, RecordError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => coerce_int(v, field),
    }
}

fn coerce_int(value: &Value, field: &'static str) -> Result<i64, RecordError> {
    let n = value.as_i64().ok_or(RecordError::WrongType(field))?;
    if n < 0 {
        return Err(RecordError::Negative(field));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_line() -> String {
        r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":true,
            "duration_total":120,"duration_archive":80,"size_bytes":1048576}"#
            .replace('\n', "")
    }

    #[test]
    fn parses_valid_line_with_defaults() {
        let record = BackupRecord::from_line(&valid_line()).unwrap();
        assert_eq!(record.backup_id, "run-1");
        assert!(record.success);
        assert_eq!(record.duration_total, 120);
        assert_eq!(record.duration_archive, 80);
        // absent optionals default to 0
        assert_eq!(record.duration_snapshot, 0);
        assert_eq!(record.duration_volumes, 0);
        assert_eq!(record.duration_upload, 0);
        assert_eq!(record.volume_bytes, 0);
        assert_eq!(record.error_category, None);
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            BackupRecord::from_line("not json at all"),
            Err(RecordError::Json(_))
        ));
        assert!(matches!(
            BackupRecord::from_line("[1, 2, 3]"),
            Err(RecordError::NotAnObject)
        ));
    }

    #[test]
    fn rejects_missing_required_field() {
        let line = r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":true,"size_bytes":10}"#;
        assert!(matches!(
            BackupRecord::from_line(line),
            Err(RecordError::MissingField("duration_total"))
        ));
    }

    #[test]
    fn wrong_type_is_treated_like_missing() {
        let line = r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":true,
            "duration_total":"two minutes","size_bytes":10}"#;
        assert!(matches!(
            BackupRecord::from_line(line),
            Err(RecordError::WrongType("duration_total"))
        ));
    }

    #[test]
    fn rejects_negative_duration() {
        let line = r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":true,
            "duration_total":-5,"size_bytes":10}"#;
        assert!(matches!(
            BackupRecord::from_line(line),
            Err(RecordError::Negative("duration_total"))
        ));
    }

    #[test]
    fn null_optional_defaults_to_zero() {
        let line = r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":true,
            "duration_total":10,"size_bytes":10,"volume_bytes":null}"#;
        let record = BackupRecord::from_line(line).unwrap();
        assert_eq!(record.volume_bytes, 0);
    }

    #[test]
    fn failed_run_defaults_error_category_to_unknown() {
        let line = r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":false,
            "duration_total":10,"size_bytes":10}"#;
        let record = BackupRecord::from_line(line).unwrap();
        assert_eq!(record.error_category.as_deref(), Some("unknown"));
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn error_fields_are_dropped_on_success() {
        let line = r#"{"timestamp":"2026-08-20T02:00:00","backup_id":"run-1","success":true,
            "duration_total":10,"size_bytes":10,
            "error_category":"network","error_message":"stale"}"#;
        let record = BackupRecord::from_line(line).unwrap();
        assert_eq!(record.error_category, None);
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn rate_helpers_guard_zero_denominators() {
        let mut record = BackupRecord::from_line(&valid_line()).unwrap();
        assert!((record.overall_bps() - 1048576.0 / 120.0).abs() < f64::EPSILON);
        assert!((record.archive_bps() - 1048576.0 / 80.0).abs() < f64::EPSILON);
        assert_eq!(record.upload_bps(), 0.0);
        assert_eq!(record.volumes_bps(), 0.0);

        record.duration_total = 0;
        assert_eq!(record.overall_bps(), 0.0);
    }
}
