//! Deployment report: one JSON record per line.

use chrono::{DateTime, SecondsFormat, Utc};
use confit_core::Coordinate;
use serde::{Deserialize, Serialize, Serializer};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::error;

/// Record type of deployment records.
pub const DEPLOY_RECORD: &str = "DEPLOY";

/// Detail type listing a predecessor that caused a skip.
pub const DETAIL_SKIPPED_BY: &str = "SKIPPED_BY";
/// Detail type naming the config that already owns a name.
pub const DETAIL_DUPLICATE_OF: &str = "DUPLICATE_OF";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Success,
    Error,
    Excluded,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detail {
    #[serde(rename = "type")]
    pub detail_type: String,
    pub message: String,
}

impl Detail {
    pub fn new(detail_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            detail_type: detail_type.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a single config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
    pub config: Coordinate,
    pub state: RecordState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Detail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Record {
    pub fn new(config: Coordinate, state: RecordState) -> Self {
        Self {
            record_type: DEPLOY_RECORD.to_string(),
            time: Utc::now(),
            config,
            state,
            details: Vec::new(),
            error: None,
        }
    }

    pub fn success(config: Coordinate) -> Self {
        Self::new(config, RecordState::Success)
    }

    pub fn failed(config: Coordinate, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(config, RecordState::Error)
        }
    }

    pub fn excluded(config: Coordinate) -> Self {
        Self::new(config, RecordState::Excluded)
    }

    pub fn skipped(config: Coordinate) -> Self {
        Self::new(config, RecordState::Skipped)
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.details.push(detail);
        self
    }
}

fn serialize_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Sink for deployment records.
///
/// Recording never fails the run; sinks log their own I/O errors.
pub trait Recorder: Send + Sync {
    fn record(&self, record: Record);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record(&self, _record: Record) {}
}

/// Keeps records in memory, in recording order.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<Record>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, record: Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

/// Appends records to a file, flushing after each line.
#[derive(Debug)]
pub struct FileRecorder {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileRecorder {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &Record) -> Result<(), ReportError> {
        let line = serde_json::to_string(record).map_err(|e| ReportError::Json {
            line: 0,
            source: e,
        })?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("report writer lock poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl Recorder for FileRecorder {
    fn record(&self, record: Record) {
        if let Err(e) = self.write_line(&record) {
            error!(path = %self.path.display(), config = %record.config, error = %e, "Failed to write report record");
        }
    }
}

/// Read a report file.
pub fn read_report(path: impl AsRef<Path>) -> Result<Vec<Record>, ReportError> {
    let file = File::open(path.as_ref())?;
    read_records(BufReader::new(file))
}

/// Read records, one per line. Blank lines are ignored; the first malformed
/// line is an error.
pub fn read_records(reader: impl BufRead) -> Result<Vec<Record>, ReportError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| ReportError::Json {
            line: idx + 1,
            source: e,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn coord(id: &str) -> Coordinate {
        Coordinate::new("p", "dashboard", id)
    }

    #[test]
    fn test_record_wire_format() {
        let mut record = Record::skipped(coord("b"))
            .with_detail(Detail::new(DETAIL_SKIPPED_BY, "p:dashboard:a"));
        record.time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "DEPLOY",
                "time": "2024-05-01T12:30:00Z",
                "config": {"project": "p", "type": "dashboard", "configId": "b"},
                "state": "SKIPPED",
                "details": [{"type": "SKIPPED_BY", "message": "p:dashboard:a"}]
            })
        );
    }

    #[test]
    fn test_success_record_omits_optional_fields() {
        let line = serde_json::to_string(&Record::success(coord("a"))).unwrap();
        assert!(!line.contains("details"));
        assert!(!line.contains("error"));
        assert!(line.contains("\"SUCCESS\""));
    }

    #[test]
    fn test_file_recorder_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("deploy.jsonl");

        let recorder = FileRecorder::open(&path).unwrap();
        recorder.record(Record::success(coord("a")));
        recorder.record(Record::failed(coord("b"), "boom"));
        drop(recorder);

        // reopening appends
        FileRecorder::open(&path)
            .unwrap()
            .record(Record::excluded(coord("c")));

        let records = read_report(&path).unwrap();
        let states: Vec<_> = records.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                RecordState::Success,
                RecordState::Error,
                RecordState::Excluded
            ]
        );
        assert_eq!(records[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_read_records_skips_blank_lines() {
        let input = format!(
            "{}\n\n{}\n",
            serde_json::to_string(&Record::success(coord("a"))).unwrap(),
            serde_json::to_string(&Record::skipped(coord("b"))).unwrap()
        );
        let records = read_records(input.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].config, coord("b"));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let input = format!(
            "{}\nnot json\n",
            serde_json::to_string(&Record::success(coord("a"))).unwrap()
        );
        let err = read_records(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ReportError::Json { line: 2, .. }));
    }
}
