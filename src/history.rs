use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER: [&str; 3] = ["timestamp", "user_prompt", "generated_query"];

#[derive(Debug)]
pub enum HistoryError {
    IoError(std::io::Error),
    CsvError(csv::Error),
    LockPoisoned,
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::IoError(err) => write!(f, "History IO error: {}", err),
            HistoryError::CsvError(err) => write!(f, "History CSV error: {}", err),
            HistoryError::LockPoisoned => write!(f, "History lock poisoned"),
        }
    }
}

impl Error for HistoryError {}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        HistoryError::IoError(err)
    }
}

impl From<csv::Error> for HistoryError {
    fn from(err: csv::Error) -> Self {
        HistoryError::CsvError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// `None` when the stored value could not be parsed
    pub timestamp: Option<NaiveDateTime>,
    pub raw_timestamp: String,
    pub question: String,
    pub sql: String,
}

/// Append-only CSV log of every successful question.
pub struct HistoryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, question: &str, sql: &str) -> Result<HistoryEntry, HistoryError> {
        self.record_at(Local::now(), question, sql)
    }

    pub fn record_at(
        &self,
        at: DateTime<Local>,
        question: &str,
        sql: &str,
    ) -> Result<HistoryEntry, HistoryError> {
        let _guard = self.write_lock.lock().map_err(|_| HistoryError::LockPoisoned)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(HEADER)?;
        }

        let raw_timestamp = at.format(TIMESTAMP_FORMAT).to_string();
        writer.write_record([raw_timestamp.as_str(), question, sql])?;
        writer.flush()?;

        debug!("Recorded history entry at {}", raw_timestamp);

        Ok(HistoryEntry {
            timestamp: parse_timestamp(&raw_timestamp),
            raw_timestamp,
            question: question.to_string(),
            sql: sql.to_string(),
        })
    }

    /// Every entry in the log, most recent first. Entries whose timestamp
    /// cannot be parsed sort last; ties keep the later-written entry first.
    pub fn load_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        // Appends from this process never interleave with a reload
        let _guard = self.write_lock.lock().map_err(|_| HistoryError::LockPoisoned)?;

        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or_default().to_string();
            let raw_timestamp = field(0);

            entries.push(HistoryEntry {
                timestamp: parse_timestamp(&raw_timestamp),
                raw_timestamp,
                question: field(1),
                sql: field(2),
            });
        }

        let mut indexed: Vec<(usize, HistoryEntry)> = entries.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));

        info!("Loaded {} history entries from {}", indexed.len(), self.path.display());
        Ok(indexed.into_iter().map(|(_, entry)| entry).collect())
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}
