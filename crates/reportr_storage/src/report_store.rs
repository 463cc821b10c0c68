#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use reportr_kernel_contracts::report::{ReportRecord, REPORT_RECORD_SCHEMA_VERSION};
use reportr_kernel_contracts::{ContractViolation, Validate};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("report journal '{}': {source}", .path.display())]
    Journal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("report journal '{}' line {line}: {reason}", .path.display())]
    CorruptJournal {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("failed to encode report journal entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("report rejected by store: {0}")]
    ContractViolation(#[from] ContractViolation),
    #[error("report store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
struct JournalConfig {
    path: PathBuf,
}

#[derive(serde::Serialize)]
struct JournalLine<'a> {
    schema_version: u32,
    record: &'a ReportRecord,
}

#[derive(serde::Deserialize)]
struct JournalEntry {
    schema_version: u32,
    record: ReportRecord,
}

/// Append-only report collection.
///
/// With a journal attached every insert is written and synced to disk before
/// it becomes visible in [`ReportStore::rows`].
#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    rows: Vec<ReportRecord>,
    journal: Option<JournalConfig>,
}

impl ReportStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn open_journal(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        ensure_journal_file(&path)?;
        let rows = replay_journal(&path)?;
        info!(path = %path.display(), rows = rows.len(), "report journal opened");
        Ok(Self {
            rows,
            journal: Some(JournalConfig { path }),
        })
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_ref().map(|j| j.path.as_path())
    }

    pub fn append_report(&mut self, record: ReportRecord) -> Result<(), StorageError> {
        record.validate()?;
        if let Some(journal) = self.journal.as_ref() {
            append_journal_line(&journal.path, &record)?;
        }
        self.rows.push(record);
        debug!(rows = self.rows.len(), "report appended");
        Ok(())
    }

    pub fn rows(&self) -> &[ReportRecord] {
        &self.rows
    }
}

fn ensure_journal_file(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StorageError::Journal {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    if !path.exists() {
        File::create(path).map_err(|source| StorageError::Journal {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Replays every journal line. A final line without its newline is the
/// remains of an interrupted append: it is kept if it decodes, otherwise it is
/// cut off. Undecodable lines anywhere else fail the open.
fn replay_journal(path: &Path) -> Result<Vec<ReportRecord>, StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::Journal {
        path: path.to_path_buf(),
        source,
    })?;
    let complete_len = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let (complete, tail) = bytes.split_at(complete_len);

    let mut rows = Vec::new();
    let mut line_no = 0;
    for raw in complete.split(|b| *b == b'\n') {
        line_no += 1;
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry: JournalEntry = serde_json::from_slice(raw)
            .map_err(|err| corrupt_line(path, line_no, err.to_string()))?;
        rows.push(checked_record(path, line_no, entry)?);
    }

    if !tail.iter().all(u8::is_ascii_whitespace) {
        let tail_line = complete.iter().filter(|b| **b == b'\n').count() + 1;
        match serde_json::from_slice::<JournalEntry>(tail) {
            Ok(entry) => {
                rows.push(checked_record(path, tail_line, entry)?);
                terminate_last_line(path)?;
                warn!(
                    path = %path.display(),
                    line = tail_line,
                    "report journal tail was missing its newline"
                );
            }
            Err(err) => {
                truncate_journal(path, complete_len)?;
                warn!(
                    path = %path.display(),
                    line = tail_line,
                    bytes = tail.len(),
                    error = %err,
                    "dropped torn report journal tail"
                );
            }
        }
    } else if !tail.is_empty() {
        truncate_journal(path, complete_len)?;
    }
    Ok(rows)
}

fn corrupt_line(path: &Path, line: usize, reason: String) -> StorageError {
    StorageError::CorruptJournal {
        path: path.to_path_buf(),
        line,
        reason,
    }
}

fn checked_record(
    path: &Path,
    line: usize,
    entry: JournalEntry,
) -> Result<ReportRecord, StorageError> {
    if entry.schema_version != REPORT_RECORD_SCHEMA_VERSION.0 {
        return Err(corrupt_line(
            path,
            line,
            format!("unsupported schema_version={}", entry.schema_version),
        ));
    }
    entry
        .record
        .validate()
        .map_err(|err| corrupt_line(path, line, err.to_string()))?;
    Ok(entry.record)
}

fn journal_io(path: &Path) -> impl Fn(io::Error) -> StorageError + '_ {
    move |source| StorageError::Journal {
        path: path.to_path_buf(),
        source,
    }
}

fn truncate_journal(path: &Path, len: usize) -> Result<(), StorageError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(journal_io(path))?;
    file.set_len(len as u64)
        .and_then(|_| file.sync_data())
        .map_err(journal_io(path))
}

fn terminate_last_line(path: &Path) -> Result<(), StorageError> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(journal_io(path))?;
    file.write_all(b"\n")
        .and_then(|_| file.sync_data())
        .map_err(journal_io(path))
}

/// Writes one complete line in a single call. On failure the file is cut back
/// to its previous length so a later append never lands on a partial line.
fn append_journal_line(path: &Path, record: &ReportRecord) -> Result<(), StorageError> {
    let mut line = serde_json::to_vec(&JournalLine {
        schema_version: REPORT_RECORD_SCHEMA_VERSION.0,
        record,
    })?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(journal_io(path))?;
    let start_len = file.metadata().map_err(journal_io(path))?.len();
    let written = file.write_all(&line).and_then(|_| file.sync_data());
    if let Err(source) = written {
        if let Err(rollback) = file.set_len(start_len) {
            warn!(path = %path.display(), error = %rollback, "report journal rollback failed");
        }
        return Err(journal_io(path)(source));
    }
    Ok(())
}
