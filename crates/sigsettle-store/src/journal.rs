//! JSON Lines signal journal.
//!
//! Every signal write is appended as one line. Replay reads the file front to
//! back and keeps the last record per id, so an interrupted write only loses
//! its own line.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sigsettle_core::{Signal, SignalId};

use crate::error::StoreResult;

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    recorded_at_ms: i64,
    signal: Signal,
}

/// Append-only journal of signal writes.
pub struct SignalJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    records_written: usize,
}

impl SignalJournal {
    /// Open (or create) the journal in append mode.
    ///
    /// A torn final line is terminated first so the next record starts on
    /// a line of its own.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if ends_mid_line(&mut file)? {
            warn!(path = %path.display(), "Journal ends with a torn line, terminating it");
            file.write_all(b"\n")?;
            file.flush()?;
        }
        info!(path = %path.display(), "Opened signal journal (append mode)");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Append one signal snapshot and flush it to the file.
    pub fn append(&mut self, signal: &Signal) -> StoreResult<()> {
        let entry = JournalEntry {
            recorded_at_ms: Utc::now().timestamp_millis(),
            signal: signal.clone(),
        };
        serde_json::to_writer(&mut self.writer, &entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records_written += 1;
        Ok(())
    }

    /// Read the journal and return the latest snapshot of every signal.
    ///
    /// A missing file replays as empty. Unparseable lines are skipped.
    pub fn replay(path: impl AsRef<Path>) -> StoreResult<HashMap<SignalId, Signal>> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut signals = HashMap::new();
        let mut skipped = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => {
                    signals.insert(entry.signal.id.clone(), entry.signal);
                }
                Err(e) => {
                    skipped += 1;
                    warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping corrupt journal line");
                }
            }
        }

        info!(
            path = %path.display(),
            signals = signals.len(),
            skipped,
            "Replayed signal journal"
        );
        Ok(signals)
    }
}

/// Whether a non-empty file lacks its trailing newline.
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl Drop for SignalJournal {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(?e, "Failed to flush journal on close");
        }
    }
}
