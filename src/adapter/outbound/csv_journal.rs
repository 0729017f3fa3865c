//! CSV journal files.
//!
//! `signals.csv` and `trades.csv` live in one directory. Files are opened in
//! append mode for every write and the header is emitted only when a file is
//! created, so a restarted process keeps appending to the same journal.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::JournalError;
use crate::port::outbound::journal::{JournalSink, SignalEntry, TradeRow};

pub const SIGNALS_FILE: &str = "signals.csv";
pub const TRADES_FILE: &str = "trades.csv";

pub struct CsvJournal {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvJournal {
    /// Journal rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn signals_path(&self) -> PathBuf {
        self.dir.join(SIGNALS_FILE)
    }

    #[must_use]
    pub fn trades_path(&self) -> PathBuf {
        self.dir.join(TRADES_FILE)
    }

    /// All journaled trades in write order. A missing file is an empty journal.
    pub fn read_trades(&self) -> Result<Vec<TradeRow>, JournalError> {
        read_rows(&self.trades_path())
    }

    pub fn read_signals(&self) -> Result<Vec<SignalEntry>, JournalError> {
        read_rows(&self.signals_path())
    }

    fn append<T: Serialize>(&self, path: &Path, row: &T) -> Result<(), JournalError> {
        let _guard = self.write_lock.lock();
        let is_new = match fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, JournalError> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            if let csv::ErrorKind::Io(io) = e.kind() {
                if io.kind() == ErrorKind::NotFound {
                    return Ok(Vec::new());
                }
            }
            return Err(e.into());
        }
    };
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(JournalError::from)
}

impl JournalSink for CsvJournal {
    fn append_signal(&self, entry: &SignalEntry) -> Result<(), JournalError> {
        self.append(&self.signals_path(), entry)
    }

    fn append_trade(&self, trade: &TradeRow) -> Result<(), JournalError> {
        self.append(&self.trades_path(), trade)
    }
}
