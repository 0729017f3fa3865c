//! Durable JSON snapshot of the ledger.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ledger::{KeyRing, Ledger};
use crate::domain::{EquityState, IdempotencyKey, Symbol, SymbolState};

const FORMAT_VERSION: u32 = 1;

/// On-disk form of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreSnapshot {
    format_version: u32,
    sequence: u64,
    saved_at: DateTime<Utc>,
    equity: EquityState,
    symbols: BTreeMap<Symbol, SymbolState>,
    applied_keys: Vec<IdempotencyKey>,
    #[serde(default)]
    divergences: Vec<String>,
}

impl StoreSnapshot {
    pub(crate) fn capture(ledger: &Ledger) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            sequence: ledger.sequence,
            saved_at: Utc::now(),
            equity: ledger.equity.clone(),
            symbols: ledger.symbols.clone(),
            applied_keys: ledger.applied.keys().cloned().collect(),
            divergences: ledger.divergences.clone(),
        }
    }

    /// Rebuild a ledger, refusing snapshots that break ledger invariants.
    pub(crate) fn into_ledger(self, key_capacity: usize) -> Result<Ledger, String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", self.format_version));
        }
        if !self.equity.is_consistent() {
            return Err(format!(
                "balance {} does not equal starting balance {} plus cumulative pnl {}",
                self.equity.balance, self.equity.starting_balance, self.equity.cumulative_pnl
            ));
        }
        for (symbol, state) in &self.symbols {
            check_state(symbol, state)?;
        }
        Ok(Ledger {
            sequence: self.sequence,
            equity: self.equity,
            symbols: self.symbols,
            applied: KeyRing::from_keys(self.applied_keys, key_capacity),
            divergences: self.divergences,
        })
    }
}

fn check_state(symbol: &Symbol, state: &SymbolState) -> Result<(), String> {
    match state {
        SymbolState::Flat => Err(format!("{symbol}: flat symbols are not stored")),
        SymbolState::PendingEntry(pending) => {
            if pending.evaluation.quantity <= Decimal::ZERO {
                return Err(format!("{symbol}: pending entry with non-positive quantity"));
            }
            Ok(())
        }
        SymbolState::Open(position) | SymbolState::PendingExit { position, .. } => {
            if position.symbol() != symbol {
                return Err(format!("{symbol}: position recorded under {}", position.symbol()));
            }
            if position.quantity() <= Decimal::ZERO || position.entry_price() <= Decimal::ZERO {
                return Err(format!("{symbol}: position with non-positive quantity or price"));
            }
            Ok(())
        }
    }
}

/// Failure to read an existing snapshot.
#[derive(Debug)]
pub(crate) enum LoadError {
    Io(io::Error),
    Corrupt(String),
}

/// Snapshot file written with write-to-temp-then-rename.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub(crate) fn load(&self) -> Result<Option<StoreSnapshot>, LoadError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LoadError::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| LoadError::Corrupt(e.to_string()))
    }

    /// Replace the snapshot atomically. Readers see the old or new file, never a mix.
    pub(crate) fn write(&self, snapshot: &StoreSnapshot) -> Result<(), crate::error::StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        file.write_all(&json).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }
}
