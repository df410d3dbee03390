//! Backups of edited save files.
//!
//! Before the first edit of a file a copy is kept next to it
//! (`<file>.bak`), together with a small JSON ledger recording the hash of
//! that original and of the last buffer we wrote. A new backup is only taken
//! when the file on disk matches neither hash, i.e. someone else replaced it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup ledger is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hashes tracked for one save file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// File contents when the backup was taken
    pub original_hash: String,
    /// Contents after our last write
    pub last_edit_hash: String,
}

impl Ledger {
    fn new(hash: String) -> Self {
        Ledger {
            original_hash: hash.clone(),
            last_edit_hash: hash,
        }
    }

    fn knows(&self, hash: &str) -> bool {
        self.original_hash == hash || self.last_edit_hash == hash
    }
}

/// Hex SHA-256 of a buffer
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `<file>.bak` and `<file>.bak.json`, whatever the file's extension
pub fn backup_paths(save_path: &Path) -> (PathBuf, PathBuf) {
    let mut backup = save_path.as_os_str().to_owned();
    backup.push(".bak");
    let mut ledger = backup.clone();
    ledger.push(".json");
    (PathBuf::from(backup), PathBuf::from(ledger))
}

fn read_ledger(path: &Path) -> Result<Option<Ledger>, BackupError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

fn write_ledger(path: &Path, ledger: &Ledger) -> Result<(), BackupError> {
    fs::write(path, serde_json::to_string_pretty(ledger)?)?;
    Ok(())
}

/// Back up `save_path` unless the existing backup already covers it.
///
/// Returns the backup path when a new backup was written. An existing backup
/// without a ledger is never overwritten.
pub fn smart_backup(save_path: &Path) -> Result<Option<PathBuf>, BackupError> {
    let (backup_path, ledger_path) = backup_paths(save_path);
    let current = fs::read(save_path)?;
    let hash = hash_bytes(&current);

    if backup_path.exists() {
        match read_ledger(&ledger_path)? {
            None => return Ok(None),
            Some(ledger) if ledger.knows(&hash) => return Ok(None),
            Some(_) => {}
        }
    }

    fs::write(&backup_path, &current)?;
    write_ledger(&ledger_path, &Ledger::new(hash))?;
    tracing::debug!(backup = %backup_path.display(), "backup created");
    Ok(Some(backup_path))
}

/// Record `written` as the contents of our last edit of `save_path`
pub fn update_after_edit(save_path: &Path, written: &[u8]) -> Result<(), BackupError> {
    let (_, ledger_path) = backup_paths(save_path);
    let hash = hash_bytes(written);
    let mut ledger = read_ledger(&ledger_path)?.unwrap_or_else(|| Ledger::new(hash.clone()));
    ledger.last_edit_hash = hash;
    write_ledger(&ledger_path, &ledger)
}
