use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::models::Note;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("note store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("note store contains invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the client keeps its notes between runs.
pub trait NoteStore: Send {
    fn load(&self) -> Result<Vec<Note>, StoreError>;
    fn save(&self, notes: &[Note]) -> Result<(), StoreError>;
}

/// All notes as one JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NoteStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Note>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No note store at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, notes: &[Note]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename; readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(notes)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Volatile store, mostly for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: Mutex<Vec<Note>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self { notes: Mutex::new(notes) }
    }
}

impl NoteStore for MemoryStore {
    fn load(&self) -> Result<Vec<Note>, StoreError> {
        Ok(self.notes.lock().map(|n| n.clone()).unwrap_or_default())
    }

    fn save(&self, notes: &[Note]) -> Result<(), StoreError> {
        if let Ok(mut stored) = self.notes.lock() {
            *stored = notes.to_vec();
        }
        Ok(())
    }
}
