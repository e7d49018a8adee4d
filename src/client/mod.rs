//! Client side of note collaboration.
//!
//! [`CollabClient`] bridges the locally stored notes and the relay for the
//! note currently open in the editor. Collaboration only ever adds to local
//! editing: a missing relay never blocks a change or its persistence.

pub mod store;
pub mod notebook;
pub mod debounce;
pub mod collab;

use std::time::Duration;
use thiserror::Error;

use crate::models::EditField;
pub use collab::CollabClient;
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use notebook::NoteBook;
pub use store::{JsonFileStore, MemoryStore, NoteStore, StoreError};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay endpoint, e.g. `ws://localhost:3000/ws`
    pub relay_url: String,
    /// Quiet period before local edits are relayed
    pub debounce: Duration,
}

impl ClientConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Relay URL carrying `note_id` as the session key.
    pub fn session_url(&self, note_id: &str) -> String {
        let separator = if self.relay_url.contains('?') { '&' } else { '?' };
        format!("{}{}noteId={}", self.relay_url, separator, urlencoding::encode(note_id))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("ws://localhost:3000/ws")
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to relay: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("unknown note {0:?}")]
    UnknownNote(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the UI needs to re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Presence { note_id: String, count: usize },
    RemoteEdit { note_id: String, field: EditField },
    Disconnected { note_id: String },
}
