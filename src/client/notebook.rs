use tracing::{debug, error, warn};

use crate::models::{EditField, Note};
use super::store::{NoteStore, StoreError};

/// The client's note collection and its current selection.
///
/// Every mutation is saved right away. A failed save is logged and the
/// in-memory state is kept, so editing never stops on a storage error.
pub struct NoteBook {
    notes: Vec<Note>,
    selected: Option<String>,
    store: Box<dyn NoteStore>,
}

impl NoteBook {
    pub fn open(store: impl NoteStore + 'static) -> Result<Self, StoreError> {
        let notes = store.load()?;
        debug!("Loaded {} notes", notes.len());
        Ok(Self {
            notes,
            selected: None,
            store: Box::new(store),
        })
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&Note> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    /// Create a blank note at the top of the list and select it.
    pub fn create(&mut self) -> Note {
        let note = Note::new();
        self.notes.insert(0, note.clone());
        self.selected = Some(note.id.clone());
        self.save();
        note
    }

    /// Add a note, replacing any note with the same id.
    pub fn insert(&mut self, note: Note) {
        match self.notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => self.notes.insert(0, note),
        }
        self.save();
    }

    /// Select a note. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: &str) -> Option<&Note> {
        if self.get(id).is_none() {
            warn!("Cannot select unknown note {:?}", id);
            return None;
        }
        self.selected = Some(id.to_string());
        self.get(id)
    }

    pub fn deselect(&mut self) -> Option<String> {
        self.selected.take()
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if self.notes.len() == before {
            return false;
        }
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        self.save();
        true
    }

    /// Case-insensitive match on title or content. An empty term matches all.
    pub fn search(&self, term: &str) -> Vec<&Note> {
        let term = term.to_lowercase();
        self.notes
            .iter()
            .filter(|n| {
                term.is_empty()
                    || n.title.to_lowercase().contains(&term)
                    || n.content.to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Replace the selected note's title and content, as the editor does on input.
    pub fn update_selected(&mut self, title: &str, content: &str) -> Option<&Note> {
        let id = self.selected.clone()?;
        let note = self.notes.iter_mut().find(|n| n.id == id)?;
        note.title = title.to_string();
        note.content = content.to_string();
        note.touch();
        self.save();
        self.get(&id)
    }

    /// Set one field of a note. Local and relayed edits both land here.
    pub fn apply(&mut self, id: &str, field: EditField, value: &str) -> Option<&Note> {
        let Some(note) = self.notes.iter_mut().find(|n| n.id == id) else {
            debug!("Ignoring {} edit for unknown note {:?}", field, id);
            return None;
        };
        note.set(field, value);
        self.save();
        self.get(id)
    }

    fn save(&self) {
        if let Err(e) = self.store.save(&self.notes) {
            error!("Failed to save notes: {}", e);
        }
    }
}
