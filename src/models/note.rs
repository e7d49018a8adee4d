use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::EditField;

pub const DEFAULT_TITLE: &str = "Untitled Note";

/// A note as persisted by the local note store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// Rich text as markup
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: default_title(),
            content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace a field with its full new value and refresh `updated_at`.
    pub fn set(&mut self, field: EditField, value: impl Into<String>) {
        match field {
            EditField::Title => self.title = value.into(),
            EditField::Content => self.content = value.into(),
        }
        self.touch();
    }

    pub fn get(&self, field: EditField) -> &str {
        match field {
            EditField::Title => &self.title,
            EditField::Content => &self.content,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_blank(&self) -> bool {
        self.title == DEFAULT_TITLE && self.content.is_empty()
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}
