use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Decode a frame that must be a JSON object.
///
/// Tagged enums also accept the sequence form (`["title","x"]`), which is
/// not a valid frame.
fn parse_object<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("frame is not a JSON object"));
    }
    serde_json::from_value(value)
}

/// Which note field an edit replaces
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EditField {
    Title,
    Content,
}

impl fmt::Display for EditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditField::Title => write!(f, "title"),
            EditField::Content => write!(f, "content"),
        }
    }
}

/// Full new value of a note field. Never a diff.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EditMessage {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollaboratorsMessage {
    pub count: usize,
}

/// Frames a peer may send to the relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "title")]
    Title(EditMessage),
    #[serde(rename = "content")]
    Content(EditMessage),
}

impl ReceivedMessage {
    pub fn edit(field: EditField, value: impl Into<String>) -> Self {
        let msg = EditMessage { content: value.into() };
        match field {
            EditField::Title => ReceivedMessage::Title(msg),
            EditField::Content => ReceivedMessage::Content(msg),
        }
    }

    /// Parse an inbound text frame. Anything that is not a title or content
    /// edit is rejected.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        parse_object(text)
    }

    pub fn field(&self) -> EditField {
        match self {
            ReceivedMessage::Title(_) => EditField::Title,
            ReceivedMessage::Content(_) => EditField::Content,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ReceivedMessage::Title(msg) | ReceivedMessage::Content(msg) => &msg.content,
        }
    }

    pub fn to_text(&self) -> String {
        // Serializing a tagged enum of plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames the relay delivers to a peer: presence counts and relayed edits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "collaborators")]
    Collaborators(CollaboratorsMessage),
    #[serde(rename = "title")]
    Title(EditMessage),
    #[serde(rename = "content")]
    Content(EditMessage),
}

impl SendMessage {
    pub fn collaborators(count: usize) -> Self {
        SendMessage::Collaborators(CollaboratorsMessage { count })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        parse_object(text)
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
