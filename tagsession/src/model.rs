//! Data carried on a tag and the operations a session can perform on it.

use serde_derive::{Deserialize, Serialize};

/// The record set stored on a tag.
///
/// `tag_id` and `tag_type` are only filled in when the model is produced by a
/// read session; they are ignored when the model is written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TagModel {
    name: String,
    #[serde(rename = "tagID", default)]
    pub tag_id: String,
    #[serde(rename = "tagType", default)]
    pub tag_type: String,
    #[serde(default)]
    pub records: Vec<String>,
}

impl TagModel {
    /// Create an empty model for a setup or write session.
    pub fn new<S: Into<String>>(name: S) -> Self {
        TagModel {
            name: name.into(),
            tag_id: String::new(),
            tag_type: String::new(),
            records: Vec::new(),
        }
    }

    pub fn with_records<I, S>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.records.extend(records.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The operation requested for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Read the stored model.
    Read,
    /// Append one record to the stored model.
    Write(String),
    /// Replace the tag contents with the given model.
    Setup(TagModel),
}

impl Action {
    /// Prompt shown on the reader while the session is waiting for a tag.
    pub fn prompt(&self) -> String {
        match self {
            Action::Read => "Hold your device near the tag to read it".into(),
            Action::Write(message) => {
                format!("Hold your device near the tag to write\n{}", message)
            }
            Action::Setup(_) => "Hold your device near the tag to overwrite it".into(),
        }
    }

    /// `true` for actions that modify the tag.
    pub fn is_write(&self) -> bool {
        !matches!(self, Action::Read)
    }
}

/// The write-class subset of [`Action`] accepted by the write entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    Write(String),
    Setup(TagModel),
}

impl From<WriteAction> for Action {
    fn from(action: WriteAction) -> Self {
        match action {
            WriteAction::Write(message) => Action::Write(message),
            WriteAction::Setup(model) => Action::Setup(model),
        }
    }
}
