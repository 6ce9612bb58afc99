//! Core types for the sans-io session implementation.

use crate::error::{ReaderError, TransportError};
use crate::model::TagModel;
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// MiFare product family declared by a tag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MiFareFamily {
    Desfire,
    Plus,
    Ultralight,
    Unknown,
}

/// Technology of a detected tag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    MiFare(MiFareFamily),
    FeliCa,
    Iso15693,
    Iso7816,
    /// A technology the session cannot exchange records with.
    Unsupported,
}

/// A tag reported by the reader during polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTag {
    pub kind: TagKind,
    /// Identifier bytes as declared by the tag.
    pub identifier: Vec<u8>,
}

impl DetectedTag {
    pub fn new(kind: TagKind, identifier: Vec<u8>) -> Self {
        DetectedTag { kind, identifier }
    }
}

/// Read/write capability of a connected tag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    NotSupported,
    ReadOnly,
    ReadWrite,
}

/// What the session does when a poll reports zero or several tags.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MultiTagPolicy {
    /// End the session once the retry delay has passed.
    Invalidate,
    /// Resume polling once the retry delay has passed.
    RestartPolling,
}

/// Input messages consumed by the session state machine.
///
/// Everything except `RetryElapsed` originates from the reader hardware.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The reader session started polling.
    Activated,
    /// A poll completed with the given tags in the field.
    TagsDetected(Vec<DetectedTag>),
    /// The reader ended the session.
    Invalidated(ReaderError),
    Connected(Result<(), TransportError>),
    /// Capability and byte capacity of the connected tag.
    StatusQueried(Result<(TagStatus, usize), TransportError>),
    PayloadRead(Result<Vec<u8>, TransportError>),
    PayloadWritten(Result<(), TransportError>),
    /// The multi-tag retry delay has passed.
    RetryElapsed,
}

/// Output requests for the reader, produced by the session state machine.
///
/// The application drains these with `poll_command()` and performs them
/// against the reader, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start polling and show the given prompt.
    Begin { prompt: String },
    SetPrompt(String),
    Connect(DetectedTag),
    QueryStatus,
    ReadPayload,
    WritePayload(Vec<u8>),
    /// Feed `SessionEvent::RetryElapsed` back after the delay.
    ScheduleRetry(Duration),
    RestartPolling,
    /// End the reader session, with an error message if it failed.
    Invalidate { message: Option<String> },
}

/// The single result delivered to the caller of a session.
pub type Outcome = crate::Result<TagModel>;
