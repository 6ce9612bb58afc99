use std::fmt;

/// Error reported by the reader hardware for a single tag operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new<S: Into<String>>(description: S) -> Self {
        TransportError(description.into())
    }
}

/// Reason the reader hardware gives when it ends a session on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    /// The reader stopped itself after the first record was read.
    FirstRecordRead,
    /// The operator dismissed the session.
    UserCanceled,
    /// The reader gave up waiting for a tag.
    Timeout,
    /// Another session holds the radio.
    SystemBusy,
    /// The tag left the field.
    TagLost,
    Other(String),
}

impl ReaderError {
    /// Expected end-of-session signals that are never reported to the caller.
    pub fn is_expected(&self) -> bool {
        matches!(self, ReaderError::FirstRecordRead | ReaderError::UserCanceled)
    }
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReaderError::FirstRecordRead => write!(f, "session stopped after first record read"),
            ReaderError::UserCanceled => write!(f, "session canceled by user"),
            ReaderError::Timeout => write!(f, "session timed out"),
            ReaderError::SystemBusy => write!(f, "reader busy"),
            ReaderError::TagLost => write!(f, "tag connection lost"),
            ReaderError::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Why a session ended without a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidationCause {
    #[error("too many tags present")]
    TooManyTags,
    #[error("unsupported tag")]
    UnsupportedTag,
    #[error("connection error: {0}")]
    ConnectionFailed(TransportError),
    #[error("could not query tag status: {0}")]
    QueryFailed(TransportError),
    #[error("cannot write to tag")]
    ReadOnly,
    #[error("could not read tag data: {0}")]
    ReadFailed(TransportError),
    #[error("could not decode tag data: {0}")]
    DecodeFailed(String),
    #[error("could not encode tag data: {0}")]
    EncodeFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(TransportError),
    #[error("{0}")]
    Reader(ReaderError),
    #[error("reader went away")]
    ReaderGone,
}

impl InvalidationCause {
    /// Message shown on the reader when the session is invalidated for this cause.
    pub fn prompt(&self) -> String {
        match self {
            InvalidationCause::TooManyTags => "Many tags".into(),
            InvalidationCause::UnsupportedTag | InvalidationCause::QueryFailed(_) => {
                "Unsupported tag.".into()
            }
            InvalidationCause::ConnectionFailed(_) => "Connection error. Please try again.".into(),
            InvalidationCause::ReadOnly => "Unable to write to tag.".into(),
            InvalidationCause::ReadFailed(_) | InvalidationCause::DecodeFailed(_) => {
                "Could not decode tag data.".into()
            }
            InvalidationCause::EncodeFailed(_) => "Could not encode tag data.".into(),
            InvalidationCause::WriteFailed(e) => e.to_string(),
            InvalidationCause::Reader(e) => e.to_string(),
            InvalidationCause::ReaderGone => "Reader unavailable.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("tag reading is not available on this device")]
    Unavailable,
    #[error("a tag session is already in progress")]
    Busy,
    #[error("session invalidated: {0}")]
    Invalidated(InvalidationCause),
    #[error("payload of {size} bytes exceeds tag capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },
}

impl From<InvalidationCause> for Error {
    fn from(cause: InvalidationCause) -> Self {
        Error::Invalidated(cause)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
