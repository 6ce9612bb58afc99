//! Interface to the reader hardware.
//!
//! Every [`ReaderSession`] method returns immediately. Lifecycle events and
//! the result of each tag operation are posted to the [`EventSink`] handed
//! to [`TagReader::open`], exactly once per operation.

use crate::sansio::{DetectedTag, MultiTagPolicy, SessionEvent};
use tokio::sync::mpsc::UnboundedSender;

/// Channel on which the reader posts events for one session.
pub type EventSink = UnboundedSender<SessionEvent>;

/// A device that can open tag sessions.
pub trait TagReader: Send + Sync {
    /// `false` if the device has no tag reading capability at all.
    fn is_available(&self) -> bool;

    /// Create a session object. Nothing is polled until [`ReaderSession::begin`].
    ///
    /// `policy` tells the reader what kind of session is requested; strict
    /// sessions are ended by the caller on ambiguous polls, the others are
    /// restarted.
    fn open(&self, policy: MultiTagPolicy, events: EventSink) -> Box<dyn ReaderSession>;
}

/// An open reader session.
pub trait ReaderSession: Send {
    /// Start polling. The reader posts `Activated` and later `TagsDetected`.
    fn begin(&mut self, prompt: &str);

    fn set_prompt(&mut self, prompt: &str);

    /// End the session, showing `message` as an error if given.
    fn invalidate(&mut self, message: Option<&str>);

    fn restart_polling(&mut self);

    /// Posts `Connected`.
    fn connect(&mut self, tag: &DetectedTag);

    /// Posts `StatusQueried` for the connected tag.
    fn query_status(&mut self);

    /// Posts `PayloadRead` with the payload of the first record on the tag.
    fn read_payload(&mut self);

    /// Posts `PayloadWritten`.
    fn write_payload(&mut self, payload: &[u8]);
}
