//! Session state machine for a single tag interaction.
//!
//! This module implements the tag protocol logic without touching the reader.

use super::classify::{classify, TagIdentity};
use super::codec::{decode, encode};
use super::gate::CompletionGate;
use super::types::{
    Command, DetectedTag, MultiTagPolicy, Outcome, SessionEvent, TagKind, TagStatus,
};
use crate::config::SessionConfig;
use crate::error::{Error, InvalidationCause, ReaderError, TransportError};
use crate::model::{Action, TagModel};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

const TOO_MANY_TAGS_PROMPT: &str =
    "There are too many tags present. Remove all and then try again.";

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, reader not yet polling
    Idle,
    /// Reader is polling for a tag
    Active,
    /// A poll reported zero or several tags, waiting for the retry delay
    Detecting,
    /// Connecting to the single detected tag
    Connecting,
    /// Connected, capability not yet requested
    Connected,
    /// Waiting for capability and capacity
    QueryingCapability,
    /// Reading the payload for a read action
    Reading,
    /// Appending a record: reading the old payload, then writing the new one
    Writing,
    /// Writing a caller supplied model
    SettingUp,
    /// The outcome was a success
    Completed,
    /// The session ended without success
    Invalidated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Invalidated)
    }
}

/// Sans-IO state machine for one tag session.
///
/// The session contains no reader code. It operates purely through a
/// poll-based API:
///
/// - `begin()`: Start the session
/// - `handle_event()`: Feed a reader event or operation result
/// - `poll_command()`: Get the next request for the reader
/// - `poll_outcome()`: Get the single result for the caller
///
/// # Example
///
/// ```
/// use tagsession::sansio::{Command, DetectedTag, MiFareFamily, Session, SessionEvent, TagKind};
/// use tagsession::{Action, SessionConfig};
///
/// let mut session = Session::new(Action::Read, &SessionConfig::default());
/// session.begin();
/// assert!(matches!(session.poll_command(), Some(Command::Begin { .. })));
///
/// let tag = DetectedTag::new(TagKind::MiFare(MiFareFamily::Plus), vec![0x04, 0x11]);
/// session.handle_event(SessionEvent::Activated);
/// session.handle_event(SessionEvent::TagsDetected(vec![tag.clone()]));
/// assert_eq!(session.poll_command(), Some(Command::Connect(tag)));
/// ```
#[derive(Debug)]
pub struct Session {
    /// Current state
    state: SessionState,
    action: Action,
    policy: MultiTagPolicy,
    retry_delay: Duration,
    started: bool,
    /// Identity of the tag the session connected to
    identity: TagIdentity,
    /// Byte capacity reported by the capability query
    capacity: usize,
    /// Model handed to the reader for writing
    pending_model: Option<TagModel>,
    /// Outgoing command queue
    commands: VecDeque<Command>,
    gate: CompletionGate,
}

impl Session {
    /// Create a session for `action`, taking the multi-tag policy and retry
    /// delay from `config`.
    pub fn new(action: Action, config: &SessionConfig) -> Self {
        let policy = config.policy_for(&action);
        Self::with_policy(action, policy, config.retry_delay())
    }

    pub fn with_policy(action: Action, policy: MultiTagPolicy, retry_delay: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            action,
            policy,
            retry_delay,
            started: false,
            identity: TagIdentity::default(),
            capacity: 0,
            pending_model: None,
            commands: VecDeque::new(),
            gate: CompletionGate::new(),
        }
    }

    /// Queue the command that starts polling. Does nothing if the session
    /// was already started.
    pub fn begin(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.commands.push_back(Command::Begin {
            prompt: self.action.prompt(),
        });
    }

    /// Feed one event into the state machine.
    ///
    /// Events that do not fit the current state are ignored. After the
    /// session reached a terminal state nothing changes it anymore.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.state.is_terminal() || !self.started {
            debug!(state = ?self.state, ?event, "ignoring event outside of an open session");
            return;
        }

        match (self.state, event) {
            (_, SessionEvent::Invalidated(reason)) => self.on_reader_invalidated(reason),
            (SessionState::Idle, SessionEvent::Activated) => {
                self.state = SessionState::Active;
            }
            (SessionState::Idle | SessionState::Active, SessionEvent::TagsDetected(tags)) => {
                self.on_tags_detected(tags)
            }
            (SessionState::Detecting, SessionEvent::RetryElapsed) => self.on_retry_elapsed(),
            (SessionState::Connecting, SessionEvent::Connected(result)) => {
                self.on_connected(result)
            }
            (SessionState::QueryingCapability, SessionEvent::StatusQueried(result)) => {
                self.on_status(result)
            }
            (SessionState::Reading, SessionEvent::PayloadRead(result)) => self.on_read(result),
            (SessionState::Writing, SessionEvent::PayloadRead(result))
                if self.pending_model.is_none() =>
            {
                self.on_read_for_append(result)
            }
            (
                SessionState::Writing | SessionState::SettingUp,
                SessionEvent::PayloadWritten(result),
            ) if self.pending_model.is_some() => self.on_written(result),
            (state, event) => {
                debug!(?state, ?event, "ignoring unexpected event");
            }
        }
    }

    /// End the session from outside the event stream, e.g. when the reader
    /// went away before reporting an invalidation.
    pub fn close(&mut self, cause: InvalidationCause) {
        if self.state.is_terminal() {
            return;
        }
        warn!(%cause, "session closed");
        self.state = SessionState::Invalidated;
        self.gate.invalidate(cause);
    }

    /// Poll for the next command for the reader.
    pub fn poll_command(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Poll for the session outcome.
    ///
    /// Returns a value at most once per session. A session that ended with
    /// an expected reader stop never produces one.
    pub fn poll_outcome(&mut self) -> Option<Outcome> {
        self.gate.take()
    }

    /// Get the current state of the session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn policy(&self) -> MultiTagPolicy {
        self.policy
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn on_reader_invalidated(&mut self, reason: ReaderError) {
        if reason.is_expected() {
            debug!(%reason, "reader ended session");
        } else {
            warn!(%reason, "reader invalidated session");
        }
        self.state = SessionState::Invalidated;
        self.gate.invalidate(InvalidationCause::Reader(reason));
    }

    fn on_tags_detected(&mut self, mut tags: Vec<DetectedTag>) {
        if tags.len() != 1 {
            warn!(count = tags.len(), "poll did not report exactly one tag");
            self.state = SessionState::Detecting;
            self.commands
                .push_back(Command::SetPrompt(TOO_MANY_TAGS_PROMPT.into()));
            self.commands
                .push_back(Command::ScheduleRetry(self.retry_delay));
            return;
        }

        let tag = match tags.pop() {
            Some(tag) => tag,
            None => return,
        };
        if tag.kind == TagKind::Unsupported {
            self.fail(InvalidationCause::UnsupportedTag);
            return;
        }

        self.identity = classify(&tag);
        debug!(id = %self.identity.id, family = %self.identity.family, "connecting to tag");
        self.state = SessionState::Connecting;
        self.commands.push_back(Command::Connect(tag));
    }

    fn on_retry_elapsed(&mut self) {
        match self.policy {
            MultiTagPolicy::Invalidate => self.fail(InvalidationCause::TooManyTags),
            MultiTagPolicy::RestartPolling => {
                self.state = SessionState::Active;
                self.commands.push_back(Command::RestartPolling);
            }
        }
    }

    fn on_connected(&mut self, result: Result<(), TransportError>) {
        if let Err(e) = result {
            self.fail(InvalidationCause::ConnectionFailed(e));
            return;
        }
        self.state = SessionState::Connected;
        self.commands.push_back(Command::QueryStatus);
        self.state = SessionState::QueryingCapability;
    }

    fn on_status(&mut self, result: Result<(TagStatus, usize), TransportError>) {
        let (status, capacity) = match result {
            Ok(v) => v,
            Err(e) => {
                self.fail(InvalidationCause::QueryFailed(e));
                return;
            }
        };
        debug!(?status, capacity, "tag status");
        self.capacity = capacity;

        match (status, &self.action) {
            (TagStatus::NotSupported, _) => self.fail(InvalidationCause::UnsupportedTag),
            (TagStatus::ReadOnly, Action::Write(_) | Action::Setup(_)) => {
                self.fail(InvalidationCause::ReadOnly)
            }
            (_, Action::Read) => {
                self.state = SessionState::Reading;
                self.commands.push_back(Command::ReadPayload);
            }
            (TagStatus::ReadWrite, Action::Write(_)) => {
                self.state = SessionState::Writing;
                self.commands.push_back(Command::ReadPayload);
            }
            (TagStatus::ReadWrite, Action::Setup(model)) => {
                let model = model.clone();
                self.state = SessionState::SettingUp;
                self.submit_write(model);
            }
        }
    }

    fn decode_payload(&mut self, result: Result<Vec<u8>, TransportError>) -> Option<TagModel> {
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(InvalidationCause::ReadFailed(e));
                return None;
            }
        };
        match decode(&payload) {
            Ok(model) => Some(model),
            Err(e) => {
                self.fail(InvalidationCause::DecodeFailed(e.to_string()));
                None
            }
        }
    }

    fn on_read(&mut self, result: Result<Vec<u8>, TransportError>) {
        let mut model = match self.decode_payload(result) {
            Some(model) => model,
            None => return,
        };
        model.tag_id = self.identity.id.clone();
        model.tag_type = self.identity.family.clone();

        self.commands.push_back(Command::SetPrompt(format!(
            "Tag read success: {}\n{}",
            model.name(),
            model.records.join(", ")
        )));
        self.succeed(model);
    }

    fn on_read_for_append(&mut self, result: Result<Vec<u8>, TransportError>) {
        let mut model = match self.decode_payload(result) {
            Some(model) => model,
            None => return,
        };
        if let Action::Write(message) = &self.action {
            model.records.push(message.clone());
        }
        self.submit_write(model);
    }

    /// Encode `model` and request the write, unless it does not fit the tag.
    ///
    /// Identifier and type are only ever filled in by a read.
    fn submit_write(&mut self, mut model: TagModel) {
        model.tag_id.clear();
        model.tag_type.clear();
        let payload = match encode(&model) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(InvalidationCause::EncodeFailed(e.to_string()));
                return;
            }
        };

        if payload.len() > self.capacity {
            warn!(
                size = payload.len(),
                capacity = self.capacity,
                "payload does not fit the tag"
            );
            self.state = SessionState::Invalidated;
            self.gate.deliver(Err(Error::PayloadTooLarge {
                size: payload.len(),
                capacity: self.capacity,
            }));
            self.commands.push_back(Command::Invalidate {
                message: Some("Invalid payload size".into()),
            });
            return;
        }

        self.pending_model = Some(model);
        self.commands.push_back(Command::WritePayload(payload));
    }

    fn on_written(&mut self, result: Result<(), TransportError>) {
        if let Err(e) = result {
            self.fail(InvalidationCause::WriteFailed(e));
            return;
        }
        let model = match self.pending_model.take() {
            Some(model) => model,
            None => return,
        };
        if let Action::Write(_) = self.action {
            self.commands
                .push_back(Command::SetPrompt("Record added".into()));
        }
        self.succeed(model);
    }

    fn succeed(&mut self, model: TagModel) {
        info!(name = model.name(), records = model.records.len(), "tag session completed");
        self.state = SessionState::Completed;
        self.gate.deliver(Ok(model));
        self.commands.push_back(Command::Invalidate { message: None });
    }

    fn fail(&mut self, cause: InvalidationCause) {
        warn!(%cause, state = ?self.state, "invalidating session");
        self.state = SessionState::Invalidated;
        self.commands.push_back(Command::Invalidate {
            message: Some(cause.prompt()),
        });
        self.gate.invalidate(cause);
    }
}
