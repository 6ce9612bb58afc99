//! Tokio driver for tag sessions.
//!
//! This module runs the sans-io [`Session`] against a [`TagReader`], feeding
//! reader events into the state machine and performing its commands.

use crate::config::SessionConfig;
use crate::error::{Error, InvalidationCause, Result};
use crate::model::{Action, TagModel, WriteAction};
use crate::reader::{ReaderSession, TagReader};
use crate::sansio::{Command, Session, SessionEvent};
use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info};

/// Entry point for callers: one read or write at a time against a reader.
///
/// # Examples
///
/// ```no_run
/// # use tagsession::reader::TagReader;
/// # async fn run<R: TagReader>(reader: R) -> tagsession::Result<()> {
/// use tagsession::{TagModel, TagUtility, WriteAction};
///
/// let utility = TagUtility::new(reader);
/// if let Some(model) = utility.write(WriteAction::Write("techno".into())).await? {
///     println!("{} now holds {:?}", model.name(), model.records);
/// }
/// # Ok(())
/// # }
/// ```
pub struct TagUtility<R> {
    reader: R,
    config: SessionConfig,
    busy: AtomicBool,
}

impl<R: TagReader> TagUtility<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, SessionConfig::default())
    }

    pub fn with_config(reader: R, config: SessionConfig) -> Self {
        TagUtility {
            reader,
            config,
            busy: AtomicBool::new(false),
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read the model stored on a tag.
    ///
    /// Returns `Ok(None)` if the session ended with an expected reader stop
    /// such as the operator canceling it.
    pub async fn read(&self) -> Result<Option<TagModel>> {
        self.run(Action::Read).await
    }

    /// Append a record to, or overwrite, the model stored on a tag.
    ///
    /// Returns `Ok(None)` under the same conditions as [`TagUtility::read`].
    pub async fn write(&self, action: WriteAction) -> Result<Option<TagModel>> {
        self.run(action.into()).await
    }

    /// Like [`TagUtility::read`], reporting through `completion`.
    ///
    /// `completion` is not called when the session ends with an expected
    /// reader stop.
    pub async fn read_with<F>(&self, completion: F)
    where
        F: FnOnce(Result<TagModel>) + Send,
    {
        if let Some(outcome) = self.read().await.transpose() {
            completion(outcome);
        }
    }

    /// Like [`TagUtility::write`], reporting through `completion`.
    pub async fn write_with<F>(&self, action: WriteAction, completion: F)
    where
        F: FnOnce(Result<TagModel>) + Send,
    {
        if let Some(outcome) = self.write(action).await.transpose() {
            completion(outcome);
        }
    }

    async fn run(&self, action: Action) -> Result<Option<TagModel>> {
        if !self.reader.is_available() {
            return Err(Error::Unavailable);
        }
        let _busy = BusyGuard::acquire(&self.busy)?;

        info!(?action, "opening tag session");
        let (tx, rx) = unbounded_channel();
        let session = Session::new(action, &self.config);
        let handle = self.reader.open(session.policy(), tx);

        SessionContext {
            session,
            handle,
            events: rx,
            retry: None,
        }
        .run()
        .await
    }
}

/// Clears the in-flight flag when the request finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(Error::Busy);
        }
        Ok(BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything owned by one in-flight request. Dropped when the session ends.
struct SessionContext {
    session: Session,
    handle: Box<dyn ReaderSession>,
    events: UnboundedReceiver<SessionEvent>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl SessionContext {
    async fn run(mut self) -> Result<Option<TagModel>> {
        self.session.begin();

        loop {
            while let Some(command) = self.session.poll_command() {
                self.perform(command);
            }

            if self.session.is_terminal() {
                debug!(state = ?self.session.state(), "tag session finished");
                return self.session.poll_outcome().transpose();
            }

            let next = tokio::select! {
                event = self.events.recv() => event,
                () = retry_elapsed(&mut self.retry) => Some(SessionEvent::RetryElapsed),
            };

            match next {
                Some(SessionEvent::RetryElapsed) => {
                    self.retry = None;
                    self.session.handle_event(SessionEvent::RetryElapsed);
                }
                Some(event) => self.session.handle_event(event),
                None => self.session.close(InvalidationCause::ReaderGone),
            }
        }
    }

    fn perform(&mut self, command: Command) {
        debug!(?command, "reader command");
        match command {
            Command::Begin { prompt } => self.handle.begin(&prompt),
            Command::SetPrompt(prompt) => self.handle.set_prompt(&prompt),
            Command::Connect(tag) => self.handle.connect(&tag),
            Command::QueryStatus => self.handle.query_status(),
            Command::ReadPayload => self.handle.read_payload(),
            Command::WritePayload(payload) => self.handle.write_payload(&payload),
            Command::ScheduleRetry(delay) => self.retry = Some(Box::pin(sleep(delay))),
            Command::RestartPolling => self.handle.restart_polling(),
            Command::Invalidate { message } => self.handle.invalidate(message.as_deref()),
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        // the caller gave up on the request, stop the reader as well
        if !self.session.is_terminal() {
            debug!(state = ?self.session.state(), "tag session abandoned");
            self.handle.invalidate(None);
        }
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
