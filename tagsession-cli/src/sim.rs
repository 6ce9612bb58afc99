//! A reader backed by a JSON description of the tags in the field.

use anyhow::{bail, Context, Result};
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tagsession::reader::{EventSink, ReaderSession, TagReader};
use tagsession::sansio::{DetectedTag, MiFareFamily, MultiTagPolicy, SessionEvent, TagKind};
use tagsession::{ReaderError, TagStatus, TransportError};
use tracing::debug;

/// Polls after which the simulated reader gives up and times out.
const MAX_RESTARTS: usize = 3;

fn yes() -> bool {
    true
}

/// Everything the simulated reader can see.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Field {
    /// `false` simulates a device without a tag reader.
    #[serde(default = "yes")]
    pub available: bool,
    /// The operator dismisses every session right after it starts.
    #[serde(default)]
    pub cancel: bool,
    #[serde(default)]
    pub tags: Vec<SimTag>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimTag {
    pub kind: TagKind,
    /// Identifier bytes, hex encoded.
    pub identifier: String,
    pub status: TagStatus,
    pub capacity: usize,
    /// Text stored in the payload record.
    #[serde(default)]
    pub payload: String,
}

impl SimTag {
    fn detected(&self) -> DetectedTag {
        DetectedTag::new(self.kind, hex::decode(&self.identifier).unwrap_or_default())
    }
}

impl Field {
    /// A field holding a single blank tag.
    pub fn blank(capacity: usize, status: TagStatus) -> Self {
        Field {
            available: true,
            cancel: false,
            tags: vec![SimTag {
                kind: TagKind::MiFare(MiFareFamily::Ultralight),
                identifier: "04a2b3c4d5e680".into(),
                status,
                capacity,
                payload: String::new(),
            }],
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tag file '{}'", path.display()))?;
        let field: Field = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse tag file '{}'", path.display()))?;
        for tag in &field.tags {
            if hex::decode(&tag.identifier).is_err() {
                bail!("Tag identifier '{}' is not valid hex", tag.identifier);
            }
        }
        Ok(field)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize tag file")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write tag file '{}'", path.display()))
    }
}

fn lock(field: &Mutex<Field>) -> MutexGuard<'_, Field> {
    field.lock().unwrap_or_else(|e| e.into_inner())
}

/// [`TagReader`] over a [`Field`].
pub struct SimReader {
    field: Arc<Mutex<Field>>,
}

impl SimReader {
    pub fn new(field: Field) -> Self {
        SimReader {
            field: Arc::new(Mutex::new(field)),
        }
    }

    /// Current state of the field, including written payloads.
    pub fn field(&self) -> Field {
        lock(&self.field).clone()
    }
}

impl TagReader for SimReader {
    fn is_available(&self) -> bool {
        lock(&self.field).available
    }

    fn open(&self, policy: MultiTagPolicy, events: EventSink) -> Box<dyn ReaderSession> {
        debug!(?policy, "opening simulated reader session");
        Box::new(SimSession {
            field: Arc::clone(&self.field),
            sink: events,
            connected: None,
            polls: 0,
        })
    }
}

struct SimSession {
    field: Arc<Mutex<Field>>,
    sink: EventSink,
    /// Index of the connected tag.
    connected: Option<usize>,
    polls: usize,
}

impl SimSession {
    fn post(&self, event: SessionEvent) {
        // the driver stops listening once the session is over
        let _ = self.sink.send(event);
    }

    fn poll(&mut self) {
        self.polls += 1;
        if self.polls > MAX_RESTARTS {
            self.post(SessionEvent::Invalidated(ReaderError::Timeout));
            return;
        }
        let tags = lock(&self.field).tags.iter().map(SimTag::detected).collect();
        self.post(SessionEvent::TagsDetected(tags));
    }

    fn with_connected<T>(
        &self,
        f: impl FnOnce(&mut SimTag) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut field = lock(&self.field);
        match self.connected.and_then(|i| field.tags.get_mut(i)) {
            Some(tag) => f(tag),
            None => Err(TransportError::new("Tag is not connected")),
        }
    }
}

impl ReaderSession for SimSession {
    fn begin(&mut self, prompt: &str) {
        eprintln!("> {}", prompt);
        self.post(SessionEvent::Activated);
        if lock(&self.field).cancel {
            self.post(SessionEvent::Invalidated(ReaderError::UserCanceled));
            return;
        }
        self.poll();
    }

    fn set_prompt(&mut self, prompt: &str) {
        eprintln!("> {}", prompt);
    }

    fn invalidate(&mut self, message: Option<&str>) {
        if let Some(message) = message {
            eprintln!("! {}", message);
        }
        self.post(SessionEvent::Invalidated(ReaderError::UserCanceled));
    }

    fn restart_polling(&mut self) {
        self.poll();
    }

    fn connect(&mut self, tag: &DetectedTag) {
        let identifier = hex::encode(&tag.identifier);
        let index = lock(&self.field)
            .tags
            .iter()
            .position(|t| t.identifier.eq_ignore_ascii_case(&identifier));
        let result = match index {
            Some(i) => {
                self.connected = Some(i);
                Ok(())
            }
            None => Err(TransportError::new("Tag left the field")),
        };
        self.post(SessionEvent::Connected(result));
    }

    fn query_status(&mut self) {
        let result = self.with_connected(|tag| Ok((tag.status, tag.capacity)));
        self.post(SessionEvent::StatusQueried(result));
    }

    fn read_payload(&mut self) {
        let result = self.with_connected(|tag| Ok(tag.payload.clone().into_bytes()));
        self.post(SessionEvent::PayloadRead(result));
    }

    fn write_payload(&mut self, payload: &[u8]) {
        let result = self.with_connected(|tag| {
            if tag.status != TagStatus::ReadWrite {
                return Err(TransportError::new("Tag is read only"));
            }
            if payload.len() > tag.capacity {
                return Err(TransportError::new("Tag capacity exceeded"));
            }
            tag.payload = String::from_utf8(payload.to_vec())
                .map_err(|_| TransportError::new("Payload is not text"))?;
            Ok(())
        });
        self.post(SessionEvent::PayloadWritten(result));
    }
}
