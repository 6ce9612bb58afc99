use crate::reader::{EventSink, ReaderSession, TagReader};
use crate::sansio::{encode, DetectedTag, MiFareFamily, MultiTagPolicy, SessionEvent, TagKind};
use crate::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events the mock reader posts in response to each call.
#[derive(Clone, Default)]
struct Script {
    available: bool,
    on_begin: Vec<SessionEvent>,
    /// One entry per `restart_polling` call, consumed in order.
    on_restart: Vec<Vec<SessionEvent>>,
    on_connect: Vec<SessionEvent>,
    on_query: Vec<SessionEvent>,
    on_read: Vec<SessionEvent>,
    on_write: Vec<SessionEvent>,
    on_invalidate: Vec<SessionEvent>,
    /// Drop the event sink right after `begin`.
    hang_up: bool,
}

fn ultralight() -> DetectedTag {
    DetectedTag::new(
        TagKind::MiFare(MiFareFamily::Ultralight),
        vec![0x04, 0x5a, 0x01, 0xff],
    )
}

impl Script {
    /// A single tag in the field answering every operation successfully.
    fn tag(status: TagStatus, capacity: usize, stored: &TagModel) -> Self {
        Script {
            available: true,
            on_begin: vec![
                SessionEvent::Activated,
                SessionEvent::TagsDetected(vec![ultralight()]),
            ],
            on_connect: vec![SessionEvent::Connected(Ok(()))],
            on_query: vec![SessionEvent::StatusQueried(Ok((status, capacity)))],
            on_read: vec![SessionEvent::PayloadRead(Ok(encode(stored).unwrap()))],
            on_write: vec![SessionEvent::PayloadWritten(Ok(()))],
            on_invalidate: vec![SessionEvent::Invalidated(ReaderError::UserCanceled)],
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Log {
    opened: usize,
    policies: Vec<MultiTagPolicy>,
    calls: Vec<String>,
    written: Vec<Vec<u8>>,
}

impl Log {
    fn called(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c.starts_with(name))
    }
}

struct MockReader {
    script: Script,
    log: Arc<Mutex<Log>>,
}

impl MockReader {
    fn new(script: Script) -> (Self, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            MockReader {
                script,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl TagReader for MockReader {
    fn is_available(&self) -> bool {
        self.script.available
    }

    fn open(&self, policy: MultiTagPolicy, events: EventSink) -> Box<dyn ReaderSession> {
        let mut log = self.log.lock().unwrap();
        log.opened += 1;
        log.policies.push(policy);
        Box::new(MockSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            sink: Some(events),
        })
    }
}

struct MockSession {
    script: Script,
    log: Arc<Mutex<Log>>,
    sink: Option<EventSink>,
}

impl MockSession {
    fn record(&self, call: String) {
        self.log.lock().unwrap().calls.push(call);
    }

    fn post(&self, events: Vec<SessionEvent>) {
        if let Some(sink) = &self.sink {
            for event in events {
                let _ = sink.send(event);
            }
        }
    }
}

impl ReaderSession for MockSession {
    fn begin(&mut self, prompt: &str) {
        self.record(format!("begin:{}", prompt));
        self.post(self.script.on_begin.clone());
        if self.script.hang_up {
            self.sink = None;
        }
    }

    fn set_prompt(&mut self, prompt: &str) {
        self.record(format!("prompt:{}", prompt));
    }

    fn invalidate(&mut self, message: Option<&str>) {
        self.record(format!("invalidate:{}", message.unwrap_or("")));
        self.post(self.script.on_invalidate.clone());
    }

    fn restart_polling(&mut self) {
        self.record("restart".into());
        if !self.script.on_restart.is_empty() {
            let events = self.script.on_restart.remove(0);
            self.post(events);
        }
    }

    fn connect(&mut self, _tag: &DetectedTag) {
        self.record("connect".into());
        self.post(self.script.on_connect.clone());
    }

    fn query_status(&mut self) {
        self.record("query".into());
        self.post(self.script.on_query.clone());
    }

    fn read_payload(&mut self) {
        self.record("read".into());
        self.post(self.script.on_read.clone());
    }

    fn write_payload(&mut self, payload: &[u8]) {
        self.record("write".into());
        self.log.lock().unwrap().written.push(payload.to_vec());
        self.post(self.script.on_write.clone());
    }
}

#[tokio::test]
async fn test_read_classifies_tag() {
    let stored = TagModel::new("rmr").with_records(["one", "two"]);
    let (reader, log) = MockReader::new(Script::tag(TagStatus::ReadOnly, 128, &stored));
    let utility = TagUtility::new(reader);

    let model = utility.read().await.unwrap().unwrap();
    assert_eq!(model.name(), "rmr");
    assert_eq!(model.records, vec!["one", "two"]);
    assert_eq!(model.tag_id, "045a01ff");
    assert_eq!(model.tag_type, "MiFare Ultralight");

    let log = log.lock().unwrap();
    assert_eq!(log.policies, vec![MultiTagPolicy::Invalidate]);
    assert!(!log.called("write"));
    assert_eq!(log.calls.last().map(String::as_str), Some("invalidate:"));
}

#[tokio::test]
async fn test_unavailable_opens_no_session() {
    let (reader, log) = MockReader::new(Script::default());
    let utility = TagUtility::new(reader);

    assert_eq!(utility.read().await, Err(Error::Unavailable));
    assert_eq!(
        utility.write(WriteAction::Write("x".into())).await,
        Err(Error::Unavailable)
    );
    assert_eq!(log.lock().unwrap().opened, 0);
}

#[tokio::test]
async fn test_append_record() {
    let (reader, log) = MockReader::new(Script::tag(
        TagStatus::ReadWrite,
        1024,
        &TagModel::new("rmr"),
    ));
    let utility = TagUtility::new(reader);

    let model = utility
        .write(WriteAction::Write("techno".into()))
        .await
        .unwrap()
        .unwrap();
    let expected = TagModel::new("rmr").with_records(["techno"]);
    assert_eq!(model, expected);

    let log = log.lock().unwrap();
    assert_eq!(log.policies, vec![MultiTagPolicy::RestartPolling]);
    assert_eq!(log.written, vec![encode(&expected).unwrap()]);
    assert!(log.calls.iter().any(|c| c == "prompt:Record added"));
}

#[tokio::test]
async fn test_payload_too_large_never_writes() {
    let stored = TagModel::new("rmr").with_records(["a"; 8]);
    let capacity = encode(&stored).unwrap().len();
    let (reader, log) = MockReader::new(Script::tag(TagStatus::ReadWrite, capacity, &stored));
    let utility = TagUtility::new(reader);

    let result = utility.write(WriteAction::Write("one more".into())).await;
    match result {
        Err(Error::PayloadTooLarge { size, capacity: c }) => {
            assert_eq!(c, capacity);
            assert!(size > capacity);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let log = log.lock().unwrap();
    assert!(!log.called("write"));
    assert!(log.written.is_empty());
    assert!(log.calls.iter().any(|c| c == "invalidate:Invalid payload size"));
}

#[tokio::test]
async fn test_not_supported_touches_no_payload() {
    for action in [
        Action::Read,
        Action::Write("x".into()),
        Action::Setup(TagModel::new("x")),
    ] {
        let (reader, log) = MockReader::new(Script::tag(
            TagStatus::NotSupported,
            1024,
            &TagModel::new("rmr"),
        ));
        let utility = TagUtility::new(reader);

        let result = match action {
            Action::Read => utility.read().await,
            Action::Write(m) => utility.write(WriteAction::Write(m)).await,
            Action::Setup(m) => utility.write(WriteAction::Setup(m)).await,
        };
        assert_eq!(
            result,
            Err(Error::Invalidated(InvalidationCause::UnsupportedTag))
        );

        let log = log.lock().unwrap();
        assert!(!log.called("read"));
        assert!(!log.called("write"));
    }
}

#[tokio::test]
async fn test_read_only_rejects_writes() {
    for action in [
        WriteAction::Write("x".into()),
        WriteAction::Setup(TagModel::new("x")),
    ] {
        let (reader, log) = MockReader::new(Script::tag(
            TagStatus::ReadOnly,
            1024,
            &TagModel::new("rmr"),
        ));
        let utility = TagUtility::new(reader);

        assert_eq!(
            utility.write(action).await,
            Err(Error::Invalidated(InvalidationCause::ReadOnly))
        );
        assert!(!log.lock().unwrap().called("write"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_strict_session_invalidates_after_delay() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_begin = vec![
        SessionEvent::Activated,
        SessionEvent::TagsDetected(vec![ultralight(), ultralight()]),
    ];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    let start = tokio::time::Instant::now();
    assert_eq!(
        utility.read().await,
        Err(Error::Invalidated(InvalidationCause::TooManyTags))
    );
    assert!(start.elapsed() >= Duration::from_millis(500));

    let log = log.lock().unwrap();
    assert!(!log.called("connect"));
    assert!(log.calls.iter().any(|c| c == "invalidate:Many tags"));
}

#[tokio::test(start_paused = true)]
async fn test_write_session_restarts_polling() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_begin = vec![SessionEvent::TagsDetected(Vec::new())];
    script.on_restart = vec![
        vec![SessionEvent::TagsDetected(vec![ultralight(), ultralight()])],
        vec![SessionEvent::TagsDetected(vec![ultralight()])],
    ];
    let (reader, log) = MockReader::new(script);
    let config = SessionConfig {
        retry_delay_ms: 100,
        ..SessionConfig::default()
    };
    let utility = TagUtility::with_config(reader, config);

    let start = tokio::time::Instant::now();
    let model = utility
        .write(WriteAction::Write("techno".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.records, vec!["techno"]);
    assert!(start.elapsed() >= Duration::from_millis(200));

    let log = log.lock().unwrap();
    assert_eq!(log.calls.iter().filter(|c| *c == "restart").count(), 2);
    assert_eq!(log.calls.iter().filter(|c| *c == "connect").count(), 1);
}

#[tokio::test]
async fn test_user_cancel_is_swallowed() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_begin = vec![
        SessionEvent::Activated,
        SessionEvent::Invalidated(ReaderError::UserCanceled),
    ];
    let (reader, _log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    assert_eq!(utility.read().await, Ok(None));

    let calls = AtomicUsize::new(0);
    utility
        .read_with(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_first_record_read_is_swallowed() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_connect = vec![SessionEvent::Invalidated(ReaderError::FirstRecordRead)];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    assert_eq!(utility.write(WriteAction::Write("x".into())).await, Ok(None));
    assert!(!log.lock().unwrap().called("query"));
}

#[tokio::test]
async fn test_reader_invalidation_is_reported() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_read = vec![SessionEvent::Invalidated(ReaderError::TagLost)];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    assert_eq!(
        utility.read().await,
        Err(Error::Invalidated(InvalidationCause::Reader(
            ReaderError::TagLost
        )))
    );
    // the reader already ended the session
    assert!(!log.lock().unwrap().called("invalidate"));
}

#[tokio::test]
async fn test_duplicate_callbacks_complete_once() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_connect = vec![
        SessionEvent::Connected(Ok(())),
        SessionEvent::Connected(Ok(())),
    ];
    script.on_read = vec![
        SessionEvent::PayloadRead(Ok(encode(&TagModel::new("rmr")).unwrap())),
        SessionEvent::PayloadRead(Ok(b"junk".to_vec())),
    ];
    script.on_write = vec![
        SessionEvent::PayloadWritten(Ok(())),
        SessionEvent::PayloadWritten(Err(TransportError::new("late failure"))),
    ];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    let calls = AtomicUsize::new(0);
    utility
        .write_with(WriteAction::Write("techno".into()), |outcome| {
            assert_eq!(outcome.unwrap().records, vec!["techno"]);
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let log = log.lock().unwrap();
    assert_eq!(log.calls.iter().filter(|c| *c == "query").count(), 1);
    assert_eq!(log.written.len(), 1);
}

#[tokio::test]
async fn test_setup_replaces_contents() {
    let (reader, log) = MockReader::new(Script::tag(
        TagStatus::ReadWrite,
        1024,
        &TagModel::new("old").with_records(["x", "y"]),
    ));
    let utility = TagUtility::new(reader);
    let fresh = TagModel::new("new");

    let model = utility
        .write(WriteAction::Setup(fresh.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model, fresh);

    let log = log.lock().unwrap();
    assert!(!log.called("read"));
    assert_eq!(log.written, vec![encode(&fresh).unwrap()]);
}

#[tokio::test]
async fn test_concurrent_request_is_rejected() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_begin = vec![SessionEvent::Activated];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    let first = utility.read();
    tokio::pin!(first);
    tokio::select! {
        biased;
        _ = &mut first => panic!("first session should still be waiting for a tag"),
        _ = tokio::task::yield_now() => {}
    }

    assert_eq!(
        utility.write(WriteAction::Write("x".into())).await,
        Err(Error::Busy)
    );
    assert_eq!(log.lock().unwrap().opened, 1);
}

#[tokio::test]
async fn test_busy_flag_is_released() {
    let (reader, log) = MockReader::new(Script::tag(
        TagStatus::ReadWrite,
        1024,
        &TagModel::new("rmr"),
    ));
    let utility = TagUtility::new(reader);

    assert!(utility.read().await.is_ok());
    assert!(utility.read().await.is_ok());
    assert_eq!(log.lock().unwrap().opened, 2);
}

#[tokio::test]
async fn test_reader_hang_up() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_begin = vec![SessionEvent::Activated];
    script.hang_up = true;
    let (reader, _log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    assert_eq!(
        utility.read().await,
        Err(Error::Invalidated(InvalidationCause::ReaderGone))
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_invalidates_reader() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_begin = vec![SessionEvent::Activated];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    let result = tokio::time::timeout(Duration::from_millis(10), utility.read()).await;
    assert!(result.is_err());

    let log = log.lock().unwrap();
    assert_eq!(
        log.calls,
        vec![
            "begin:Hold your device near the tag to read it".to_string(),
            "invalidate:".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_append_does_not_keep_stored_identity() {
    let mut stored = TagModel::new("rmr");
    stored.tag_id = "deadbeef".into();
    stored.tag_type = "MiFare Plus".into();
    let (reader, log) = MockReader::new(Script::tag(TagStatus::ReadWrite, 1024, &stored));
    let utility = TagUtility::new(reader);

    let model = utility
        .write(WriteAction::Write("techno".into()))
        .await
        .unwrap()
        .unwrap();
    assert!(model.tag_id.is_empty());
    assert!(model.tag_type.is_empty());

    let expected = TagModel::new("rmr").with_records(["techno"]);
    assert_eq!(log.lock().unwrap().written, vec![encode(&expected).unwrap()]);
}

#[tokio::test]
async fn test_append_to_undecodable_tag_never_writes() {
    let mut script = Script::tag(TagStatus::ReadWrite, 1024, &TagModel::new("rmr"));
    script.on_read = vec![SessionEvent::PayloadRead(Ok(b"junk".to_vec()))];
    let (reader, log) = MockReader::new(script);
    let utility = TagUtility::new(reader);

    assert!(matches!(
        utility.write(WriteAction::Write("techno".into())).await,
        Err(Error::Invalidated(InvalidationCause::DecodeFailed(_)))
    ));

    let log = log.lock().unwrap();
    assert!(!log.called("write"));
    assert!(log
        .calls
        .iter()
        .any(|c| c == "invalidate:Could not decode tag data."));
}
