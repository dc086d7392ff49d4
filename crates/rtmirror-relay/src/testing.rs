//! In-crate test doubles for the stream transport and collaborators.

use crate::collab::{Ledger, RecordFetcher, ReplySender, TransactionRef};
use crate::error::{AckError, ConnectError, FetchError, PublishError, ReadError};
use crate::stream::{StreamBody, StreamTransport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rtmirror_core::{Bulletin, EventRecord, RecordId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// What a scripted body does once its chunks run out.
pub enum OnDrain {
    /// Report end of body.
    Eof,
    /// Fail with a transport error.
    Fail(String),
    /// Never return.
    Hang,
    /// Signal shutdown, then never return.
    Shutdown(watch::Sender<bool>),
}

enum Step {
    Refuse,
    Open(Vec<Bytes>, OnDrain),
}

/// Transport that replays a fixed sequence of connect outcomes.
///
/// Once the script is exhausted every further connect gets a 503.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_connects(self, n: usize) -> Self {
        {
            let mut steps = self.steps.lock();
            for _ in 0..n {
                steps.push_back(Step::Refuse);
            }
        }
        self
    }

    pub fn open_with(self, chunks: &[&str], on_drain: OnDrain) -> Self {
        let chunks = chunks
            .iter()
            .map(|c| Bytes::copy_from_slice(c.as_bytes()))
            .collect();
        self.steps.lock().push_back(Step::Open(chunks, on_drain));
        self
    }

    pub fn open_then_fail(self, chunks: &[&str], reason: &str) -> Self {
        self.open_with(chunks, OnDrain::Fail(reason.to_string()))
    }

    /// Counter of attempts made so far, shared with the test.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn open(&self) -> Result<Box<dyn StreamBody>, ConnectError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().pop_front() {
            Some(Step::Open(chunks, on_drain)) => Ok(Box::new(ScriptedBody {
                chunks: chunks.into(),
                on_drain: Some(on_drain),
            })),
            Some(Step::Refuse) | None => Err(ConnectError::Status(503)),
        }
    }
}

struct ScriptedBody {
    chunks: VecDeque<Bytes>,
    on_drain: Option<OnDrain>,
}

#[async_trait]
impl StreamBody for ScriptedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ReadError> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        match self.on_drain.take() {
            Some(OnDrain::Eof) | None => Ok(None),
            Some(OnDrain::Fail(reason)) => Err(ReadError::Transport(reason)),
            Some(OnDrain::Hang) => std::future::pending().await,
            Some(OnDrain::Shutdown(tx)) => {
                let _ = tx.send(true);
                std::future::pending().await
            }
        }
    }
}

/// Platform double: serves fetches from a map and records replies.
#[derive(Default)]
pub struct MockPlatform {
    records: Mutex<HashMap<RecordId, EventRecord>>,
    replies: Mutex<Vec<(String, Option<RecordId>)>>,
    fetches: AtomicUsize,
    pub fail_replies: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_replies() -> Self {
        Self {
            fail_replies: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, record: EventRecord) {
        self.records.lock().insert(record.id, record);
    }

    pub fn replies(&self) -> Vec<(String, Option<RecordId>)> {
        self.replies.lock().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordFetcher for MockPlatform {
    async fn fetch(&self, id: RecordId) -> Result<EventRecord, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or(FetchError::NotFound(id))
    }
}

#[async_trait]
impl ReplySender for MockPlatform {
    async fn reply(&self, text: &str, in_reply_to: Option<RecordId>) -> Result<(), AckError> {
        self.replies.lock().push((text.to_string(), in_reply_to));
        if self.fail_replies {
            return Err(AckError::Status(403));
        }
        Ok(())
    }
}

/// Ledger double: records published bulletins, optionally failing.
#[derive(Default)]
pub struct MockLedger {
    published: Mutex<Vec<Bulletin>>,
    pub fail: bool,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<Bulletin> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn publish(&self, bulletin: &Bulletin) -> Result<TransactionRef, PublishError> {
        if self.fail {
            return Err(PublishError::Rpc {
                code: -6,
                message: "Insufficient funds".to_string(),
            });
        }
        let mut published = self.published.lock();
        published.push(bulletin.clone());
        Ok(TransactionRef(format!("tx{:04}", published.len())))
    }
}

/// Build a plain record for tests.
pub fn record(id: u64, author: &str, text: &str) -> EventRecord {
    EventRecord {
        id: RecordId(id),
        author_handle: author.to_string(),
        text: text.to_string(),
        is_repost: false,
        parent_id: None,
        entities: Vec::new(),
    }
}

/// Status JSON line for `record`-like input, as the stream delivers it.
pub fn status_line(id: u64, author: &str, text: &str) -> String {
    serde_json::json!({
        "id": id,
        "text": text,
        "user": { "screen_name": author },
        "retweeted": false,
        "entities": { "hashtags": [], "user_mentions": [] }
    })
    .to_string()
}

/// Serve `app` on an ephemeral local port. Returns the base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
