//! Line framing and reconnect handling for the inbound stream.

use super::{BackoffPolicy, ConnectionState, StreamBody, StreamTransport};
use crate::error::{ConnectError, Error, ReadError, Result};
use metrics::{counter, gauge};

/// Longest line accepted before the chunk is treated as malformed.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One persistent inbound connection.
///
/// Owns the connection state; transitions happen only as a result of
/// connect and read outcomes.
pub struct StreamConnection {
    transport: Box<dyn StreamTransport>,
    backoff: BackoffPolicy,
    state: ConnectionState,
    body: Option<Box<dyn StreamBody>>,
    buffer: LineBuffer,
    ever_connected: bool,
    reconnects: u64,
}

impl StreamConnection {
    /// Create a disconnected stream over `transport`.
    pub fn new(transport: Box<dyn StreamTransport>, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            backoff,
            state: ConnectionState::Disconnected,
            body: None,
            buffer: LineBuffer::default(),
            ever_connected: false,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Successful reconnections after the first connect.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Make a single connection attempt.
    pub async fn connect(&mut self) -> std::result::Result<(), ConnectError> {
        self.state = ConnectionState::Connecting;
        counter!("stream_connect_attempts_total").increment(1);

        match self.transport.open().await {
            Ok(body) => {
                self.body = Some(body);
                self.buffer.clear();
                self.state = ConnectionState::Streaming;
                gauge!("stream_connected").set(1.0);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                counter!("stream_connect_failures_total").increment(1);
                Err(e)
            }
        }
    }

    /// Connect, retrying with backoff until the attempt bound is reached.
    ///
    /// Failed attempt `i` sleeps [`BackoffPolicy::delay`]`(i)` before the
    /// next one. The attempt that reaches `max_attempts` does not sleep;
    /// it returns [`Error::ReconnectExhausted`] and leaves the connection
    /// `Disconnected`.
    pub async fn establish(&mut self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.connect().await {
                Ok(()) => {
                    if self.ever_connected {
                        self.reconnects += 1;
                        counter!("stream_reconnects_total").increment(1);
                        tracing::info!(
                            "Reconnected to {} after {} failed attempts",
                            self.transport.describe(),
                            attempt
                        );
                    } else {
                        tracing::info!("Connected to {}", self.transport.describe());
                    }
                    self.ever_connected = true;
                    return Ok(());
                }
                Err(e) => {
                    let failures = attempt + 1;
                    if failures >= self.backoff.max_attempts {
                        tracing::error!(
                            "Giving up on {} after {} consecutive failures: {}",
                            self.transport.describe(),
                            failures,
                            e
                        );
                        self.state = ConnectionState::Disconnected;
                        gauge!("stream_connected").set(0.0);
                        return Err(Error::ReconnectExhausted {
                            attempts: failures,
                            last: e,
                        });
                    }

                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        attempt = failures,
                        max_attempts = self.backoff.max_attempts,
                        "Connect to {} failed: {}. Backing off for {:?}",
                        self.transport.describe(),
                        e,
                        delay
                    );
                    self.state = ConnectionState::Backoff;
                    tokio::time::sleep(delay).await;
                    counter!("stream_backoff_millis_total").increment(delay.as_millis() as u64);
                    attempt += 1;
                }
            }
        }
    }

    /// Read the next line from the stream, without its terminator.
    ///
    /// Any failure (read error, EOF, malformed chunk) drops the body and
    /// moves the connection to `Backoff`; call [`establish`](Self::establish)
    /// to recover.
    pub async fn next_line(&mut self) -> std::result::Result<String, ReadError> {
        loop {
            match self.buffer.take_line() {
                Some(Ok(line)) => return Ok(line),
                Some(Err(e)) => return Err(self.fail(e)),
                None => {}
            }

            if self.buffer.pending() > MAX_LINE_BYTES {
                let e = ReadError::MalformedChunk(format!(
                    "no line terminator within {} bytes",
                    MAX_LINE_BYTES
                ));
                return Err(self.fail(e));
            }

            let Some(body) = self.body.as_mut() else {
                return Err(ReadError::NotConnected);
            };

            match body.next_chunk().await {
                Ok(Some(chunk)) => self.buffer.extend(&chunk),
                Ok(None) => return Err(self.fail(ReadError::Eof)),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Drop the underlying stream. Used on shutdown.
    pub fn close(&mut self) {
        self.body = None;
        self.buffer.clear();
        self.state = ConnectionState::Disconnected;
        gauge!("stream_connected").set(0.0);
    }

    fn fail(&mut self, e: ReadError) -> ReadError {
        self.body = None;
        self.buffer.clear();
        self.state = ConnectionState::Backoff;
        gauge!("stream_connected").set(0.0);
        e
    }
}

/// Accumulates body bytes and splits them into lines.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes already scanned for a newline.
    scanned: usize,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn pending(&self) -> usize {
        self.buf.len()
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    fn take_line(&mut self) -> Option<std::result::Result<String, ReadError>> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let end = self.scanned + offset;

        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        self.scanned = 0;
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(String::from_utf8(line).map_err(|e| ReadError::MalformedChunk(e.to_string())))
    }
}
