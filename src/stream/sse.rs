//! `data: {...}` line protocol of the chat endpoint.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::StreamChunk;

use super::decoder::Utf8LineDecoder;

/// Marker prefixing every event line.
pub const DATA_PREFIX: &str = "data: ";

/// Pull-based sequence of chat chunks, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ApiResult<StreamChunk>> + Send>>;

/// Parse one line of the stream.
///
/// Returns `None` for lines that are not `data:` events.
#[must_use]
pub fn parse_data_line(line: &str) -> Option<ApiResult<StreamChunk>> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    Some(
        serde_json::from_str::<StreamChunk>(payload)
            .map_err(|e| ApiError::StreamParse(format!("{e} in {payload:?}"))),
    )
}

/// Turns raw body bytes into chunks.
///
/// Malformed `data:` payloads are logged and skipped. Nothing is emitted
/// after the first `done` chunk.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    lines: Utf8LineDecoder,
    done: bool,
    skipped: usize,
}

impl ChunkDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Utf8LineDecoder::new(),
            done: false,
            skipped: 0,
        }
    }

    /// Whether the terminal chunk has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Number of malformed `data:` lines skipped so far.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feed body bytes and collect the chunks they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }
        let lines = self.lines.push(bytes);
        self.accept_lines(lines)
    }

    /// Flush a trailing unterminated line at end of body.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }
        let lines = self.lines.finish().into_iter().collect();
        self.accept_lines(lines)
    }

    fn accept_lines(&mut self, lines: Vec<String>) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        for line in lines {
            match parse_data_line(&line) {
                None => {}
                Some(Ok(chunk)) => {
                    let done = chunk.done;
                    chunks.push(chunk);
                    if done {
                        self.done = true;
                        break;
                    }
                }
                Some(Err(err)) => {
                    self.skipped += 1;
                    tracing::warn!(error = %err, "skipping malformed stream line");
                }
            }
        }
        chunks
    }
}

struct ChunkStreamState<S> {
    body: Pin<Box<S>>,
    decoder: ChunkDecoder,
    queue: VecDeque<StreamChunk>,
    idle_timeout: Duration,
    finished: bool,
}

/// Wrap a body byte stream into a [`ChunkStream`].
///
/// Each body read must complete within `idle_timeout`, otherwise the stream
/// yields [`ApiError::Timeout`] and ends. A transport error ends the stream
/// after being yielded.
pub fn chunk_stream<S, B, E>(body: S, idle_timeout: Duration) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = ChunkStreamState {
        body: Box::pin(body),
        decoder: ChunkDecoder::new(),
        queue: VecDeque::new(),
        idle_timeout,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.queue.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.idle_timeout, state.body.next()).await {
                Err(_) => {
                    state.finished = true;
                    return Some((Err(ApiError::Timeout), state));
                }
                Ok(None) => {
                    state.finished = true;
                    let tail = state.decoder.finish();
                    state.queue.extend(tail);
                }
                Ok(Some(Err(err))) => {
                    state.finished = true;
                    return Some((Err(err.into()), state));
                }
                Ok(Some(Ok(bytes))) => {
                    let chunks = state.decoder.push(bytes.as_ref());
                    state.queue.extend(chunks);
                    if state.decoder.is_done() {
                        state.finished = true;
                    }
                }
            }
        }
    }))
}
