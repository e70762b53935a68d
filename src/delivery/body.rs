use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, info, warn};

use crate::observability::metrics as obs;

// ---------------------------------------------------------------------------
// Metered response body
// ---------------------------------------------------------------------------

/// Wraps an upstream byte stream on its way into an axum response body.
///
/// Chunks pass through one at a time, so memory use is bounded by the
/// upstream chunk size. Bytes are counted as they are yielded. When the
/// response declares a length, hyper stops polling once that many bytes
/// are written, so reaching `expected_len` counts as complete. When the
/// wrapper is dropped before that, the client went away: the upstream
/// stream is dropped with it, which releases the store read or the
/// downstream connection.
///
/// Upstream errors are surfaced as `std::io::Error`; once headers are out
/// the only thing hyper can do with one is abort the connection.
pub struct MeteredStream<S> {
    inner: S,
    service: &'static str,
    key: String,
    bytes: u64,
    expected_len: Option<u64>,
    started: Instant,
    state: StreamState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Complete,
    Failed,
}

impl<S> MeteredStream<S> {
    pub fn new(
        inner: S,
        service: &'static str,
        key: impl Into<String>,
        expected_len: Option<u64>,
    ) -> Self {
        obs::inc_stream_active(service);
        // An empty body with a declared length may never be polled.
        let state = if expected_len == Some(0) {
            StreamState::Complete
        } else {
            StreamState::Streaming
        };
        Self {
            inner,
            service,
            key: key.into(),
            bytes: 0,
            expected_len,
            started: Instant::now(),
            state,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes
    }
}

impl<S, E> Stream for MeteredStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.bytes += chunk.len() as u64;
                obs::add_stream_bytes(self.service, chunk.len() as u64);
                if self.expected_len.is_some_and(|len| self.bytes >= len) {
                    self.state = StreamState::Complete;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.state = StreamState::Failed;
                warn!(
                    service = self.service,
                    key = %self.key,
                    bytes_sent = self.bytes,
                    error = %e,
                    "upstream body failed mid-stream, aborting response"
                );
                Poll::Ready(Some(Err(std::io::Error::other(e.to_string()))))
            }
            Poll::Ready(None) => {
                self.state = StreamState::Complete;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for MeteredStream<S> {
    fn drop(&mut self) {
        obs::dec_stream_active(self.service);
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match self.state {
            StreamState::Complete => {
                obs::inc_stream_completed(self.service, "complete");
                debug!(
                    service = self.service,
                    key = %self.key,
                    bytes_sent = self.bytes,
                    elapsed_ms,
                    "stream complete"
                );
            }
            StreamState::Failed => obs::inc_stream_completed(self.service, "error"),
            StreamState::Streaming => {
                obs::inc_stream_completed(self.service, "aborted");
                info!(
                    service = self.service,
                    key = %self.key,
                    bytes_sent = self.bytes,
                    elapsed_ms,
                    "client disconnected, upstream released"
                );
            }
        }
    }
}
