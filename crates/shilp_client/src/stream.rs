//! Streaming response bodies.
//!
//! Export downloads and the ingest stats feed hold their connection open
//! until the body is drained, the stream is dropped or closed, or an
//! [`AbortHandle`] fires. An aborted stream yields one
//! `Err(ClientError::Cancelled)` and then ends; a connection fault
//! mid-body yields the transport error and then ends.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::task::AtomicWaker;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Cancels a stream from another task.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    state: Arc<AbortState>,
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    waker: AtomicWaker,
}

impl AbortHandle {
    /// Aborts the stream. A pending read wakes up with `Cancelled`.
    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
        self.state.waker.wake();
    }

    /// Returns true once `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    fn register(&self, cx: &Context<'_>) {
        self.state.waker.register(cx.waker());
    }
}

/// A live response body.
pub struct ByteStream {
    inner: BoxStream<'static, ClientResult<Bytes>>,
    abort: AbortHandle,
    done: bool,
}

impl ByteStream {
    /// Wraps a response whose status has already been checked.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::from_stream(response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from)))
    }

    /// Wraps any chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = ClientResult<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            abort: AbortHandle::default(),
            done: false,
        }
    }

    /// Returns a handle that cancels this stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Closes the stream and releases the connection.
    pub fn close(&mut self) {
        self.finish();
    }

    /// Returns true once the stream has ended or been closed.
    pub fn is_closed(&self) -> bool {
        self.done
    }

    /// Drains the body into `writer`, returning the number of bytes written.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> ClientResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }

    /// Drains the body into memory.
    pub async fn collect_bytes(mut self) -> ClientResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    fn finish(&mut self) {
        self.done = true;
        self.inner = stream::empty().boxed();
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("done", &self.done)
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

impl Stream for ByteStream {
    type Item = ClientResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        this.abort.register(cx);
        if this.abort.is_aborted() {
            this.finish();
            return Poll::Ready(Some(Err(ClientError::Cancelled)));
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Splits a byte stream into non-empty text lines.
///
/// Lines may span chunk boundaries. `\r\n` endings are accepted and blank
/// lines are skipped.
#[derive(Debug)]
pub struct LineStream {
    bytes: ByteStream,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
}

/// Ingest statistics feed: one SSE line per item (`data: {...}`, `event: ...`).
pub type IngestStatsStream = LineStream;

impl LineStream {
    /// Wraps a byte stream.
    pub fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            buffer: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    /// Returns a handle that cancels this stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.bytes.abort_handle()
    }

    /// Closes the stream and releases the connection.
    pub fn close(&mut self) {
        self.bytes.close();
        self.buffer.clear();
        self.ready.clear();
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line[..line.len() - 1]);
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            self.ready.push_back(line.to_string());
        }
    }
}

impl Stream for LineStream {
    type Item = ClientResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }

            match Pin::new(&mut this.bytes).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                    this.split_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    if this.buffer.is_empty() {
                        return Poll::Ready(None);
                    }
                    let rest = std::mem::take(&mut this.buffer);
                    this.push_line(&rest);
                    if this.ready.is_empty() {
                        return Poll::Ready(None);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Returns the payload of an SSE `data:` line.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:")
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
}
