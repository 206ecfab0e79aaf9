//! Response bodies and the tee that copies what the caller reads into the log.

use bytes::Bytes;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::BodyCaptureError;

pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// A response body as handed over by the network.
pub enum ResponseBody {
    Empty,
    /// Body already available synchronously
    Text(String),
    /// Body buffered in memory
    Bytes(Bytes),
    /// Body that must be read asynchronously
    Stream(BodyReader),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            ResponseBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl ResponseBody {
    pub fn stream<R: AsyncRead + Send + 'static>(reader: R) -> Self {
        ResponseBody::Stream(Box::pin(reader))
    }

    /// Consume the body the way a caller would.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Text(text) => Ok(Bytes::from(text)),
            ResponseBody::Bytes(bytes) => Ok(bytes),
            ResponseBody::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    pub async fn into_text(self) -> io::Result<String> {
        let bytes = self.into_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Split off a capture of this body for logging. The caller keeps an
    /// equivalent body and reads it at its own pace: a stream is wrapped so
    /// every chunk the caller reads is also copied, up to `max_body_size`
    /// bytes, to the returned [`BodyCapture`]. Nothing is buffered on the
    /// caller's behalf.
    pub fn tee(&mut self, max_body_size: usize) -> BodyCapture {
        let (tx, rx) = mpsc::unbounded_channel();
        let has_body = match std::mem::replace(self, ResponseBody::Empty) {
            ResponseBody::Empty => false,
            ResponseBody::Text(text) => {
                let _ = tx.send(CaptureEvent::Chunk(Bytes::from(truncate_text(&text, max_body_size))));
                let _ = tx.send(CaptureEvent::End);
                *self = ResponseBody::Text(text);
                true
            }
            ResponseBody::Bytes(bytes) => {
                let _ = tx.send(CaptureEvent::Chunk(bytes.slice(..bytes.len().min(max_body_size))));
                let _ = tx.send(CaptureEvent::End);
                *self = ResponseBody::Bytes(bytes);
                true
            }
            ResponseBody::Stream(inner) => {
                *self = ResponseBody::stream(TeeReader {
                    inner,
                    tx: Some(tx),
                    budget: max_body_size,
                });
                true
            }
        };
        BodyCapture { rx, has_body }
    }
}

#[derive(Debug)]
enum CaptureEvent {
    Chunk(Bytes),
    End,
    Failed(String),
}

/// Logger's side of a teed body.
#[derive(Debug)]
pub struct BodyCapture {
    rx: mpsc::UnboundedReceiver<CaptureEvent>,
    has_body: bool,
}

impl BodyCapture {
    /// Wait for the caller to finish reading, then return the captured copy.
    ///
    /// A body that is still open after `read_timeout`, or that the caller
    /// dropped early, yields what was seen so far. A read error on the
    /// underlying stream is reported as [`BodyCaptureError::StreamRead`].
    pub async fn finish(mut self, read_timeout: Duration) -> Result<Option<String>, BodyCaptureError> {
        if !self.has_body {
            return Ok(None);
        }

        let deadline = Instant::now() + read_timeout;
        let mut captured = Vec::new();
        loop {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(CaptureEvent::Chunk(chunk))) => captured.extend_from_slice(&chunk),
                Ok(Some(CaptureEvent::End)) => break,
                Ok(Some(CaptureEvent::Failed(message))) => return Err(BodyCaptureError::StreamRead(message)),
                Ok(None) => {
                    debug!("Body dropped before its end, keeping {} captured bytes", captured.len());
                    break;
                }
                Err(_) => {
                    warn!(
                        "Response body still open after {:?}, logging {} captured bytes",
                        read_timeout,
                        captured.len()
                    );
                    break;
                }
            }
        }
        Ok(Some(String::from_utf8_lossy(&captured).into_owned()))
    }
}

/// Hands the caller every byte of `inner` and copies a prefix to the capture.
struct TeeReader {
    inner: BodyReader,
    tx: Option<mpsc::UnboundedSender<CaptureEvent>>,
    /// Bytes still allowed into the capture
    budget: usize,
}

impl TeeReader {
    fn emit(&mut self, event: CaptureEvent) {
        if let Some(tx) = &self.tx {
            // The logger may be gone; the caller's read is unaffected.
            let _ = tx.send(event);
        }
    }
}

impl AsyncRead for TeeReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match this.inner.as_mut().poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let read = &buf.filled()[before..];
                if read.is_empty() {
                    this.emit(CaptureEvent::End);
                    this.tx = None;
                } else if this.budget > 0 {
                    let take = read.len().min(this.budget);
                    this.budget -= take;
                    let chunk = Bytes::copy_from_slice(&read[..take]);
                    this.emit(CaptureEvent::Chunk(chunk));
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.emit(CaptureEvent::Failed(e.to_string()));
                this.tx = None;
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Bytes(bytes)
    }
}

fn truncate_text(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
