use std::fmt;
use std::pin::Pin;

use bytes::{Buf, BytesMut};
use futures_core::stream::Stream;
use futures_core::task::{Context, Poll};
use pin_project_lite::pin_project;

use crate::error::BoxError;
use crate::event::{Event, ParseError};
use crate::parser;

pin_project! {
    /// Stream adapter slicing a fallible byte-chunk stream into [`Event`]s.
    ///
    /// Bytes accumulate in a parse buffer until a message delimiter appears
    /// (the earliest of `\r\n\r\n`, `\n\n` or `\r\r`); everything before the
    /// delimiter is handed to [`Event::parse`] and everything after stays
    /// buffered for the next message. A split never consumes bytes belonging
    /// to the next message.
    ///
    /// One `EventStream` covers exactly one connection: it ends when the
    /// underlying stream ends, discarding any partially buffered message.
    /// Reconnection and resumption live a layer up, in
    /// [`EventSource`](crate::EventSource); this adapter is exposed for
    /// callers that already hold a response body and only want the framing.
    pub struct EventStream<S> {
        #[pin]
        inner: S,
        buffer: BytesMut,
        started: bool,
        terminated: bool,
    }
}

impl<S> EventStream<S> {
    /// Wrap a byte-chunk stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            started: false,
            terminated: false,
        }
    }
}

/// Split the earliest complete message off the front of `buffer`.
fn split_message(buffer: &mut BytesMut) -> Option<BytesMut> {
    let (pos, width) = parser::find_message_boundary(buffer)?;
    let raw = buffer.split_to(pos);
    buffer.advance(width);
    Some(raw)
}

fn parse_message(raw: &[u8]) -> Result<Event, ParseError> {
    let block = std::str::from_utf8(raw).map_err(ParseError::invalid_utf8)?;
    Event::parse(block)
}

impl<S, B, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<BoxError>,
{
    type Item = Result<Event, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.terminated {
            return Poll::Ready(None);
        }

        loop {
            // drain messages already buffered before polling for more bytes
            if let Some(raw) = split_message(this.buffer) {
                return match parse_message(&raw) {
                    Ok(event) => Poll::Ready(Some(Ok(event))),
                    Err(err) => {
                        *this.terminated = true;
                        Poll::Ready(Some(Err(StreamError::Parse(err))))
                    }
                };
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let mut chunk = chunk.as_ref();
                    if chunk.is_empty() {
                        continue;
                    }
                    if !*this.started {
                        *this.started = true;
                        if let Some(rest) = chunk.strip_prefix(parser::BOM) {
                            chunk = rest;
                        }
                    }
                    this.buffer.extend_from_slice(chunk);
                }
                Poll::Ready(Some(Err(err))) => {
                    *this.terminated = true;
                    return Poll::Ready(Some(Err(StreamError::Transport(err.into()))));
                }
                Poll::Ready(None) => {
                    *this.terminated = true;
                    if !this.buffer.is_empty() {
                        tracing::trace!(
                            "discarding {} byte(s) of a message truncated by disconnect",
                            this.buffer.len()
                        );
                        this.buffer.clear();
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Error produced by an [`EventStream`].
///
/// The two variants matter to the layer above: a parse failure terminates
/// the event sequence, while a transport failure is an ordinary disconnect
/// that the session-level client recovers from by reconnecting.
#[derive(Debug)]
pub enum StreamError {
    /// A message block could not be parsed; the stream is terminated.
    Parse(ParseError),
    /// The underlying byte stream failed mid-read.
    Transport(BoxError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "sse stream parse failure: {err}"),
            Self::Transport(err) => write!(f, "sse stream transport failure: {err}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Transport(err) => Some(err.as_ref()),
        }
    }
}
